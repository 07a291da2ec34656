//! Serve command: exposes the demo object on the socket in the foreground.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use farcall_core::{Channel, ServerConfig, SocketServer, expose};

use crate::demo::demo_object;
use crate::error::CliResult;

/// Runs until SIGTERM or SIGINT. Every connection gets its own channel with
/// its own instance of the demo object.
pub async fn run(socket_path: PathBuf, service: &str, max_connections: usize) -> CliResult<()> {
    let config = ServerConfig::new(&socket_path).with_max_connections(max_connections);
    let server = SocketServer::bind(config).await?;
    info!(path = %socket_path.display(), service, "Serving demo object");
    println!("serving `{}` on {}", service, socket_path.display());

    let service: Arc<str> = Arc::from(service);
    server
        .run_until_shutdown(
            move |transport| {
                let service = Arc::clone(&service);
                async move {
                    let channel = Channel::new(transport);
                    if let Err(e) = expose(demo_object(), &channel, &service) {
                        warn!(error = %e, "Failed to expose demo object");
                        return;
                    }
                    channel.closed().await;
                    debug!(channel = channel.id(), "Connection finished");
                }
            },
            shutdown_signal(),
        )
        .await?;
    Ok(())
}

/// Completes on SIGTERM or SIGINT.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            }
        }
        _ => {
            warn!("Failed to install signal handlers, falling back to Ctrl+C");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
