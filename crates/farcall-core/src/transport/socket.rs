//! Unix socket listener and client transport.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use farcall_protocol::Envelope;

use super::{Incoming, StreamTransport, Transferable, Transport};
use crate::config::ServerConfig;
use crate::error::{TransportError, TransportResult};

/// Framed transport over a connected Unix socket.
pub struct UnixTransport {
    stream: StreamTransport<OwnedReadHalf, OwnedWriteHalf>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl UnixTransport {
    /// Connects to a listening socket.
    pub async fn connect(path: impl AsRef<Path>) -> TransportResult<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        debug!(path = %path.as_ref().display(), "Connected to socket");
        Ok(Self::from_stream(stream, None))
    }

    fn from_stream(stream: UnixStream, permit: Option<OwnedSemaphorePermit>) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            stream: StreamTransport::new(reader, writer),
            _permit: permit,
        }
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        self.stream.send(envelope, transfer).await
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        self.stream.recv().await
    }

    async fn close(&self) {
        self.stream.close().await;
    }
}

/// Unix socket server handing out one transport per accepted connection.
pub struct SocketServer {
    config: ServerConfig,
    listener: UnixListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds to the socket path in `config`.
    ///
    /// With `cleanup_stale_socket`, an existing socket file nobody listens on
    /// is removed first. A live socket is never taken over.
    pub async fn bind(config: ServerConfig) -> TransportResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(TransportError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if socket_path.exists() {
            let live = UnixStream::connect(socket_path).await.is_ok();
            if live || !config.cleanup_stale_socket {
                return Err(TransportError::socket_in_use(
                    socket_path.to_string_lossy().to_string(),
                ));
            }
            info!(path = %socket_path.display(), "Removing stale socket");
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Socket server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accepts a single connection, waiting for a free slot first.
    pub async fn accept(&self) -> TransportResult<UnixTransport> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)?;

        let (stream, _addr) = self.listener.accept().await?;
        debug!("Accepted new connection");

        Ok(UnixTransport::from_stream(stream, Some(permit)))
    }

    /// Runs the accept loop, calling the handler for each connection.
    pub async fn run<F, Fut>(&self, handler: F) -> TransportResult<()>
    where
        F: Fn(UnixTransport) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(transport) => {
                    tokio::spawn(handler(transport));
                }
                Err(TransportError::Closed) => return Err(TransportError::Closed),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> TransportResult<()>
    where
        F: Fn(UnixTransport) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(path = %self.config.socket_path.display(), "Removed socket file");
            }
        }
    }
}
