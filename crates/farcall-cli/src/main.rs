//! farcall CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use farcall_cli::cli::{Cli, Command, ConfigAction};
use farcall_cli::commands::{self, remote};
use farcall_cli::config::CliConfig;
use farcall_cli::error::{CliError, CliResult};
use farcall_core::tracing::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path).map_err(CliError::Config)?,
        None => CliConfig::load().unwrap_or_default(),
    };

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        config
            .logging
            .to_tracing_config()
            .map_err(CliError::Config)?
    };
    init_tracing(tracing_config).map_err(|e| CliError::Config(e.to_string()))?;

    let socket_path = config.resolve_socket_path(cli.socket_path.as_deref());
    let service = config.resolve_service(cli.service.as_deref());

    match cli.command {
        Command::Serve => commands::serve::run(socket_path, service, config.max_connections).await,
        Command::Call { path, args } => {
            let remote = remote::open(&socket_path, service).await?;
            remote::print(&remote::call(&remote, &path, &args).await?)
        }
        Command::Get { path } => {
            let remote = remote::open(&socket_path, service).await?;
            remote::print(&remote::get(&remote, &path).await?)
        }
        Command::Set { path, value } => {
            let remote = remote::open(&socket_path, service).await?;
            remote::print(&remote::set(&remote, &path, &value).await?)
        }
        Command::Construct { path, args, read } => {
            let remote = remote::open(&socket_path, service).await?;
            remote::print(&remote::construct(&remote, &path, &args, &read).await?)
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
