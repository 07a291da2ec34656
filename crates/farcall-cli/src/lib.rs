//! Command-line peer for farcall.
//!
//! This crate provides the `farcall` binary: `serve` exposes a demo object
//! over a Unix socket, while `call`, `get`, `set` and `construct` drive it
//! through a remote handle.

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
