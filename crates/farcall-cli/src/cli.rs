//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// farcall - drive objects living in another process
#[derive(Debug, Parser)]
#[command(name = "farcall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FARCALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Path to the socket
    #[arg(long, env = "FARCALL_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Service name to expose or connect to
    #[arg(long)]
    pub service: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expose the demo object on the socket until interrupted
    Serve,

    /// Call the function at a dotted path
    Call {
        /// Dotted path, e.g. `math.add`
        path: String,

        /// Arguments; each is parsed as JSON, falling back to a plain string
        args: Vec<String>,
    },

    /// Read the value at a dotted path
    Get {
        /// Dotted path, e.g. `counter`
        path: String,
    },

    /// Assign a value at a dotted path
    Set {
        /// Dotted path ending in the member to assign
        path: String,

        /// New value (JSON, falling back to a plain string)
        value: String,
    },

    /// Instantiate the constructor at a dotted path and read members of the
    /// new instance
    Construct {
        /// Dotted path, e.g. `Counter`
        path: String,

        /// Constructor arguments
        args: Vec<String>,

        /// Member of the instance to read (can be repeated)
        #[arg(long = "read", action = clap::ArgAction::Append)]
        read: Vec<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_arguments() {
        let cli = Cli::try_parse_from(["farcall", "call", "add", "2", "3"]).unwrap();
        let Command::Call { path, args } = cli.command else {
            panic!("expected call");
        };
        assert_eq!(path, "add");
        assert_eq!(args, ["2", "3"]);
    }

    #[test]
    fn parses_construct_reads() {
        let cli = Cli::try_parse_from([
            "farcall", "--service", "demo", "construct", "Counter", "10", "--read", "n",
        ])
        .unwrap();
        assert_eq!(cli.service.as_deref(), Some("demo"));
        assert!(matches!(cli.command, Command::Construct { ref read, .. } if read == &["n"]));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["farcall"]).is_err());
    }
}
