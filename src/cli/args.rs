//! CLI arguments module
//!
//! Defines command-line argument parsing using clap. Every subcommand maps
//! to exactly one protocol command or resume-store operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the file sharing node and client
#[derive(Debug, Parser)]
#[command(name = "p2p-fileshare")]
#[command(about = "Encrypted P2P file sharing with resumable downloads", long_about = None)]
pub struct CliArgs {
    /// Path to a JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Node host to serve on or connect to
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Node port to serve on or connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Shared secret (overrides the configuration file)
    #[arg(short, long, value_name = "SECRET")]
    pub secret: Option<String>,

    /// Directory of files to share (serve)
    #[arg(long, value_name = "DIR")]
    pub share_dir: Option<PathBuf>,

    /// Directory completed downloads are placed in
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Directory for partial files and session metadata
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Actions, each mapping to one protocol command or store operation
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the share directory to authenticated peers
    Serve,
    /// List files available on the node
    List,
    /// Search files on the node by name
    Search {
        /// Case-insensitive substring to match
        query: String,
    },
    /// Download a file, resuming any prior progress
    Download {
        /// Name of the file as shown by list
        name: String,
    },
    /// List incomplete downloads that can be resumed
    Incomplete,
    /// Remove a download's partial file and session metadata
    Cleanup {
        /// Name of the file whose session to remove
        name: String,
    },
}

impl CliArgs {
    /// Parse CLI arguments from the command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = CliArgs::parse_from(["p2p-fileshare", "--port", "9000", "--secret", "hunter22", "serve"]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.secret.as_deref(), Some("hunter22"));
        assert!(matches!(args.command, Command::Serve));
    }

    #[test]
    fn test_parse_download() {
        let args = CliArgs::parse_from(["p2p-fileshare", "--host", "198.51.100.7", "download", "a.txt"]);
        assert_eq!(args.host.as_deref(), Some("198.51.100.7"));
        match args.command {
            Command::Download { name } => assert_eq!(name, "a.txt"),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_parse_search() {
        let args = CliArgs::parse_from(["p2p-fileshare", "search", "report"]);
        match args.command {
            Command::Search { query } => assert_eq!(query, "report"),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_log_level() {
        let verbose = CliArgs::parse_from(["p2p-fileshare", "-v", "list"]);
        assert_eq!(verbose.log_level(), tracing::Level::DEBUG);

        let quiet = CliArgs::parse_from(["p2p-fileshare", "-q", "list"]);
        assert_eq!(quiet.log_level(), tracing::Level::ERROR);

        let normal = CliArgs::parse_from(["p2p-fileshare", "list"]);
        assert_eq!(normal.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_command_is_required() {
        assert!(CliArgs::try_parse_from(["p2p-fileshare"]).is_err());
    }
}
