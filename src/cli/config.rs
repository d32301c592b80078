//! CLI configuration module
//!
//! Resolved settings for a run: defaults, overridden by an optional JSON
//! configuration file, overridden by CLI flags.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::args::CliArgs;
use crate::error::ShareError;

/// Default node port
const DEFAULT_PORT: u16 = 8080;

/// Default share-directory poll interval in seconds
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// On-disk configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub client: ClientSection,
}

/// Node settings in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub share_dir: Option<PathBuf>,
    pub secret: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

/// Client settings in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub download_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub secret: Option<String>,
}

/// Resolved configuration for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to serve on or connect to
    pub host: String,
    /// Port to serve on or connect to
    pub port: u16,
    /// Shared secret
    pub secret: String,
    /// Directory of files to share
    pub share_dir: PathBuf,
    /// Directory completed downloads are placed in
    pub download_dir: PathBuf,
    /// Directory for partial files and session metadata
    pub state_dir: PathBuf,
    /// Share-directory poll interval in seconds
    pub poll_interval_secs: u64,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl ConfigFile {
    /// Load a configuration file if it exists
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration file at {}", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read(path).map_err(|e| {
            ShareError::config_error_with_field(format!("Failed to read configuration file: {}", e), path.display().to_string())
        })?;
        let file: ConfigFile = serde_json::from_slice(&data).map_err(|e| {
            ShareError::config_error_with_field(format!("Malformed configuration file: {}", e), path.display().to_string())
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(file)
    }
}

impl Config {
    /// Resolve configuration from CLI arguments and the optional file
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::load(Path::new("config.json"))?,
        };

        let host = args
            .host
            .clone()
            .or(file.client.host.clone())
            .or(file.node.host.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = args.port.or(file.client.port).or(file.node.port).unwrap_or(DEFAULT_PORT);
        let secret = args
            .secret
            .clone()
            .or(file.client.secret.clone())
            .or(file.node.secret.clone())
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            secret,
            share_dir: args
                .share_dir
                .clone()
                .or(file.node.share_dir)
                .unwrap_or_else(|| PathBuf::from("./shared")),
            download_dir: args
                .download_dir
                .clone()
                .or(file.client.download_dir)
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            state_dir: args
                .state_dir
                .clone()
                .or(file.client.state_dir)
                .unwrap_or_else(|| PathBuf::from("./.resume")),
            poll_interval_secs: file.node.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            verbose: args.verbose,
            quiet: args.quiet,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ShareError::config_error_with_field("Port cannot be 0", "port").into());
        }
        if self.secret.is_empty() {
            return Err(ShareError::config_error_with_field(
                "A shared secret is required (--secret or configuration file)",
                "secret",
            )
            .into());
        }
        if self.share_dir.as_os_str().is_empty() {
            return Err(ShareError::config_error_with_field("share_dir cannot be empty", "share_dir").into());
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ShareError::config_error_with_field("download_dir cannot be empty", "download_dir").into());
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ShareError::config_error_with_field("state_dir cannot be empty", "state_dir").into());
        }
        if self.poll_interval_secs == 0 {
            return Err(ShareError::config_error_with_field("poll_interval_secs must be at least 1", "poll_interval_secs").into());
        }
        Ok(())
    }

    /// The address the node binds when serving
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the node address a client connects to
    pub fn node_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.to_socket_addrs()
            .map_err(|e| ShareError::connection_error_full("Failed to resolve node address", addr.clone(), e.to_string()))?
            .next()
            .ok_or_else(|| ShareError::connection_error_with_address("Node address resolved to nothing", addr).into())
    }
}
