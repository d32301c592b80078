//! Shared file module
//!
//! Metadata for one file visible to peers, plus content hashing.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{error, trace};

use crate::error::ShareError;

/// Read buffer size for checksum computation
const HASH_BUF_SIZE: usize = 64 * 1024;

/// One file visible to peers
///
/// Owned exclusively by the file registry; the node server only reads
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    /// Unique name within the registry (path relative to the share dir)
    pub name: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Byte length at last scan
    pub size: u64,
    /// Hex-encoded SHA-256 of the content at last scan
    pub checksum: String,
    /// Modification time in seconds since the epoch
    pub modified: u64,
}

/// Wire projection of a shared file; the local path never crosses the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub checksum: String,
    pub modified: u64,
}

impl SharedFile {
    /// Build an entry for a file under the share directory
    ///
    /// This is the expensive path: the whole file is read to compute its
    /// checksum.
    pub async fn from_path(share_dir: &Path, path: &Path) -> Result<Self> {
        let name = relative_name(share_dir, path).ok_or_else(|| {
            ShareError::storage_error_with_path("File is outside the share directory", path.display().to_string())
        })?;

        let metadata = fs::metadata(path).await.map_err(|e| {
            error!("Failed to stat '{}': {}", path.display(), e);
            ShareError::storage_error_full("Failed to stat file", path.display().to_string(), e.to_string())
        })?;

        let checksum = hash_file(path).await?;
        trace!("Hashed '{}': {}", name, checksum);

        Ok(Self {
            name,
            path: path.to_path_buf(),
            size: metadata.len(),
            checksum,
            modified: modified_secs(&metadata),
        })
    }

    /// Project into the wire metadata form
    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.name.clone(),
            size: self.size,
            checksum: self.checksum.clone(),
            modified: self.modified,
        }
    }
}

/// Registry name of a path: its path relative to the share dir, with `/`
/// separators on every platform
pub fn relative_name(share_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(share_dir).ok()?;
    let parts: Vec<&str> = relative.iter().filter_map(|c| c.to_str()).collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Modification time as seconds since the epoch (0 when unavailable)
pub fn modified_secs(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compute the hex-encoded SHA-256 of a file's content
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        error!("Failed to open '{}' for hashing: {}", path.display(), e);
        ShareError::storage_error_full("Failed to open file for hashing", path.display().to_string(), e.to_string())
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| {
            error!("Failed to read '{}' while hashing: {}", path.display(), e);
            ShareError::storage_error_full("Failed to read file while hashing", path.display().to_string(), e.to_string())
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
