//! File registry module
//!
//! In-memory catalog of shared files. A single event-loop task applies
//! file-change events (the writer); every connection handler reads
//! snapshots. Checksum computation happens inside the event loop so a
//! large new file never stalls connection handling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::fs;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};

use crate::registry::file::{modified_secs, relative_name, SharedFile};

/// Capacity of the file-event channel feeding the registry
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A file-change notification from the share directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A file appeared under the share directory
    Added(PathBuf),
    /// A file disappeared from the share directory
    Removed(PathBuf),
    /// A file's content changed in place
    Modified(PathBuf),
}

/// Catalog of files visible to peers
#[derive(Debug)]
pub struct FileRegistry {
    /// Root of the shared directory
    share_dir: PathBuf,
    /// Shared files keyed by registry name
    files: RwLock<HashMap<String, SharedFile>>,
}

impl FileRegistry {
    /// Create an empty registry for a share directory
    pub fn new(share_dir: PathBuf) -> Self {
        Self {
            share_dir,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// The share directory this registry catalogs
    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    /// Apply one file-change event
    ///
    /// Idempotent: duplicate events are tolerated, and an add/modify for a
    /// file that no longer exists is treated as a removal.
    pub async fn apply(&self, event: FileEvent) -> Result<()> {
        match event {
            FileEvent::Added(path) | FileEvent::Modified(path) => self.upsert(&path).await,
            FileEvent::Removed(path) => {
                self.remove(&path).await;
                Ok(())
            }
        }
    }

    /// Run the registry event loop until the channel closes
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<FileEvent>) {
        info!("File registry event loop started for {}", self.share_dir.display());
        while let Some(event) = events.recv().await {
            trace!("Registry event: {:?}", event);
            if let Err(e) = self.apply(event).await {
                warn!("Failed to apply registry event: {}", e);
            }
        }
        info!("File registry event loop stopped");
    }

    async fn upsert(&self, path: &Path) -> Result<()> {
        let Some(name) = relative_name(&self.share_dir, path) else {
            warn!("Ignoring event for path outside share dir: {}", path.display());
            return Ok(());
        };

        // The file may have vanished between the event and now; treat that
        // as a removal so a stale add never resurrects a deleted entry.
        let metadata = match fs::metadata(path).await {
            Ok(m) => m,
            Err(_) => {
                debug!("File '{}' vanished before cataloging, removing", name);
                self.files.write().await.remove(&name);
                return Ok(());
            }
        };
        if !metadata.is_file() {
            return Ok(());
        }

        // Skip the expensive re-hash when size and mtime are unchanged
        let modified = modified_secs(&metadata);
        {
            let files = self.files.read().await;
            if let Some(existing) = files.get(&name) {
                if existing.size == metadata.len() && existing.modified == modified {
                    trace!("'{}' unchanged, skipping re-hash", name);
                    return Ok(());
                }
            }
        }

        // Hash outside the write lock; readers keep seeing the old entry
        // until the new one is complete.
        let shared = SharedFile::from_path(&self.share_dir, path).await?;
        debug!("Cataloged '{}' ({} bytes, {})", shared.name, shared.size, shared.checksum);

        let mut files = self.files.write().await;
        files.insert(shared.name.clone(), shared);
        Ok(())
    }

    async fn remove(&self, path: &Path) {
        let Some(name) = relative_name(&self.share_dir, path) else {
            return;
        };
        let mut files = self.files.write().await;
        if files.remove(&name).is_some() {
            debug!("Removed '{}' from registry", name);
        }
    }

    /// Snapshot of all shared files, ordered by name
    pub async fn list(&self) -> Vec<SharedFile> {
        let files = self.files.read().await;
        let mut snapshot: Vec<SharedFile> = files.values().cloned().collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    /// Case-insensitive substring search on names
    ///
    /// An empty query matches nothing; that is distinct from a listing.
    pub async fn find(&self, query: &str) -> Vec<SharedFile> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let files = self.files.read().await;
        let mut matches: Vec<SharedFile> = files
            .values()
            .filter(|f| f.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    /// Look up a single file by name
    pub async fn get(&self, name: &str) -> Option<SharedFile> {
        let files = self.files.read().await;
        files.get(name).cloned()
    }

    /// Number of cataloged files
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}
