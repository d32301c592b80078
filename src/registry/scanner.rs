//! Share directory scanner
//!
//! Produces the file-event feed consumed by the registry: an initial sweep
//! of the share directory, then interval polling that diffs directory
//! snapshots into added/removed/modified events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::ShareError;
use crate::registry::file::modified_secs;
use crate::registry::registry::FileEvent;

/// Size and mtime fingerprint used to detect in-place modification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    size: u64,
    modified: u64,
}

/// Polls the share directory and emits file events
#[derive(Debug)]
pub struct DirectoryPoller {
    share_dir: PathBuf,
    interval: Duration,
    seen: HashMap<PathBuf, FileStamp>,
}

impl DirectoryPoller {
    /// Create a poller; the first tick reports every existing file as added
    pub fn new(share_dir: PathBuf, interval: Duration) -> Self {
        Self {
            share_dir,
            interval,
            seen: HashMap::new(),
        }
    }

    /// Take one directory snapshot and diff it against the previous one
    pub async fn tick(&mut self) -> Result<Vec<FileEvent>> {
        let current = snapshot(&self.share_dir).await?;
        let mut events = Vec::new();

        for (path, stamp) in &current {
            match self.seen.get(path) {
                None => events.push(FileEvent::Added(path.clone())),
                Some(prev) if prev != stamp => events.push(FileEvent::Modified(path.clone())),
                Some(_) => {}
            }
        }
        for path in self.seen.keys() {
            if !current.contains_key(path) {
                events.push(FileEvent::Removed(path.clone()));
            }
        }

        self.seen = current;
        trace!("Poller tick: {} events", events.len());
        Ok(events)
    }

    /// Run the polling loop, sending events until the registry side hangs up
    pub async fn run(mut self, tx: mpsc::Sender<FileEvent>) {
        info!(
            "Polling share directory {} every {:?}",
            self.share_dir.display(),
            self.interval
        );
        loop {
            match self.tick().await {
                Ok(events) => {
                    for event in events {
                        debug!("Share directory change: {:?}", event);
                        if tx.send(event).await.is_err() {
                            info!("Registry closed, stopping directory poller");
                            return;
                        }
                    }
                }
                Err(e) => warn!("Share directory scan failed: {}", e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Recursively stamp every regular file under the share directory
async fn snapshot(share_dir: &Path) -> Result<HashMap<PathBuf, FileStamp>> {
    let mut stamps = HashMap::new();
    let mut pending = vec![share_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            ShareError::storage_error_full("Failed to read share directory", dir.display().to_string(), e.to_string())
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ShareError::storage_error_full("Failed to read directory entry", dir.display().to_string(), e.to_string())
        })? {
            let path = entry.path();
            // A file can vanish between listing and stat; skip it and let
            // the next tick settle the difference.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() {
                stamps.insert(
                    path,
                    FileStamp {
                        size: metadata.len(),
                        modified: modified_secs(&metadata),
                    },
                );
            }
        }
    }

    Ok(stamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fileshare_scanner_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_first_tick_reports_existing_files_as_added() {
        let dir = test_dir("first_tick");
        std::fs::write(dir.join("a.txt"), b"a").unwrap();
        std::fs::write(dir.join("b.txt"), b"b").unwrap();

        let mut poller = DirectoryPoller::new(dir.clone(), Duration::from_secs(5));
        let events = poller.tick().await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, FileEvent::Added(_))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_unchanged_tick_is_quiet() {
        let dir = test_dir("quiet");
        std::fs::write(dir.join("a.txt"), b"a").unwrap();

        let mut poller = DirectoryPoller::new(dir.clone(), Duration::from_secs(5));
        poller.tick().await.unwrap();
        let events = poller.tick().await.unwrap();
        assert!(events.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_detects_added_and_removed() {
        let dir = test_dir("add_remove");
        std::fs::write(dir.join("keep.txt"), b"k").unwrap();
        std::fs::write(dir.join("gone.txt"), b"g").unwrap();

        let mut poller = DirectoryPoller::new(dir.clone(), Duration::from_secs(5));
        poller.tick().await.unwrap();

        std::fs::remove_file(dir.join("gone.txt")).unwrap();
        std::fs::write(dir.join("new.txt"), b"n").unwrap();

        let events = poller.tick().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.contains(&FileEvent::Added(dir.join("new.txt"))));
        assert!(events.contains(&FileEvent::Removed(dir.join("gone.txt"))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_detects_size_change_as_modified() {
        let dir = test_dir("modified");
        std::fs::write(dir.join("a.txt"), b"short").unwrap();

        let mut poller = DirectoryPoller::new(dir.clone(), Duration::from_secs(5));
        poller.tick().await.unwrap();

        std::fs::write(dir.join("a.txt"), b"much longer content").unwrap();
        let events = poller.tick().await.unwrap();
        assert_eq!(events, vec![FileEvent::Modified(dir.join("a.txt"))]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_snapshot_recurses_into_subdirectories() {
        let dir = test_dir("recurse");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub").join("deep.txt"), b"d").unwrap();

        let mut poller = DirectoryPoller::new(dir.clone(), Duration::from_secs(5));
        let events = poller.tick().await.unwrap();
        assert_eq!(events, vec![FileEvent::Added(dir.join("sub").join("deep.txt"))]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_missing_share_dir_errors() {
        let dir = test_dir("missing");
        std::fs::remove_dir_all(&dir).unwrap();

        let mut poller = DirectoryPoller::new(dir, Duration::from_secs(5));
        assert!(poller.tick().await.is_err());
    }
}
