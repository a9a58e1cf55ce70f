use anyhow::{Context, Result};
use std::path::PathBuf;

/// Durable "highest fully processed UID" marker, a plain integer in a text
/// file. Read once at startup; written once per non-empty poll batch.
/// Only the poller writes it.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WatermarkStore { path: path.into() }
    }

    /// A missing or unreadable file means "never polled": every UID in the
    /// mailbox counts as new.
    pub async fn load(&self) -> Option<u32> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        raw.trim().parse().ok()
    }

    pub async fn save(&self, uid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, uid.to_string())
            .await
            .with_context(|| format!("writing watermark to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("last_seen_uid.txt"));
        assert_eq!(store.load().await, None);
        store.save(200).await.unwrap();
        assert_eq!(store.load().await, Some(200));
        store.save(321).await.unwrap();
        assert_eq!(store.load().await, Some(321));
    }

    #[tokio::test]
    async fn garbled_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_seen_uid.txt");
        tokio::fs::write(&path, "not a number").await.unwrap();
        let store = WatermarkStore::new(path);
        assert_eq!(store.load().await, None);
    }
}
