//! Durable position store backed by a single JSON document.
//!
//! Every mutation rewrites the whole file: serialize to a sibling temp file,
//! then rename over the original. A crash mid-write leaves the previous
//! snapshot intact, so the file is either the old state or the new one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::models::Position;

/// Errors raised by the position store. Write failures are fatal for the
/// action that triggered them: an order is never reported as recorded
/// unless the file hit disk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read position file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write position file: {0}")]
    Write(#[source] std::io::Error),

    #[error("position file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// In-memory position table with write-through JSON persistence.
#[derive(Debug)]
pub struct PositionStore {
    path: PathBuf,
    positions: BTreeMap<String, Position>,
}

impl PositionStore {
    /// Load the store from `path`. A missing file yields an empty store;
    /// a present but unreadable file is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let positions = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No position file yet, starting empty");
                BTreeMap::new()
            }
            Err(err) => return Err(StoreError::Read(err)),
        };
        Ok(Self { path, positions })
    }

    pub fn get(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Position)> {
        self.positions.iter()
    }

    /// Asset ids currently tracked, cloned so callers can mutate the store
    /// while walking them.
    pub fn assets(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Insert or replace a position, then persist.
    pub async fn put(&mut self, asset: &str, position: Position) -> Result<(), StoreError> {
        self.positions.insert(asset.to_string(), position);
        self.flush().await
    }

    /// Remove a position, then persist. Removing an absent asset is a no-op
    /// and skips the disk write.
    pub async fn remove(&mut self, asset: &str) -> Result<Option<Position>, StoreError> {
        let removed = self.positions.remove(asset);
        if removed.is_some() {
            self.flush().await?;
        }
        Ok(removed)
    }

    /// Write the whole table to disk atomically.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.positions)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(StoreError::Write)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }
}
