//! Local device storage: one JSON blob per storage key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::aggregates::CartLine;
use super::{CartPersistence, StorageError};

pub const DEFAULT_STORAGE_KEY: &str = "luxe-jewels-cart";

#[derive(Clone, Debug)]
pub struct LocalCartStorage {
    dir: PathBuf,
    key: String,
}

impl LocalCartStorage {
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self { dir: dir.into(), key: key.into() }
    }

    /// Storage scoped to one cart session. The id is hex-encoded into the
    /// file name, so distinct sessions never share a blob.
    pub fn for_session(dir: impl Into<PathBuf>, session_id: &str) -> Self {
        Self::new(dir, format!("{DEFAULT_STORAGE_KEY}-{}", hex::encode(session_id)))
    }

    pub fn path(&self) -> PathBuf { self.dir.join(format!("{}.json", self.key)) }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

impl CartPersistence for LocalCartStorage {
    /// Missing or unreadable blobs read as an empty cart.
    async fn load(&self) -> Result<Vec<CartLine>, StorageError> {
        let path = self.path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "error loading cart from local storage");
                return Ok(Vec::new());
            }
        };
        match serde_json::from_slice::<Vec<CartLine>>(&raw) {
            Ok(lines) => Ok(lines),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "discarding unparsable local cart");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, lines: &[CartLine]) -> Result<(), StorageError> {
        let body = serde_json::to_vec(lines)?;
        write_atomically(&self.path(), &body).await?;
        tracing::debug!(key = %self.key, lines = lines.len(), "saved cart to local storage");
        Ok(())
    }
}
