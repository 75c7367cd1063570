//! Cart persistence collaborators
//!
//! The cart store only ever talks to a [`CartPersistence`]; which one is
//! active (a local JSON blob or the remote record store) is decided once at
//! startup.

use std::future::Future;

use thiserror::Error;

use crate::domain::aggregates::CartLine;
use crate::infrastructure::records::{RecordBackend, RecordError};

pub mod local;
pub mod remote;

pub use local::LocalCartStorage;
pub use remote::RemoteCartStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Record(#[from] RecordError),
}

pub trait CartPersistence: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Vec<CartLine>, StorageError>> + Send;

    fn save(&self, lines: &[CartLine]) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Whether the store must re-read after a write to learn the saved state
    /// (e.g. because the backend assigns line ids).
    fn reloads_after_save(&self) -> bool { false }
}

/// Runtime-selected cart persistence.
#[derive(Clone)]
pub enum CartBackend {
    Local(LocalCartStorage),
    Remote(RemoteCartStorage<RecordBackend>),
}

impl CartPersistence for CartBackend {
    async fn load(&self) -> Result<Vec<CartLine>, StorageError> {
        match self {
            Self::Local(storage) => storage.load().await,
            Self::Remote(storage) => storage.load().await,
        }
    }

    async fn save(&self, lines: &[CartLine]) -> Result<(), StorageError> {
        match self {
            Self::Local(storage) => storage.save(lines).await,
            Self::Remote(storage) => storage.save(lines).await,
        }
    }

    fn reloads_after_save(&self) -> bool {
        match self {
            Self::Local(storage) => storage.reloads_after_save(),
            Self::Remote(storage) => storage.reloads_after_save(),
        }
    }
}
