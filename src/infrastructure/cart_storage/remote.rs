//! Remote cart storage over the record store.
//!
//! Lines live in the `cart_items` table tagged with their session. A save
//! diffs the wanted lines against what the table holds and issues at most
//! one delete, one update and one create.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::aggregates::CartLine;
use crate::infrastructure::records::{
    Entity, FetchParams, Record, RecordStore, SortDirection, ID_FIELD,
};
use super::{CartPersistence, StorageError};

pub const SESSION_FIELD: &str = "session_id";

#[derive(Clone)]
pub struct RemoteCartStorage<S> {
    store: S,
    session_id: String,
}

impl<S: RecordStore> RemoteCartStorage<S> {
    pub fn new(store: S, session_id: impl Into<String>) -> Self {
        Self { store, session_id: session_id.into() }
    }

    pub fn session_id(&self) -> &str { &self.session_id }

    async fn fetch_lines(&self) -> Result<Vec<CartLine>, StorageError> {
        let params = FetchParams::new()
            .where_eq(SESSION_FIELD, self.session_id.clone())
            .order_by(ID_FIELD, SortDirection::Asc);
        let records = self.store.fetch(CartLine::TABLE, &params).await?.into_data()?;
        let lines = records
            .into_iter()
            .filter_map(|record| match CartLine::to_domain(record) {
                Ok(line) => Some(line),
                Err(err) => {
                    tracing::warn!(session = %self.session_id, error = %err, "skipping invalid cart record");
                    None
                }
            })
            .collect();
        Ok(lines)
    }

    fn to_record(&self, line: &CartLine, keep_id: bool) -> Record {
        let mut record = line.from_domain();
        if !keep_id {
            record.remove(ID_FIELD);
        }
        record.insert(SESSION_FIELD.to_string(), Value::from(self.session_id.clone()));
        record
    }
}

impl<S: RecordStore> CartPersistence for RemoteCartStorage<S> {
    async fn load(&self) -> Result<Vec<CartLine>, StorageError> { self.fetch_lines().await }

    async fn save(&self, lines: &[CartLine]) -> Result<(), StorageError> {
        let remote = self.fetch_lines().await?;
        let wanted: HashSet<u64> = lines.iter().map(|l| l.id.0).collect();

        let stale: Vec<u64> = remote.iter().map(|l| l.id.0).filter(|id| !wanted.contains(id)).collect();
        if !stale.is_empty() {
            self.store.delete(CartLine::TABLE, &stale).await?.ensure_applied()?;
        }

        let mut changed = Vec::new();
        let mut created = Vec::new();
        for line in lines {
            match remote.iter().find(|r| r.id == line.id) {
                Some(existing) if existing == line => {}
                Some(_) => changed.push(self.to_record(line, true)),
                None => created.push(self.to_record(line, false)),
            }
        }
        if !changed.is_empty() {
            self.store.update(CartLine::TABLE, changed).await?.ensure_applied()?;
        }
        if !created.is_empty() {
            self.store.create(CartLine::TABLE, created).await?.ensure_applied()?;
        }
        tracing::debug!(session = %self.session_id, lines = lines.len(), removed = stale.len(), "synced cart to record store");
        Ok(())
    }

    fn reloads_after_save(&self) -> bool { true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::value_objects::{LineId, ProductId};
    use crate::infrastructure::records::MemoryRecordStore;

    fn line(id: u64, product: u64, qty: u32) -> CartLine {
        CartLine { id: LineId(id), product_id: ProductId(product), quantity: qty, size: None, added_at: Utc::now() }
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = MemoryRecordStore::new();
        let alice = RemoteCartStorage::new(store.clone(), "alice");
        let bob = RemoteCartStorage::new(store.clone(), "bob");
        alice.save(&[line(1, 10, 1)]).await.unwrap();
        bob.save(&[line(1, 20, 2)]).await.unwrap();
        let a = alice.load().await.unwrap();
        let b = bob.load().await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].product_id, ProductId(10));
        assert_eq!(b[0].product_id, ProductId(20));
        assert_ne!(a[0].id, b[0].id);
    }

    #[tokio::test]
    async fn test_save_diffs_against_remote() {
        let store = MemoryRecordStore::new();
        let storage = RemoteCartStorage::new(store.clone(), "s");
        storage.save(&[line(1, 10, 1), line(2, 11, 1)]).await.unwrap();
        let mut lines = storage.load().await.unwrap();
        lines[0].quantity = 5;
        lines.remove(1);
        lines.push(line(99, 12, 3));
        storage.save(&lines).await.unwrap();

        let reloaded = storage.load().await.unwrap();
        let summary: Vec<(u64, u32)> = reloaded.iter().map(|l| (l.product_id.0, l.quantity)).collect();
        assert_eq!(summary, vec![(10, 5), (12, 3)]);
        assert!(reloaded.iter().all(|l| l.id != LineId(99)));
    }

    #[tokio::test]
    async fn test_clear_deletes_everything() {
        let store = MemoryRecordStore::new();
        let storage = RemoteCartStorage::new(store, "s");
        storage.save(&[line(1, 10, 1), line(2, 11, 1)]).await.unwrap();
        storage.save(&[]).await.unwrap();
        assert!(storage.load().await.unwrap().is_empty());
    }
}
