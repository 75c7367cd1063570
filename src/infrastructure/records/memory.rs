//! In-process record store
//!
//! Same contract as the remote store, kept in a `RwLock`ed map. Used for
//! local development (seeded from a JSON catalog) and in tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    compare_values, project, record_id, values_match, FetchParams, FetchResponse, GetResponse, MutationResponse,
    Record, RecordError, RecordResult, RecordStore, Result, SortDirection, ID_FIELD,
};

type Table = BTreeMap<u64, Record>;

#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self { Self::default() }

    /// Inserts records as-is. Records without an `Id` get the next free one.
    pub async fn seed(&self, table: &str, records: Vec<Record>) {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        for mut record in records {
            let id = record_id(&record).unwrap_or_else(|| next_id(rows));
            record.insert(ID_FIELD.to_string(), Value::from(id));
            rows.insert(id, record);
        }
    }

    /// Loads a `{ "table": [records...] }` document.
    pub async fn seed_from_file(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RecordError::Seed(format!("{}: {e}", path.display())))?;
        let document: HashMap<String, Vec<Record>> =
            serde_json::from_str(&raw).map_err(|e| RecordError::Seed(format!("{}: {e}", path.display())))?;
        let mut count = 0;
        for (table, records) in document {
            count += records.len();
            self.seed(&table, records).await;
        }
        tracing::info!(path = %path.display(), records = count, "seeded in-memory record store");
        Ok(count)
    }
}

fn next_id(rows: &Table) -> u64 { rows.keys().next_back().copied().unwrap_or(0) + 1 }

fn matches_conditions(record: &Record, params: &FetchParams) -> bool {
    params.conditions.iter().all(|condition| match record.get(&condition.field) {
        Some(stored) => condition.values.iter().any(|wanted| values_match(stored, wanted)),
        None => condition.values.iter().any(Value::is_null),
    })
}

impl RecordStore for MemoryRecordStore {
    async fn fetch(&self, table: &str, params: &FetchParams) -> Result<FetchResponse> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(table)
            .map(|rows| rows.values().filter(|r| matches_conditions(r, params)).cloned().collect())
            .unwrap_or_default();
        drop(tables);

        if !params.order_by.is_empty() {
            rows.sort_by(|a, b| {
                params.order_by.iter().fold(std::cmp::Ordering::Equal, |acc, order| {
                    acc.then_with(|| {
                        let ord = compare_values(a.get(&order.field), b.get(&order.field));
                        match order.direction { SortDirection::Asc => ord, SortDirection::Desc => ord.reverse() }
                    })
                })
            });
        }

        let total = rows.len() as u64;
        let (offset, limit) = params
            .paging_info
            .map(|p| (usize::try_from(p.offset).unwrap_or(usize::MAX), usize::try_from(p.limit).unwrap_or(usize::MAX)))
            .unwrap_or((0, usize::MAX));
        let data = rows.into_iter().skip(offset).take(limit).map(|r| project(r, &params.fields)).collect();
        Ok(FetchResponse::ok(data, total))
    }

    async fn get_by_id(&self, table: &str, id: u64, fields: &[String]) -> Result<GetResponse> {
        let tables = self.tables.read().await;
        let data = tables.get(table).and_then(|rows| rows.get(&id)).cloned().map(|r| project(r, fields));
        Ok(GetResponse { success: true, message: None, data })
    }

    async fn create(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        if records.is_empty() {
            return Ok(MutationResponse::failure("No records supplied"));
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let results = records
            .into_iter()
            .map(|mut record| {
                let id = next_id(rows);
                record.insert(ID_FIELD.to_string(), Value::from(id));
                rows.insert(id, record.clone());
                RecordResult::ok(Some(record))
            })
            .collect();
        Ok(MutationResponse::ok(results))
    }

    async fn update(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        if records.is_empty() {
            return Ok(MutationResponse::failure("No records supplied"));
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let results = records
            .into_iter()
            .map(|patch| {
                let Some(id) = record_id(&patch) else { return RecordResult::failure("Missing Id") };
                let Some(existing) = rows.get_mut(&id) else { return RecordResult::failure(format!("Record {id} not found")) };
                existing.extend(patch);
                RecordResult::ok(Some(existing.clone()))
            })
            .collect();
        Ok(MutationResponse::ok(results))
    }

    async fn delete(&self, table: &str, ids: &[u64]) -> Result<MutationResponse> {
        if ids.is_empty() {
            return Ok(MutationResponse::failure("No record ids supplied"));
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let results = ids
            .iter()
            .map(|id| match rows.remove(id) {
                Some(_) => RecordResult::ok(None),
                None => RecordResult::failure(format!("Record {id} not found")),
            })
            .collect();
        Ok(MutationResponse::ok(results))
    }
}
