//! Record-store CRUD boundary
//!
//! The storefront's backend is a generic table store: records are loosely
//! typed JSON objects keyed by a numeric `Id`. Everything that crosses into
//! the domain goes through [`Entity::to_domain`] / [`Entity::from_domain`],
//! so no other module reads the wire shape.

use std::cmp::Ordering;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::aggregates::{CartLine, Category, Product};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

pub type Record = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "Id";

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Seed error: {0}")]
    Seed(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, RecordError>;

// =============================================================================
// Request Types
// =============================================================================

/// Exact-match constraint: the field must equal one of `values`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub values: Vec<Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingInfo {
    pub limit: u64,
    pub offset: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchParams {
    pub fields: Vec<String>,
    #[serde(rename = "where")]
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub paging_info: Option<PagingInfo>,
}

impl FetchParams {
    pub fn new() -> Self { Self::default() }

    pub fn field(mut self, name: &str) -> Self { self.fields.push(name.to_string()); self }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition { field: field.to_string(), values: vec![value.into()] });
        self
    }

    pub fn where_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition { field: field.to_string(), values: values.into_iter().map(Into::into).collect() });
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy { field: field.to_string(), direction });
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.paging_info = Some(PagingInfo { limit, offset });
        self
    }
}

// =============================================================================
// Response Envelopes
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub success: bool,
    pub message: Option<String>,
    pub data: Vec<Record>,
    pub total: u64,
}

impl FetchResponse {
    pub fn ok(data: Vec<Record>, total: u64) -> Self { Self { success: true, message: None, data, total } }
    pub fn failure(message: impl Into<String>) -> Self { Self { success: false, message: Some(message.into()), ..Self::default() } }

    /// `success: false` means there is no data to trust.
    pub fn into_data(self) -> Result<Vec<Record>> {
        if self.success { Ok(self.data) } else { Err(rejected(self.message)) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<Record>,
}

impl GetResponse {
    pub fn into_data(self) -> Result<Option<Record>> {
        if self.success { Ok(self.data) } else { Err(rejected(self.message)) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub success: bool,
    pub data: Option<Record>,
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl RecordResult {
    pub fn ok(data: Option<Record>) -> Self { Self { success: true, data, message: None, errors: vec![] } }
    pub fn failure(message: impl Into<String>) -> Self { Self { success: false, data: None, message: Some(message.into()), errors: vec![] } }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: Option<String>,
    pub results: Vec<RecordResult>,
}

impl MutationResponse {
    pub fn ok(results: Vec<RecordResult>) -> Self { Self { success: true, message: None, results } }
    pub fn failure(message: impl Into<String>) -> Self { Self { success: false, message: Some(message.into()), results: vec![] } }

    pub fn failures(&self) -> impl Iterator<Item = &RecordResult> { self.results.iter().filter(|r| !r.success) }

    /// Fails on an envelope-level rejection or on any per-record failure.
    /// Records that did apply are not rolled back.
    pub fn ensure_applied(&self) -> Result<()> {
        if !self.success {
            return Err(rejected(self.message.clone()));
        }
        let messages: Vec<String> = self
            .failures()
            .map(|r| r.message.clone().unwrap_or_else(|| "record failed".to_string()))
            .collect();
        if messages.is_empty() { Ok(()) } else { Err(RecordError::Rejected(messages.join("; "))) }
    }

    pub fn created(&self) -> impl Iterator<Item = &Record> { self.results.iter().filter_map(|r| r.data.as_ref()) }
}

fn rejected(message: Option<String>) -> RecordError {
    RecordError::Rejected(message.unwrap_or_else(|| "request failed".to_string()))
}

// =============================================================================
// Store Contract
// =============================================================================

/// Remote table store. One call is one network round trip.
pub trait RecordStore: Send + Sync {
    fn fetch(&self, table: &str, params: &FetchParams) -> impl Future<Output = Result<FetchResponse>> + Send;

    fn get_by_id(&self, table: &str, id: u64, fields: &[String]) -> impl Future<Output = Result<GetResponse>> + Send;

    fn create(&self, table: &str, records: Vec<Record>) -> impl Future<Output = Result<MutationResponse>> + Send;

    /// Partial update: each record carries its `Id` plus the fields to overwrite.
    fn update(&self, table: &str, records: Vec<Record>) -> impl Future<Output = Result<MutationResponse>> + Send;

    fn delete(&self, table: &str, ids: &[u64]) -> impl Future<Output = Result<MutationResponse>> + Send;
}

/// Runtime-selected record store.
#[derive(Clone)]
pub enum RecordBackend {
    Memory(MemoryRecordStore),
    Postgres(PgRecordStore),
}

impl RecordStore for RecordBackend {
    async fn fetch(&self, table: &str, params: &FetchParams) -> Result<FetchResponse> {
        match self {
            Self::Memory(store) => store.fetch(table, params).await,
            Self::Postgres(store) => store.fetch(table, params).await,
        }
    }

    async fn get_by_id(&self, table: &str, id: u64, fields: &[String]) -> Result<GetResponse> {
        match self {
            Self::Memory(store) => store.get_by_id(table, id, fields).await,
            Self::Postgres(store) => store.get_by_id(table, id, fields).await,
        }
    }

    async fn create(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        match self {
            Self::Memory(store) => store.create(table, records).await,
            Self::Postgres(store) => store.create(table, records).await,
        }
    }

    async fn update(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        match self {
            Self::Memory(store) => store.update(table, records).await,
            Self::Postgres(store) => store.update(table, records).await,
        }
    }

    async fn delete(&self, table: &str, ids: &[u64]) -> Result<MutationResponse> {
        match self {
            Self::Memory(store) => store.delete(table, ids).await,
            Self::Postgres(store) => store.delete(table, ids).await,
        }
    }
}

// =============================================================================
// Record Helpers
// =============================================================================

pub fn record_id(record: &Record) -> Option<u64> { record.get(ID_FIELD).and_then(Value::as_u64) }

/// Keeps `Id` plus the requested fields. An empty list keeps everything.
pub fn project(mut record: Record, fields: &[String]) -> Record {
    if !fields.is_empty() {
        record.retain(|key, _| key == ID_FIELD || fields.iter().any(|f| f == key));
    }
    record
}

/// Loose equality used by exact-match conditions: numbers compare by value.
pub fn values_match(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => stored == wanted,
    }
}

/// Ordering used for `orderBy`: missing/null first, then bools, numbers, strings.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().unwrap_or(0.0).total_cmp(&y.as_f64().unwrap_or(0.0))
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// =============================================================================
// Typed Boundary
// =============================================================================

/// A domain type stored as records in one table.
pub trait Entity: Sized {
    const TABLE: &'static str;

    fn to_domain(record: Record) -> Result<Self>;

    fn from_domain(&self) -> Record;
}

fn decode<T: DeserializeOwned>(table: &str, record: Record) -> Result<T> {
    let id = record_id(&record);
    serde_json::from_value(Value::Object(record))
        .map_err(|e| RecordError::Invalid(format!("{table} record {id:?}: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Record {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Record::new(),
    }
}

impl Entity for Product {
    const TABLE: &'static str = "products";

    fn to_domain(record: Record) -> Result<Self> {
        let product: Product = decode(Self::TABLE, record)?;
        if product.price.is_sign_negative() {
            return Err(RecordError::Invalid(format!("product {} has a negative price", product.id)));
        }
        if product.discount > 100 {
            return Err(RecordError::Invalid(format!("product {} has a discount above 100%", product.id)));
        }
        Ok(product)
    }

    fn from_domain(&self) -> Record { encode(self) }
}

impl Entity for Category {
    const TABLE: &'static str = "categories";

    fn to_domain(record: Record) -> Result<Self> {
        let category: Category = decode(Self::TABLE, record)?;
        if category.slug.trim().is_empty() {
            return Err(RecordError::Invalid(format!("category {} has an empty slug", category.id)));
        }
        Ok(category)
    }

    fn from_domain(&self) -> Record { encode(self) }
}

impl Entity for CartLine {
    const TABLE: &'static str = "cart_items";

    fn to_domain(record: Record) -> Result<Self> {
        let line: CartLine = decode(Self::TABLE, record)?;
        if line.quantity == 0 {
            return Err(RecordError::Invalid(format!("cart line {} has zero quantity", line.id)));
        }
        Ok(line)
    }

    fn from_domain(&self) -> Record { encode(self) }
}

/// Decodes every record, failing on the first invalid one.
pub fn to_domain_all<E: Entity>(records: Vec<Record>) -> Result<Vec<E>> {
    records.into_iter().map(E::to_domain).collect()
}
