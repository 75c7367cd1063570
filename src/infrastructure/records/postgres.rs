//! Postgres-backed record store
//!
//! All tables share one `records` relation: `(table_name, id)` keys a JSONB
//! payload. Ids are allocated as max + 1 per table, like the hosted store.

use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use super::{
    project, record_id, FetchParams, FetchResponse, GetResponse, MutationResponse, Record, RecordError, RecordResult,
    RecordStore, Result, SortDirection, ID_FIELD,
};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn to_db_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| RecordError::Invalid(format!("record id {id} out of range")))
}

fn row_to_record(row: &PgRow) -> Result<Record> {
    let id: i64 = row.try_get("id")?;
    let data: Value = row.try_get("data")?;
    let Value::Object(mut record) = data else {
        return Err(RecordError::Invalid(format!("record {id} is not a JSON object")));
    };
    let id = u64::try_from(id).map_err(|_| RecordError::Invalid(format!("record id {id} is negative")))?;
    record.insert(ID_FIELD.to_string(), Value::from(id));
    Ok(record)
}

/// `->>` renders every scalar as text; compare against the same rendering.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn without_id(mut record: Record) -> Value {
    record.remove(ID_FIELD);
    Value::Object(record)
}

fn failed(err: impl std::fmt::Display) -> RecordResult {
    tracing::warn!(error = %err, "record write failed");
    RecordResult::failure(err.to_string())
}

impl RecordStore for PgRecordStore {
    async fn fetch(&self, table: &str, params: &FetchParams) -> Result<FetchResponse> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT id, data, COUNT(*) OVER () AS total FROM records WHERE table_name = ");
        qb.push_bind(table.to_string());

        for condition in &params.conditions {
            if condition.field == ID_FIELD {
                let ids: Vec<i64> = condition.values.iter().filter_map(Value::as_i64).collect();
                qb.push(" AND id = ANY(");
                qb.push_bind(ids);
            } else {
                qb.push(" AND data->>");
                qb.push_bind(condition.field.clone());
                qb.push(" = ANY(");
                qb.push_bind(condition.values.iter().map(as_text).collect::<Vec<String>>());
            }
            qb.push(")");
        }

        qb.push(" ORDER BY ");
        for order in &params.order_by {
            if order.field == ID_FIELD {
                qb.push("id");
            } else {
                qb.push("data->");
                qb.push_bind(order.field.clone());
            }
            qb.push(match order.direction { SortDirection::Asc => " ASC, ", SortDirection::Desc => " DESC, " });
        }
        qb.push("id ASC");

        if let Some(paging) = params.paging_info {
            qb.push(" LIMIT ");
            qb.push_bind(to_db_id(paging.limit)?);
            qb.push(" OFFSET ");
            qb.push_bind(to_db_id(paging.offset)?);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let total = match rows.first() {
            Some(row) => u64::try_from(row.try_get::<i64, _>("total")?).unwrap_or(0),
            None => 0,
        };
        let data = rows
            .iter()
            .map(|row| row_to_record(row).map(|r| project(r, &params.fields)))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(table, rows = data.len(), total, "fetched records");
        Ok(FetchResponse::ok(data, total))
    }

    async fn get_by_id(&self, table: &str, id: u64, fields: &[String]) -> Result<GetResponse> {
        let row = sqlx::query("SELECT id, data FROM records WHERE table_name = $1 AND id = $2")
            .bind(table)
            .bind(to_db_id(id)?)
            .fetch_optional(&self.pool)
            .await?;
        let data = row.as_ref().map(row_to_record).transpose()?.map(|r| project(r, fields));
        Ok(GetResponse { success: true, message: None, data })
    }

    async fn create(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        if records.is_empty() {
            return Ok(MutationResponse::failure("No records supplied"));
        }
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let inserted = sqlx::query(
                "INSERT INTO records (table_name, id, data) \
                 SELECT $1, COALESCE(MAX(id), 0) + 1, $2 FROM records WHERE table_name = $1 \
                 RETURNING id, data",
            )
            .bind(table)
            .bind(without_id(record))
            .fetch_one(&self.pool)
            .await;
            results.push(match inserted.map_err(RecordError::from).and_then(|row| row_to_record(&row)) {
                Ok(created) => RecordResult::ok(Some(created)),
                Err(err) => failed(err),
            });
        }
        Ok(MutationResponse::ok(results))
    }

    async fn update(&self, table: &str, records: Vec<Record>) -> Result<MutationResponse> {
        if records.is_empty() {
            return Ok(MutationResponse::failure("No records supplied"));
        }
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record_id(&record) else {
                results.push(RecordResult::failure("Missing Id"));
                continue;
            };
            let updated = sqlx::query(
                "UPDATE records SET data = data || $3 WHERE table_name = $1 AND id = $2 RETURNING id, data",
            )
            .bind(table)
            .bind(to_db_id(id)?)
            .bind(without_id(record))
            .fetch_optional(&self.pool)
            .await;
            results.push(match updated {
                Ok(Some(row)) => match row_to_record(&row) {
                    Ok(r) => RecordResult::ok(Some(r)),
                    Err(err) => failed(err),
                },
                Ok(None) => RecordResult::failure(format!("Record {id} not found")),
                Err(err) => failed(err),
            });
        }
        Ok(MutationResponse::ok(results))
    }

    async fn delete(&self, table: &str, ids: &[u64]) -> Result<MutationResponse> {
        if ids.is_empty() {
            return Ok(MutationResponse::failure("No record ids supplied"));
        }
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let deleted = sqlx::query("DELETE FROM records WHERE table_name = $1 AND id = $2")
                .bind(table)
                .bind(to_db_id(id)?)
                .execute(&self.pool)
                .await;
            results.push(match deleted {
                Ok(done) if done.rows_affected() > 0 => RecordResult::ok(None),
                Ok(_) => RecordResult::failure(format!("Record {id} not found")),
                Err(err) => failed(err),
            });
        }
        Ok(MutationResponse::ok(results))
    }
}
