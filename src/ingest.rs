use sqlx::{Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::db::DatabasePool;
use crate::errors::{LogPulseError, Result};
use crate::model::{LogEvent, StoredLog};
use crate::validate::{validate_batch, validate_event, LogEventCandidate};

const INSERT_RETURNING: &str = "\
    INSERT INTO logs (service_name, timestamp, status_code, latency_ms, origin_ip) \
    VALUES ($1, $2, $3, $4, $5) \
    RETURNING id, service_name, timestamp, status_code, latency_ms, origin_ip, created_at";

/// Database-backed store for validated log events.
///
/// Insert-only: persisted rows are immutable and there is no delete path.
#[derive(Clone)]
pub struct LogStore {
    pool: DatabasePool,
}

impl LogStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Inserts one event and returns the stored row with its generated
    /// `id` and `created_at`.
    pub async fn insert_one(&self, event: &LogEvent) -> Result<StoredLog> {
        sqlx::query_as::<_, StoredLog>(INSERT_RETURNING)
            .bind(&event.service_name)
            .bind(event.timestamp)
            .bind(event.status_code)
            .bind(event.latency_ms)
            .bind(&event.origin_ip)
            .fetch_one(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_write)
    }

    /// Writes the full batch as one multi-row statement and returns the
    /// number of rows the store committed.
    ///
    /// An empty batch returns 0 without touching storage. A committed
    /// count that differs from the batch length is a store-integrity
    /// failure, not a validation failure.
    pub async fn insert_many(&self, events: &[LogEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut builder = batch_insert_statement(events);
        let result = builder
            .build()
            .execute(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_write)?;

        let inserted = result.rows_affected();
        if inserted != events.len() as u64 {
            warn!(
                expected = events.len(),
                inserted, "batch insert committed an unexpected row count"
            );
            return Err(LogPulseError::Ingestion(format!(
                "batch insert committed {inserted} of {} rows",
                events.len()
            )));
        }

        Ok(inserted)
    }
}

fn batch_insert_statement(events: &[LogEvent]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO logs (service_name, timestamp, status_code, latency_ms, origin_ip) ",
    );
    builder.push_values(events, |mut row, event| {
        row.push_bind(&event.service_name)
            .push_bind(event.timestamp)
            .push_bind(event.status_code)
            .push_bind(event.latency_ms)
            .push_bind(&event.origin_ip);
    });
    builder
}

/// Validation-then-store composition exposed to the gateway.
///
/// Admission (authentication, throttling) has already run upstream; this
/// service only validates and persists.
#[derive(Clone)]
pub struct IngestService {
    store: LogStore,
}

impl IngestService {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    /// Validates and persists a single candidate event.
    pub async fn ingest_one(&self, candidate: &LogEventCandidate) -> Result<StoredLog> {
        let event = validate_event(candidate)?;
        let stored = self.store.insert_one(&event).await?;
        info!(service = %stored.service_name, id = %stored.id, "ingested event");
        Ok(stored)
    }

    /// Validates and persists a batch atomically; returns the count the
    /// producer should see as its success count.
    pub async fn ingest_batch(&self, candidates: &[LogEventCandidate]) -> Result<u64> {
        let events = validate_batch(candidates)?;
        let inserted = self.store.insert_many(&events).await?;
        info!(inserted, "ingested batch");
        Ok(inserted)
    }
}
