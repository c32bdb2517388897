//! Ingestion and analytics core for structured request logs.
//!
//! This crate exposes the pieces an HTTP gateway composes into a log
//! analytics service: event and batch validation, durable batched
//! ingestion, injection-safe filtered pagination, time-windowed aggregate
//! analytics, and the admission-gate contract that runs before any of it.

pub mod analytics;
pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod gate;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod query;
pub mod validate;

pub use analytics::{AnalyticsAggregator, AnalyticsSummary, DetailedAnalytics, TimeSeriesReport};
pub use config::{load_config, AppConfig};
pub use db::DatabasePool;
pub use errors::{LogPulseError, Result};
pub use gate::{AdmissionError, AdmissionGate};
pub use ingest::{IngestService, LogStore};
pub use model::{
    AnalyticsParams, AnalyticsQuery, Granularity, LogEvent, LogFilter, LogFilterParams, StoredLog,
};
pub use query::{LogPage, LogQueryService};
pub use validate::{
    validate_batch, validate_batch_at, validate_event, validate_event_at, LogEventCandidate,
    MAX_BATCH_SIZE,
};
