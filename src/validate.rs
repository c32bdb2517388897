use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::errors::{LogPulseError, Result};
use crate::model::LogEvent;

/// Hard cap on the number of events accepted in one ingestion batch.
pub const MAX_BATCH_SIZE: usize = 1000;

const MAX_EVENT_AGE_DAYS: i64 = 30;
const MAX_LATENCY_MS: i64 = 300_000;

/// An untrusted candidate event as received on the wire.
///
/// Every field is optional so that a missing field surfaces as a
/// field-identified validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEventCandidate {
    pub service_name: Option<String>,
    pub timestamp: Option<String>,
    pub status_code: Option<i64>,
    pub latency_ms: Option<i64>,
    pub origin_ip: Option<String>,
}

/// Whether a service name is 1-64 chars drawn from `[A-Za-z0-9_-]`.
pub(crate) fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validates a single candidate event against an explicit `now`.
///
/// Checks run in field order: presence, service-name shape, timestamp
/// well-formedness and temporal bound (inclusive on both ends), status
/// bound, latency bound, IP grammar. Pure function of input and `now`.
pub fn validate_event_at(candidate: &LogEventCandidate, now: DateTime<Utc>) -> Result<LogEvent> {
    let service_name = require(candidate.service_name.as_deref(), "serviceName")?;
    if !is_valid_service_name(service_name) {
        return Err(LogPulseError::validation(
            "serviceName",
            "must be 1-64 alphanumeric characters, hyphens, or underscores",
        ));
    }

    let raw_timestamp = require(candidate.timestamp.as_deref(), "timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|err| LogPulseError::validation("timestamp", format!("not a valid instant: {err}")))?
        .with_timezone(&Utc);
    if timestamp > now {
        return Err(LogPulseError::validation(
            "timestamp",
            "must not be in the future",
        ));
    }
    if timestamp < now - Duration::days(MAX_EVENT_AGE_DAYS) {
        return Err(LogPulseError::validation(
            "timestamp",
            format!("must not be older than {MAX_EVENT_AGE_DAYS} days"),
        ));
    }

    let status_code = require(candidate.status_code, "statusCode")?;
    if !(100..=599).contains(&status_code) {
        return Err(LogPulseError::validation(
            "statusCode",
            "must be between 100 and 599",
        ));
    }

    let latency_ms = require(candidate.latency_ms, "latencyMs")?;
    if !(0..=MAX_LATENCY_MS).contains(&latency_ms) {
        return Err(LogPulseError::validation(
            "latencyMs",
            format!("must be between 0 and {MAX_LATENCY_MS}"),
        ));
    }

    let origin_ip = require(candidate.origin_ip.as_deref(), "originIp")?;
    if origin_ip.parse::<IpAddr>().is_err() {
        return Err(LogPulseError::validation(
            "originIp",
            "must be a valid IPv4 or IPv6 address",
        ));
    }

    Ok(LogEvent {
        service_name: service_name.to_string(),
        timestamp,
        status_code: status_code as i32,
        latency_ms: latency_ms as i32,
        origin_ip: origin_ip.to_string(),
    })
}

/// Wall-clock convenience wrapper around [`validate_event_at`].
pub fn validate_event(candidate: &LogEventCandidate) -> Result<LogEvent> {
    validate_event_at(candidate, Utc::now())
}

/// Validates an ordered batch, all-or-nothing.
///
/// The cardinality cap is enforced before any element is examined; the
/// first failing element aborts the batch with its field detail and
/// position, and no partial result is surfaced.
pub fn validate_batch_at(
    candidates: &[LogEventCandidate],
    now: DateTime<Utc>,
) -> Result<Vec<LogEvent>> {
    if candidates.len() > MAX_BATCH_SIZE {
        return Err(LogPulseError::validation(
            "batch",
            format!(
                "batch of {} events exceeds the maximum of {MAX_BATCH_SIZE}",
                candidates.len()
            ),
        ));
    }

    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            validate_event_at(candidate, now).map_err(|err| match err {
                LogPulseError::Validation { field, message } => LogPulseError::Validation {
                    field,
                    message: format!("event {index}: {message}"),
                },
                other => other,
            })
        })
        .collect()
}

/// Wall-clock convenience wrapper around [`validate_batch_at`].
pub fn validate_batch(candidates: &[LogEventCandidate]) -> Result<Vec<LogEvent>> {
    validate_batch_at(candidates, Utc::now())
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or_else(|| LogPulseError::validation(field, "is required"))
}
