use thiserror::Error;

/// Result type used across the logpulse core.
pub type Result<T> = std::result::Result<T, LogPulseError>;

/// Canonical error taxonomy for the ingestion and analytics core.
///
/// Validation failures are raised before any store interaction and carry
/// the name of the violated field. Store-layer failures keep their
/// category: a write that the store rejected is `Ingestion`, a read is
/// `Query`, and connection/timeout exhaustion is `StoreUnavailable` so
/// callers can retry with backoff. The core itself never retries.
#[derive(Debug, Error)]
pub enum LogPulseError {
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: &'static str, message: String },

    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LogPulseError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LogPulseError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth retrying upstream.
    pub fn is_transient(&self) -> bool {
        matches!(self, LogPulseError::StoreUnavailable(_))
    }

    /// Classifies a store failure raised by a write path.
    pub(crate) fn classify_write(err: sqlx::Error) -> Self {
        if is_unavailable(&err) {
            LogPulseError::StoreUnavailable(err.to_string())
        } else {
            LogPulseError::Ingestion(err.to_string())
        }
    }

    /// Classifies a store failure raised by a read path.
    pub(crate) fn classify_read(err: sqlx::Error) -> Self {
        if is_unavailable(&err) {
            LogPulseError::StoreUnavailable(err.to_string())
        } else {
            LogPulseError::Query(err.to_string())
        }
    }
}

fn is_unavailable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {message}")]
    InvalidEnvVar { key: &'static str, message: String },
}

impl From<ConfigError> for LogPulseError {
    fn from(value: ConfigError) -> Self {
        LogPulseError::Config(value.to_string())
    }
}
