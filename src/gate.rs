use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::{LogPulseError, Result};

/// Rejection signals the gateway maps to 401/403 and 429 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("invalid API key")]
    Unauthorized,
    #[error("request rate limit exceeded")]
    Throttled,
}

/// Per-request admission: pre-shared-key authentication followed by a
/// per-client sliding-window rate cap.
///
/// The embedding gateway runs this before any core operation; the core
/// itself performs no redundant authentication or throttling.
pub struct AdmissionGate {
    key_digest: String,
    limiter: SlidingWindowLimiter,
}

impl AdmissionGate {
    /// `key_digest` is the hex-encoded SHA-256 digest of the pre-shared
    /// API key. Key issuance and rotation live outside this crate.
    pub fn new(key_digest: impl Into<String>, max_requests: u64, window: Duration) -> Self {
        Self {
            key_digest: key_digest.into().to_ascii_lowercase(),
            limiter: SlidingWindowLimiter::new(max_requests, window),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let digest = config
            .api_key_hash
            .as_deref()
            .ok_or_else(|| LogPulseError::Config("API_KEY_HASH is not configured".into()))?;

        Ok(Self::new(
            digest,
            config.rate_limit_max,
            config.rate_limit_window,
        ))
    }

    /// Authenticates the presented key, then charges one request against
    /// the client's window. Authentication failures do not consume rate
    /// budget.
    pub fn admit(&self, client_id: &str, api_key: &str) -> std::result::Result<(), AdmissionError> {
        if !self.verify_key(api_key) {
            warn!(client_id, "rejected request with invalid API key");
            return Err(AdmissionError::Unauthorized);
        }

        if !self.limiter.try_acquire(client_id) {
            warn!(client_id, "throttled client over its rate window");
            return Err(AdmissionError::Throttled);
        }

        Ok(())
    }

    fn verify_key(&self, api_key: &str) -> bool {
        hex::encode(Sha256::digest(api_key.as_bytes())) == self.key_digest
    }
}

/// Sliding-window request counter keyed by client identity.
///
/// Each client carries a log of its recent request instants; entries
/// older than the window are pruned on every acquisition attempt.
pub struct SlidingWindowLimiter {
    limit: u64,
    period: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u64, period: Duration) -> Self {
        Self {
            limit,
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, client_id: &str) -> bool {
        self.try_acquire_at(client_id, Instant::now())
    }

    fn try_acquire_at(&self, client_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("rate limit mutex poisoned");
        let hits = windows.entry(client_id.to_string()).or_default();

        while hits
            .front()
            .is_some_and(|hit| now.duration_since(*hit) >= self.period)
        {
            hits.pop_front();
        }

        if (hits.len() as u64) < self.limit {
            hits.push_back(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    #[test]
    fn admits_the_configured_key() {
        let gate = AdmissionGate::new(digest_of("s3cret"), 10, Duration::from_secs(60));
        assert_eq!(gate.admit("10.0.0.1", "s3cret"), Ok(()));
    }

    #[test]
    fn rejects_a_wrong_key_without_consuming_budget() {
        let gate = AdmissionGate::new(digest_of("s3cret"), 1, Duration::from_secs(60));
        assert_eq!(
            gate.admit("10.0.0.1", "guess"),
            Err(AdmissionError::Unauthorized)
        );
        // The failed attempt above must not have used the single slot.
        assert_eq!(gate.admit("10.0.0.1", "s3cret"), Ok(()));
    }

    #[test]
    fn throttles_past_the_cap_and_keeps_clients_independent() {
        let gate = AdmissionGate::new(digest_of("s3cret"), 2, Duration::from_secs(60));
        assert_eq!(gate.admit("client-a", "s3cret"), Ok(()));
        assert_eq!(gate.admit("client-a", "s3cret"), Ok(()));
        assert_eq!(
            gate.admit("client-a", "s3cret"),
            Err(AdmissionError::Throttled)
        );
        assert_eq!(gate.admit("client-b", "s3cret"), Ok(()));
    }

    #[test]
    fn window_slides_rather_than_resets() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.try_acquire_at("c", start));
        assert!(limiter.try_acquire_at("c", start + Duration::from_secs(6)));
        assert!(!limiter.try_acquire_at("c", start + Duration::from_secs(9)));

        // The first hit expires at +10s; the one from +6s still counts.
        assert!(limiter.try_acquire_at("c", start + Duration::from_secs(11)));
        assert!(!limiter.try_acquire_at("c", start + Duration::from_secs(12)));
    }

    #[test]
    fn digest_comparison_is_case_insensitive_on_config_side() {
        let gate = AdmissionGate::new(digest_of("s3cret").to_uppercase(), 10, Duration::from_secs(60));
        assert_eq!(gate.admit("10.0.0.1", "s3cret"), Ok(()));
    }
}
