use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::{LogPulseError, Result};
use crate::validate::is_valid_service_name;

/// One validated request-log event, ready for ingestion.
///
/// Immutable once persisted: the store offers insert and read only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub status_code: i32,
    pub latency_ms: i32,
    /// Textual form of a validated IPv4 or IPv6 literal.
    pub origin_ip: String,
}

/// A persisted event with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredLog {
    pub id: Uuid,
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub status_code: i32,
    pub latency_ms: i32,
    pub origin_ip: String,
    pub created_at: DateTime<Utc>,
}

/// Bucket width for the requests-over-time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    #[default]
    Hour,
    Day,
}

impl Granularity {
    /// The `date_trunc` field name matching this bucket width.
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

/// One of the four canonical status-code classes usable as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "2xx" => Some(StatusClass::Success),
            "3xx" => Some(StatusClass::Redirect),
            "4xx" => Some(StatusClass::ClientError),
            "5xx" => Some(StatusClass::ServerError),
            _ => None,
        }
    }

    /// Inclusive code range covered by this class.
    pub fn bounds(self) -> (i32, i32) {
        match self {
            StatusClass::Success => (200, 299),
            StatusClass::Redirect => (300, 399),
            StatusClass::ClientError => (400, 499),
            StatusClass::ServerError => (500, 599),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::Redirect => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
        }
    }
}

/// Status-code criterion of a log filter: a whole class or one exact code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCodeFilter {
    Class(StatusClass),
    Exact(i32),
}

impl StatusCodeFilter {
    /// Parses the untrusted textual form: one of the four classes, or
    /// exactly three digits. Anything else is a validation error.
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(class) = StatusClass::parse(value) {
            return Ok(StatusCodeFilter::Class(class));
        }

        if value.len() == 3 && value.bytes().all(|b| b.is_ascii_digit()) {
            let code: i32 = value
                .parse()
                .map_err(|_| LogPulseError::validation("statusCode", "not a numeric code"))?;
            return Ok(StatusCodeFilter::Exact(code));
        }

        Err(LogPulseError::validation(
            "statusCode",
            "must be 2xx, 3xx, 4xx, 5xx, or a specific 3-digit code",
        ))
    }
}

/// Untrusted pagination/filter parameters as received from the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub service_name: Option<String>,
    pub status_code: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Validated log-listing filter. Every field has been range- and
/// shape-checked; user-supplied values are only ever bound as statement
/// parameters by the filter compiler.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub service_name: Option<String>,
    pub status_code: Option<StatusCodeFilter>,
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            service_name: None,
            status_code: None,
            start_time: None,
        }
    }
}

impl LogFilter {
    pub fn from_params(params: LogFilterParams) -> Result<Self> {
        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err(LogPulseError::validation("page", "must be at least 1"));
        }

        let limit = params.limit.unwrap_or(10);
        if !(1..=100).contains(&limit) {
            return Err(LogPulseError::validation(
                "limit",
                "must be between 1 and 100",
            ));
        }

        if let Some(search) = &params.search {
            if search.is_empty() || search.len() > 100 {
                return Err(LogPulseError::validation(
                    "search",
                    "must be 1-100 characters",
                ));
            }
        }

        if let Some(name) = &params.service_name {
            if !is_valid_service_name(name) {
                return Err(LogPulseError::validation(
                    "serviceName",
                    "must contain only alphanumeric characters, hyphens, and underscores",
                ));
            }
        }

        let status_code = params
            .status_code
            .as_deref()
            .map(StatusCodeFilter::parse)
            .transpose()?;

        Ok(Self {
            page,
            limit,
            search: params.search,
            service_name: params.service_name,
            status_code,
            start_time: params.start_time,
        })
    }

    /// Row offset derived from page and limit.
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// Untrusted analytics-window parameters as received from the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub service_name: Option<String>,
    pub granularity: Option<Granularity>,
}

/// Validated closed analytics window with optional service scope.
#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub service_name: Option<String>,
    pub granularity: Granularity,
}

impl AnalyticsQuery {
    /// Resolves defaults (last 24 hours, hourly buckets) against an
    /// explicit `now` and enforces `start_time < end_time`.
    pub fn resolve(params: AnalyticsParams, now: DateTime<Utc>) -> Result<Self> {
        let start_time = params.start_time.unwrap_or(now - Duration::hours(24));
        let end_time = params.end_time.unwrap_or(now);

        if start_time >= end_time {
            return Err(LogPulseError::validation(
                "startTime",
                "must be before endTime",
            ));
        }

        if let Some(name) = &params.service_name {
            if !is_valid_service_name(name) {
                return Err(LogPulseError::validation(
                    "serviceName",
                    "must contain only alphanumeric characters, hyphens, and underscores",
                ));
            }
        }

        Ok(Self {
            start_time,
            end_time,
            service_name: params.service_name,
            granularity: params.granularity.unwrap_or_default(),
        })
    }

    /// Wall-clock convenience wrapper around [`AnalyticsQuery::resolve`].
    pub fn resolve_now(params: AnalyticsParams) -> Result<Self> {
        Self::resolve(params, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test_case("2xx", StatusCodeFilter::Class(StatusClass::Success))]
    #[test_case("3xx", StatusCodeFilter::Class(StatusClass::Redirect))]
    #[test_case("4xx", StatusCodeFilter::Class(StatusClass::ClientError))]
    #[test_case("5xx", StatusCodeFilter::Class(StatusClass::ServerError))]
    #[test_case("404", StatusCodeFilter::Exact(404))]
    #[test_case("200", StatusCodeFilter::Exact(200))]
    fn parses_well_formed_status_filters(input: &str, expected: StatusCodeFilter) {
        assert_eq!(StatusCodeFilter::parse(input).unwrap(), expected);
    }

    #[test_case("1xx")]
    #[test_case("40x")]
    #[test_case("4040")]
    #[test_case("44")]
    #[test_case("abc")]
    #[test_case("")]
    fn rejects_malformed_status_filters(input: &str) {
        let err = StatusCodeFilter::parse(input).unwrap_err();
        assert!(matches!(
            err,
            LogPulseError::Validation {
                field: "statusCode",
                ..
            }
        ));
    }

    #[test]
    fn filter_defaults_and_offset() {
        let filter = LogFilter::from_params(LogFilterParams::default()).unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 10);
        assert_eq!(filter.offset(), 0);

        let filter = LogFilter::from_params(LogFilterParams {
            page: Some(3),
            limit: Some(20),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.offset(), 40);
    }

    #[test_case(Some(0), None; "zero page")]
    #[test_case(None, Some(0); "zero limit")]
    #[test_case(None, Some(101); "limit above cap")]
    fn rejects_out_of_range_pagination(page: Option<u32>, limit: Option<u32>) {
        let params = LogFilterParams {
            page,
            limit,
            ..Default::default()
        };
        assert!(LogFilter::from_params(params).is_err());
    }

    #[test]
    fn rejects_malformed_service_name_filter() {
        let params = LogFilterParams {
            service_name: Some("bad name!".into()),
            ..Default::default()
        };
        let err = LogFilter::from_params(params).unwrap_err();
        assert!(matches!(
            err,
            LogPulseError::Validation {
                field: "serviceName",
                ..
            }
        ));
    }

    #[test]
    fn analytics_defaults_to_last_24h_hourly() {
        let now = frozen_now();
        let query = AnalyticsQuery::resolve(AnalyticsParams::default(), now).unwrap();
        assert_eq!(query.end_time, now);
        assert_eq!(query.start_time, now - Duration::hours(24));
        assert_eq!(query.granularity, Granularity::Hour);
    }

    #[test]
    fn analytics_rejects_inverted_or_empty_window() {
        let now = frozen_now();
        let inverted = AnalyticsParams {
            start_time: Some(now),
            end_time: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(AnalyticsQuery::resolve(inverted, now).is_err());

        let empty = AnalyticsParams {
            start_time: Some(now),
            end_time: Some(now),
            ..Default::default()
        };
        assert!(AnalyticsQuery::resolve(empty, now).is_err());
    }

    #[test]
    fn granularity_maps_to_date_trunc_fields() {
        assert_eq!(Granularity::Minute.as_str(), "minute");
        assert_eq!(Granularity::Hour.as_str(), "hour");
        assert_eq!(Granularity::Day.as_str(), "day");
    }

    #[test]
    fn status_class_bounds_are_inclusive_and_disjoint() {
        assert_eq!(StatusClass::Success.bounds(), (200, 299));
        assert_eq!(StatusClass::Redirect.bounds(), (300, 399));
        assert_eq!(StatusClass::ClientError.bounds(), (400, 499));
        assert_eq!(StatusClass::ServerError.bounds(), (500, 599));
    }
}
