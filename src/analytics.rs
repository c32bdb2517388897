use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};

use crate::db::DatabasePool;
use crate::errors::{LogPulseError, Result};
use crate::model::{AnalyticsQuery, Granularity};

/// How many services the detailed report ranks.
const TOP_SERVICES_LIMIT: i64 = 10;

const STATUS_CLASS_CASE: &str = "\
    CASE \
    WHEN status_code >= 200 AND status_code < 300 THEN '2xx' \
    WHEN status_code >= 300 AND status_code < 400 THEN '3xx' \
    WHEN status_code >= 400 AND status_code < 500 THEN '4xx' \
    WHEN status_code >= 500 AND status_code < 600 THEN '5xx' \
    ELSE 'other' END";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&AnalyticsQuery> for TimeRange {
    fn from(query: &AnalyticsQuery) -> Self {
        Self {
            start: query.start_time,
            end: query.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_requests: i64,
    pub error_rate: f64,
    pub average_latency: f64,
    pub time_range: TimeRange,
}

/// One non-empty class of the status histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBucket {
    pub status_code: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopService {
    pub service_name: String,
    pub request_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub bucket: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesReport {
    pub time_series: Vec<TimeSeriesPoint>,
    pub granularity: Granularity,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMetrics {
    pub total_requests: i64,
    pub error_rate: f64,
    pub average_latency: f64,
}

/// The composite report: every aggregate over one shared window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedAnalytics {
    pub summary: CoreMetrics,
    pub status_distribution: Vec<StatusBucket>,
    pub latency_percentiles: LatencyPercentiles,
    pub top_services: Vec<TopService>,
    pub time_series: Vec<TimeSeriesPoint>,
    pub time_range: TimeRange,
    pub granularity: Granularity,
}

/// Time-windowed aggregate analytics over the stored logs.
///
/// Every aggregate is recomputed from the store on each call; there is no
/// in-process cache or shared mutable state, so the composite report can
/// fan its sub-queries out concurrently.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    pool: DatabasePool,
}

impl AnalyticsAggregator {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Count of events inside the closed window.
    pub async fn total_requests(&self, query: &AnalyticsQuery) -> Result<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        push_window(&mut builder, query);
        builder
            .build_query_scalar()
            .fetch_one(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)
    }

    /// Percentage of events with `status_code >= 400`; exactly 0 for an
    /// empty window.
    pub async fn error_rate(&self, query: &AnalyticsQuery) -> Result<f64> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FILTER (WHERE status_code >= 400), COUNT(*) FROM logs",
        );
        push_window(&mut builder, query);
        let (errors, total): (i64, i64) = builder
            .build_query_as()
            .fetch_one(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(errors as f64 / total as f64 * 100.0)
    }

    /// Arithmetic mean of `latency_ms`; exactly 0 for an empty window.
    pub async fn average_latency(&self, query: &AnalyticsQuery) -> Result<f64> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COALESCE(AVG(latency_ms), 0)::double precision FROM logs",
        );
        push_window(&mut builder, query);
        builder
            .build_query_scalar()
            .fetch_one(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)
    }

    /// Histogram over the five mutually exclusive status classes, ordered
    /// by class label; classes with no events are omitted.
    pub async fn status_distribution(&self, query: &AnalyticsQuery) -> Result<Vec<StatusBucket>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {STATUS_CLASS_CASE} AS status_class, COUNT(*) FROM logs"
        ));
        push_window(&mut builder, query);
        builder.push(" GROUP BY 1 ORDER BY 1");

        let rows: Vec<(String, i64)> = builder
            .build_query_as()
            .fetch_all(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)?;

        Ok(rows
            .into_iter()
            .map(|(status_code, count)| StatusBucket { status_code, count })
            .collect())
    }

    /// Continuous-interpolation p50/p95/p99 of `latency_ms`; all zero for
    /// an empty window.
    pub async fn latency_percentiles(&self, query: &AnalyticsQuery) -> Result<LatencyPercentiles> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT \
             percentile_cont(0.50) WITHIN GROUP (ORDER BY latency_ms), \
             percentile_cont(0.95) WITHIN GROUP (ORDER BY latency_ms), \
             percentile_cont(0.99) WITHIN GROUP (ORDER BY latency_ms) \
             FROM logs",
        );
        push_window(&mut builder, query);

        let (p50, p95, p99): (Option<f64>, Option<f64>, Option<f64>) = builder
            .build_query_as()
            .fetch_one(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)?;

        Ok(LatencyPercentiles {
            p50: p50.unwrap_or(0.0),
            p95: p95.unwrap_or(0.0),
            p99: p99.unwrap_or(0.0),
        })
    }

    /// Services ranked by descending event count within the window, name
    /// ascending on equal counts, truncated to `limit`.
    pub async fn top_services(&self, query: &AnalyticsQuery, limit: i64) -> Result<Vec<TopService>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT service_name, COUNT(*) FROM logs");
        push_window(&mut builder, query);
        builder.push(" GROUP BY service_name ORDER BY COUNT(*) DESC, service_name ASC LIMIT ");
        builder.push_bind(limit);

        let rows: Vec<(String, i64)> = builder
            .build_query_as()
            .fetch_all(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)?;

        Ok(rows
            .into_iter()
            .map(|(service_name, request_count)| TopService {
                service_name,
                request_count,
            })
            .collect())
    }

    /// Sparse count-per-bucket series, buckets aligned to the
    /// granularity's natural boundary, ascending.
    pub async fn requests_over_time(&self, query: &AnalyticsQuery) -> Result<Vec<TimeSeriesPoint>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT date_trunc(");
        builder.push_bind(query.granularity.as_str());
        builder.push(", timestamp) AS bucket, COUNT(*) FROM logs");
        push_window(&mut builder, query);
        builder.push(" GROUP BY bucket ORDER BY bucket");

        let rows: Vec<(DateTime<Utc>, i64)> = builder
            .build_query_as()
            .fetch_all(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)?;

        Ok(rows
            .into_iter()
            .map(|(bucket, count)| TimeSeriesPoint { bucket, count })
            .collect())
    }

    /// The three headline metrics, computed concurrently.
    pub async fn summary(&self, query: &AnalyticsQuery) -> Result<AnalyticsSummary> {
        let (total_requests, error_rate, average_latency) = tokio::try_join!(
            self.total_requests(query),
            self.error_rate(query),
            self.average_latency(query),
        )?;

        Ok(AnalyticsSummary {
            total_requests,
            error_rate,
            average_latency,
            time_range: query.into(),
        })
    }

    /// The bucketed series wrapped with its window and granularity.
    pub async fn time_series(&self, query: &AnalyticsQuery) -> Result<TimeSeriesReport> {
        Ok(TimeSeriesReport {
            time_series: self.requests_over_time(query).await?,
            granularity: query.granularity,
            time_range: query.into(),
        })
    }

    /// Runs every aggregate concurrently over the same window and
    /// assembles one report.
    pub async fn detailed(&self, query: &AnalyticsQuery) -> Result<DetailedAnalytics> {
        let (
            total_requests,
            error_rate,
            average_latency,
            status_distribution,
            latency_percentiles,
            top_services,
            time_series,
        ) = tokio::try_join!(
            self.total_requests(query),
            self.error_rate(query),
            self.average_latency(query),
            self.status_distribution(query),
            self.latency_percentiles(query),
            self.top_services(query, TOP_SERVICES_LIMIT),
            self.requests_over_time(query),
        )?;

        Ok(DetailedAnalytics {
            summary: CoreMetrics {
                total_requests,
                error_rate,
                average_latency,
            },
            status_distribution,
            latency_percentiles,
            top_services,
            time_series,
            time_range: query.into(),
            granularity: query.granularity,
        })
    }
}

/// Pushes the closed-window predicate shared by every aggregate: both
/// bounds inclusive, optional exact service scope.
fn push_window(builder: &mut QueryBuilder<'_, Postgres>, query: &AnalyticsQuery) {
    builder.push(" WHERE timestamp >= ");
    builder.push_bind(query.start_time);
    builder.push(" AND timestamp <= ");
    builder.push_bind(query.end_time);

    if let Some(service_name) = &query.service_name {
        builder.push(" AND service_name = ");
        builder.push_bind(service_name.clone());
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn window(service: Option<&str>) -> AnalyticsQuery {
        AnalyticsQuery {
            start_time: Utc.with_ymd_and_hms(2024, 5, 9, 12, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
            service_name: service.map(Into::into),
            granularity: Granularity::Hour,
        }
    }

    #[test]
    fn window_predicate_is_closed_on_both_ends() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        push_window(&mut builder, &window(None));
        assert_eq!(
            builder.into_sql(),
            "SELECT COUNT(*) FROM logs WHERE timestamp >= $1 AND timestamp <= $2"
        );
    }

    #[test]
    fn service_scope_adds_an_exact_match_bind() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        push_window(&mut builder, &window(Some("checkout")));
        assert_eq!(
            builder.into_sql(),
            "SELECT COUNT(*) FROM logs \
             WHERE timestamp >= $1 AND timestamp <= $2 AND service_name = $3"
        );
    }

    #[test]
    fn time_series_statement_binds_the_granularity_field() {
        let query = window(None);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT date_trunc(");
        builder.push_bind(query.granularity.as_str());
        builder.push(", timestamp) AS bucket, COUNT(*) FROM logs");
        push_window(&mut builder, &query);
        builder.push(" GROUP BY bucket ORDER BY bucket");

        assert_eq!(
            builder.into_sql(),
            "SELECT date_trunc($1, timestamp) AS bucket, COUNT(*) FROM logs \
             WHERE timestamp >= $2 AND timestamp <= $3 \
             GROUP BY bucket ORDER BY bucket"
        );
    }

    #[test]
    fn status_case_covers_all_five_classes() {
        for label in ["'2xx'", "'3xx'", "'4xx'", "'5xx'", "'other'"] {
            assert!(STATUS_CLASS_CASE.contains(label));
        }
    }
}
