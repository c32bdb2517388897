use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};

use crate::db::DatabasePool;
use crate::errors::{LogPulseError, Result};
use crate::filter::push_filter_predicates;
use crate::model::{LogFilter, StoredLog};

const LOG_COLUMNS: &str =
    "id, service_name, timestamp, status_code, latency_ms, origin_ip, created_at";

/// One page of filtered log listing, with the total over the same
/// predicate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<StoredLog>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
}

/// Read side for stored logs: filtered pagination and service discovery.
#[derive(Clone)]
pub struct LogQueryService {
    pool: DatabasePool,
}

impl LogQueryService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Returns one page of logs plus the matching total.
    ///
    /// Count and page statements are compiled from the same predicate
    /// step and executed on one transaction, so `total` and `logs`
    /// always reflect the identical WHERE clause over a consistent view.
    pub async fn paginate(&self, filter: &LogFilter) -> Result<LogPage> {
        let mut tx = self
            .pool
            .inner()
            .begin()
            .await
            .map_err(LogPulseError::classify_read)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        push_filter_predicates(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(LogPulseError::classify_read)?;

        let mut data = QueryBuilder::<Postgres>::new(format!("SELECT {LOG_COLUMNS} FROM logs"));
        push_filter_predicates(&mut data, filter);
        data.push(" ORDER BY timestamp DESC LIMIT ");
        data.push_bind(i64::from(filter.limit));
        data.push(" OFFSET ");
        data.push_bind(filter.offset());
        let logs = data
            .build_query_as::<StoredLog>()
            .fetch_all(&mut *tx)
            .await
            .map_err(LogPulseError::classify_read)?;

        tx.commit().await.map_err(LogPulseError::classify_read)?;

        Ok(LogPage {
            logs,
            total,
            page: filter.page,
            total_pages: total_pages(total, filter.limit),
        })
    }

    /// Distinct service names seen in storage, ascending.
    pub async fn distinct_services(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT service_name FROM logs ORDER BY service_name")
            .fetch_all(self.pool.inner())
            .await
            .map_err(LogPulseError::classify_read)
    }
}

/// `ceil(total / limit)`, with an empty result yielding zero pages.
fn total_pages(total: i64, limit: u32) -> i64 {
    if total == 0 {
        return 0;
    }
    let limit = i64::from(limit);
    (total + limit - 1) / limit
}
