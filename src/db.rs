use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::AppConfig;
use crate::errors::{LogPulseError, Result};

/// Wrapper around the shared Postgres connection pool.
///
/// The pool is the only shared mutable resource in the core: it is sized
/// to a fixed maximum, a connection is checked out per statement and
/// returned on every exit path.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool<Postgres>,
}

impl DatabasePool {
    /// Establishes a new connection pool based on the configuration.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_connections)
            .acquire_timeout(config.pool_acquire_timeout)
            .connect(config.database_url())
            .await
            .map_err(|err| LogPulseError::StoreUnavailable(err.to_string()))?;

        Ok(Self { pool })
    }

    /// Builds a pool that defers connecting until first use. Useful for
    /// embedding tests that never reach the store.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .connect_lazy(database_url)
            .map_err(|err| LogPulseError::Config(err.to_string()))?;

        Ok(Self { pool })
    }

    /// Applies the schema migrations shipped with the crate.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| LogPulseError::Config(format!("migration failed: {err}")))
    }

    pub fn inner(&self) -> &Pool<Postgres> {
        &self.pool
    }
}
