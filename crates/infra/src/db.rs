//! Postgres connection pool and schema setup.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{StoreResult, map_sqlx_error};

/// The storefront schema. Idempotent: every statement is `IF NOT EXISTS`.
pub const SCHEMA: &str = include_str!("../migrations/0001_storefront.sql");

/// Open a pool with the configured limits.
#[instrument(skip(config, url), fields(max = config.max_connections, min = config.min_connections), err)]
pub async fn connect(url: &str, config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .connect(url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    info!("database pool ready");
    Ok(pool)
}

/// Create tables and indexes if they are missing.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    info!("schema up to date");
    Ok(())
}
