//! # Relay Database
//!
//! Connection pooling, schema management and the message store for the relay
//! services. Postgres is the system of record; [`MemoryMessageStore`] backs
//! tests and local runs without a database.

mod memory;
mod postgres;
mod store;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;
pub use store::{MessageStore, StoreError};

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_config::DbConfig;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Build connection options from either `DATABASE_URL` or the discrete parts
pub fn connect_options(db_config: &DbConfig) -> Result<PgConnectOptions> {
    let options = match &db_config.url {
        Some(url) => PgConnectOptions::from_str(url).context("Invalid DATABASE_URL")?,
        None => PgConnectOptions::new()
            .host(&db_config.host)
            .port(db_config.port)
            .username(&db_config.user)
            .password(&db_config.password)
            .database(&db_config.name),
    };

    let statement_timeout = db_config.statement_timeout_ms.to_string();
    Ok(options.options([("statement_timeout", statement_timeout.as_str())]))
}

/// Create a PostgreSQL connection pool
pub async fn create_pool(db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect_with(connect_options(db_config)?)
        .await
        .with_context(|| format!("Failed to connect to {}", db_config.redacted_target()))?;

    Ok(pool)
}

/// Apply pending migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    Ok(())
}

/// Drop the messages table and migration history, then rebuild the schema
///
/// Destroys all stored messages.
pub async fn reset_schema(pool: &DbPool) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS messages CASCADE")
        .execute(pool)
        .await
        .context("Failed to drop messages table")?;
    sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
        .execute(pool)
        .await
        .context("Failed to drop migration history")?;

    tracing::warn!("Messages table dropped; recreating schema");
    run_migrations(pool).await
}
