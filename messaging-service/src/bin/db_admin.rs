//! Schema management for the messages store
//!
//! ```text
//! db-admin init    apply pending migrations
//! db-admin reset   drop the messages table and recreate it (destroys data)
//! ```

use anyhow::{Result, bail};
use relay_config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let command = std::env::args().nth(1).unwrap_or_default();

    let config = Config::from_env()?;
    relay_server_shared::init_tracing(&config.logging)?;

    let pool = relay_db::create_pool(&config.db).await?;

    match command.as_str() {
        "init" => {
            relay_db::run_migrations(&pool).await?;
            info!(database = %config.db.redacted_target(), "Database initialized");
        }
        "reset" => {
            relay_db::reset_schema(&pool).await?;
            info!(database = %config.db.redacted_target(), "Database reset");
        }
        other => {
            pool.close().await;
            bail!("unknown command '{}': expected 'init' or 'reset'", other);
        }
    }

    pool.close().await;
    Ok(())
}
