// ============================================================================
// Relay Config - Centralized configuration management
// ============================================================================
//
// Configuration for the relay services, loaded from environment variables
// (with `.env` support) and falling back to local-development defaults.
//
// ============================================================================

mod constants;
mod database;
mod env;
mod kafka;
mod logging;

pub use constants::MAX_REQUEST_BODY_SIZE;
pub use database::DbConfig;
pub use kafka::KafkaConfig;
pub use logging::{LogFormat, LoggingConfig};

use anyhow::Result;
use constants::*;
use env::{Lookup, parse_or};

/// Main configuration structure for the relay services
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,

    /// How long shutdown waits for in-flight operations before disconnecting
    pub shutdown_drain_timeout_secs: u64,

    // Sub-configurations
    pub db: DbConfig,
    pub kafka: KafkaConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let port = parse_or(lookup, "PORT", DEFAULT_PORT);

        Ok(Self {
            port,
            bind_address: format!("0.0.0.0:{}", port),
            shutdown_drain_timeout_secs: parse_or(
                lookup,
                "SHUTDOWN_DRAIN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_DRAIN_TIMEOUT_SECS,
            ),
            db: DbConfig::from_lookup(lookup),
            kafka: KafkaConfig::from_lookup(lookup),
            logging: LoggingConfig::from_lookup(lookup)?,
        })
    }
}
