// ============================================================================
// Database Configuration
// ============================================================================

use crate::constants::*;
use crate::env::{Lookup, parse_or, string_or};

/// Store connection and pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Full connection URL; when set it wins over the discrete fields below
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
    /// Server-side `statement_timeout` applied to every connection (milliseconds)
    pub statement_timeout_ms: u64,
}

impl DbConfig {
    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            host: string_or(lookup, "DB_HOST", DEFAULT_DB_HOST),
            port: parse_or(lookup, "DB_PORT", DEFAULT_DB_PORT),
            user: string_or(lookup, "DB_USER", DEFAULT_DB_USER),
            password: string_or(lookup, "DB_PASSWORD", DEFAULT_DB_PASSWORD),
            name: string_or(lookup, "DB_NAME", DEFAULT_DB_NAME),
            max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: parse_or(lookup, "DB_ACQUIRE_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_or(lookup, "DB_IDLE_TIMEOUT_SECS", 600),
            statement_timeout_ms: parse_or(lookup, "DB_STATEMENT_TIMEOUT_MS", 5000),
        }
    }

    /// Connection target with the password masked, for logs
    pub fn redacted_target(&self) -> String {
        match &self.url {
            Some(url) => match (url.find("://"), url.rfind('@')) {
                (Some(scheme_end), Some(at_pos)) if at_pos > scheme_end => {
                    format!("{}***{}", &url[..scheme_end + 3], &url[at_pos..])
                }
                _ => url.clone(),
            },
            None => format!(
                "postgres://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.name
            ),
        }
    }
}

// Manual Debug keeps the password out of logs
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("target", &self.redacted_target())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish()
    }
}
