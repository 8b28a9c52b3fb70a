// ============================================================================
// Logging Configuration
// ============================================================================

use crate::env::{Lookup, parse_or, string_or};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (RUST_LOG)
    pub filter: String,
    pub format: LogFormat,
    /// Include message payloads in drift records written to the log
    pub log_payloads: bool,
}

impl LoggingConfig {
    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> anyhow::Result<Self> {
        let format = match string_or(lookup, "LOG_FORMAT", "pretty")
            .to_ascii_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        };

        Ok(Self {
            filter: string_or(lookup, "RUST_LOG", "info"),
            format,
            log_payloads: parse_or(lookup, "LOG_PAYLOADS", true),
        })
    }
}
