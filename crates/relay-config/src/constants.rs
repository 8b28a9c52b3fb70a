// ============================================================================
// Configuration Constants
// ============================================================================

// Listen port used when PORT is unset
pub(crate) const DEFAULT_PORT: u16 = 3000;

// Store connection defaults
pub(crate) const DEFAULT_DB_HOST: &str = "localhost";
pub(crate) const DEFAULT_DB_PORT: u16 = 5432;
pub(crate) const DEFAULT_DB_USER: &str = "user";
pub(crate) const DEFAULT_DB_PASSWORD: &str = "password";
pub(crate) const DEFAULT_DB_NAME: &str = "mydb";

// Broker connection defaults
pub(crate) const DEFAULT_KAFKA_CLIENT_ID: &str = "my-app";
pub(crate) const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

// Grace period for in-flight operations during shutdown (seconds)
pub(crate) const DEFAULT_SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 10;

pub const MAX_REQUEST_BODY_SIZE: usize = 2 * 1024 * 1024; // 2 MB
