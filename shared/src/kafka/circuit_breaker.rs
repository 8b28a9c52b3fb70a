// ============================================================================
// Circuit Breaker for the Event Publisher
// ============================================================================
//
// Bounds how long a broker outage can hold up mutating requests.
//
// States:
// - CLOSED: publishes go through; consecutive failures are counted
// - OPEN: after `failure_threshold` consecutive failures, publishes are
//   rejected immediately until `reset_timeout` has elapsed
// - HALF_OPEN: one trial publish is let through; success closes the
//   circuit, failure reopens it for another `reset_timeout`
//
// Every call is also bounded by `timeout`, and a timeout counts as a failure.
//
// ============================================================================

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use relay_config::KafkaConfig;

use crate::metrics;

/// Circuit Breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Timeout for each operation
    pub timeout: Duration,
    /// Time to wait before attempting recovery (half-open)
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(5),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&KafkaConfig> for CircuitBreakerConfig {
    fn from(config: &KafkaConfig) -> Self {
        Self {
            failure_threshold: config.circuit_failure_threshold.max(1),
            timeout: Duration::from_millis(config.publish_timeout_ms),
            reset_timeout: Duration::from_secs(config.circuit_reset_secs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, request rejected without running
    #[error("circuit breaker is open (retry in {retry_in:?})")]
    Open { retry_in: Duration },

    #[error("operation exceeded {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    fn gauge_value(self) -> i64 {
        match self {
            State::Closed => 0,
            State::Open => 1,
            State::HalfOpen => 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Admission decision taken under the lock before running an operation
enum Admission {
    Allowed { trial: bool },
    Rejected(Duration),
}

/// Thread-safe circuit breaker
///
/// The lock is only held to read or update state, never across the
/// protected operation.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            config,
        }
    }

    /// Run `f` under circuit breaker protection
    ///
    /// Returns `Open` without polling `f` when the circuit is open (or a
    /// half-open trial is already running), `Timeout` when `f` exceeds the
    /// configured timeout, and `Inner` when `f` itself fails.
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let trial = match self.admit() {
            Admission::Allowed { trial } => trial,
            Admission::Rejected(retry_in) => {
                tracing::warn!(
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Circuit breaker OPEN - rejecting publish"
                );
                return Err(CircuitBreakerError::Open { retry_in });
            }
        };

        match tokio::time::timeout(self.config.timeout, f).await {
            Ok(Ok(value)) => {
                self.on_success(trial);
                Ok(value)
            }
            Ok(Err(error)) => {
                self.on_failure(trial);
                Err(CircuitBreakerError::Inner(error))
            }
            Err(_elapsed) => {
                self.on_failure(trial);
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Circuit breaker timeout"
                );
                Err(CircuitBreakerError::Timeout {
                    timeout: self.config.timeout,
                })
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State is plain counters; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();
        match inner.state {
            State::Closed => Admission::Allowed { trial: false },
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.reset_timeout {
                    tracing::info!(
                        elapsed_seconds = elapsed.as_secs(),
                        "Circuit breaker attempting recovery (half-open state)"
                    );
                    inner.state = State::HalfOpen;
                    inner.trial_in_flight = true;
                    Self::publish_state(State::HalfOpen);
                    Admission::Allowed { trial: true }
                } else {
                    Admission::Rejected(self.config.reset_timeout - elapsed)
                }
            }
            State::HalfOpen if inner.trial_in_flight => Admission::Rejected(Duration::ZERO),
            State::HalfOpen => {
                inner.trial_in_flight = true;
                Admission::Allowed { trial: true }
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if trial {
            inner.trial_in_flight = false;
        }
        if inner.state != State::Closed {
            inner.state = State::Closed;
            inner.opened_at = None;
            Self::publish_state(State::Closed);
            tracing::info!("Circuit breaker CLOSED - broker recovered");
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if trial {
            inner.trial_in_flight = false;
        }

        let reopen = inner.state == State::HalfOpen;
        let trip = inner.state == State::Closed
            && inner.consecutive_failures >= self.config.failure_threshold;

        if reopen || trip {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
            Self::publish_state(State::Open);
            tracing::error!(
                failures = inner.consecutive_failures,
                threshold = self.config.failure_threshold,
                reset_timeout_seconds = self.config.reset_timeout.as_secs(),
                "Circuit breaker OPENED"
            );
        } else if inner.state == State::Open {
            // Late failure from a call admitted before the circuit tripped
            inner.opened_at = Some(Instant::now());
        } else {
            tracing::warn!(
                failures = inner.consecutive_failures,
                threshold = self.config.failure_threshold,
                "Circuit breaker failure recorded"
            );
        }
    }

    fn publish_state(state: State) {
        metrics::CIRCUIT_BREAKER_STATE.set(state.gauge_value());
    }

    /// Current state and consecutive failure count
    ///
    /// An open circuit whose reset timeout has passed reports `HalfOpen`.
    pub fn state(&self) -> (State, u32) {
        let inner = self.lock();
        let state = match (inner.state, inner.opened_at) {
            (State::Open, Some(opened)) if opened.elapsed() >= self.config.reset_timeout => {
                State::HalfOpen
            }
            (state, _) => state,
        };
        (state, inner.consecutive_failures)
    }

    /// Close the circuit and clear failure history
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        Self::publish_state(State::Closed);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, timeout_ms: u64, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout: Duration::from_millis(timeout_ms),
            reset_timeout: Duration::from_millis(reset_ms),
        })
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb.call(async { Err::<(), _>("broker down") }).await;
    }

    #[tokio::test]
    async fn test_success_keeps_circuit_closed() {
        let cb = CircuitBreaker::new();

        let result = cb.call(async { Ok::<_, &str>((0, 42)) }).await;

        assert_eq!(result.unwrap(), (0, 42));
        assert_eq!(cb.state(), (State::Closed, 0));
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures_and_skips_work() {
        let cb = breaker(3, 1000, 30_000);
        for _ in 0..3 {
            fail(&cb).await;
        }
        assert_eq!(cb.state(), (State::Open, 3));

        let calls = AtomicU32::new(0);
        let result = cb
            .call(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 1000, 30_000);
        fail(&cb).await;
        fail(&cb).await;
        cb.call(async { Ok::<_, &str>(()) }).await.unwrap();
        fail(&cb).await;

        assert_eq!(cb.state(), (State::Closed, 1));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let cb = breaker(5, 50, 30_000);

        let result = cb
            .call(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(cb.state(), (State::Closed, 1));
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let cb = breaker(2, 1000, 50);
        fail(&cb).await;
        fail(&cb).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cb.state().0, State::HalfOpen);

        cb.call(async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), (State::Closed, 0));
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let cb = breaker(2, 1000, 50);
        fail(&cb).await;
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        fail(&cb).await;

        assert_eq!(cb.state().0, State::Open);
        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn test_only_one_half_open_trial_at_a_time() {
        let cb = Arc::new(breaker(1, 1000, 20));
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let concurrent = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(concurrent, Err(CircuitBreakerError::Open { .. })));

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(cb.state().0, State::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let cb = breaker(1, 1000, 30_000);
        fail(&cb).await;
        assert_eq!(cb.state().0, State::Open);

        cb.reset();

        assert_eq!(cb.state(), (State::Closed, 0));
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
    }

    #[test]
    fn test_config_from_kafka_settings() {
        let mut kafka = KafkaConfig::default();
        kafka.circuit_failure_threshold = 0;
        kafka.publish_timeout_ms = 1500;

        let config = CircuitBreakerConfig::from(&kafka);

        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.reset_timeout, Duration::from_secs(30));
    }
}
