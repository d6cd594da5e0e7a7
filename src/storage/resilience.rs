//! Circuit breaking for storage engines.
//!
//! A dead engine would otherwise cost every namespace task its full timeout.
//! [`ResilientEngine`] counts consecutive failures and, past a threshold,
//! rejects calls immediately until a reset window has elapsed.
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  success                               | reset timeout elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! A call that panics counts as a failure. A half-open trial that never
//! reports back is abandoned after another reset window, and a new trial
//! is admitted.

use super::traits::{CollectionInfo, Point, PointFilter, ScoredPoint, StoredPoint, VectorEngine};
use crate::models::RecordId;
use crate::{Error, Result};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Circuit breaker configuration for engines.
#[derive(Debug, Clone)]
pub struct EngineResilienceConfig {
    /// Consecutive failures before opening the circuit.
    pub breaker_failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub breaker_reset_timeout_ms: u64,
    /// Maximum trial calls while half-open.
    pub breaker_half_open_max_calls: u32,
}

impl Default for EngineResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 30_000,
            breaker_half_open_max_calls: 1,
        }
    }
}

impl EngineResilienceConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `NSRECALL_ENGINE_BREAKER_FAILURE_THRESHOLD` | 5 |
    /// | `NSRECALL_ENGINE_BREAKER_RESET_MS` | 30000 |
    /// | `NSRECALL_ENGINE_BREAKER_HALF_OPEN_MAX_CALLS` | 1 |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("NSRECALL_ENGINE_BREAKER_FAILURE_THRESHOLD")
            && let Ok(parsed) = v.parse::<u32>()
        {
            self.breaker_failure_threshold = parsed.max(1);
        }
        if let Ok(v) = std::env::var("NSRECALL_ENGINE_BREAKER_RESET_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.breaker_reset_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("NSRECALL_ENGINE_BREAKER_HALF_OPEN_MAX_CALLS")
            && let Ok(parsed) = v.parse::<u32>()
        {
            self.breaker_half_open_max_calls = parsed.max(1);
        }
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout in milliseconds.
    #[must_use]
    pub const fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.breaker_reset_timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { attempts: u32, since: Instant },
}

/// Circuit breaker state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
    engine: &'static str,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: &EngineResilienceConfig, engine: &'static str) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.breaker_failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.breaker_reset_timeout_ms),
            half_open_max_calls: config.breaker_half_open_max_calls.max(1),
            engine,
        }
    }

    /// Returns `true` if a call may proceed.
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    tracing::info!(engine = self.engine, "Circuit breaker half-open");
                    self.state = BreakerState::HalfOpen {
                        attempts: 1,
                        since: Instant::now(),
                    };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen {
                ref mut attempts,
                ref mut since,
            } => {
                if *attempts < self.half_open_max_calls {
                    *attempts += 1;
                    true
                } else if since.elapsed() >= self.reset_timeout {
                    tracing::warn!(engine = self.engine, "Half-open trial abandoned, retrying");
                    *attempts = 1;
                    *since = Instant::now();
                    true
                } else {
                    false
                }
            },
        }
    }

    /// Records a success and closes the circuit.
    pub fn on_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { failures: 0 }) {
            tracing::info!(engine = self.engine, "Circuit breaker closed");
        }
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failure. Returns `true` if the circuit just opened.
    pub fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures < self.failure_threshold {
                    return false;
                }
                tracing::warn!(
                    engine = self.engine,
                    failures = *failures,
                    "Circuit breaker opened after consecutive failures"
                );
            },
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(engine = self.engine, "Circuit breaker re-opened");
            },
            BreakerState::Open { .. } => return false,
        }
        self.state = BreakerState::Open {
            opened_at: Instant::now(),
        };
        true
    }

    /// Returns the state for metrics: 0 closed, 1 open, 2 half-open.
    #[must_use]
    pub const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen { .. } => 2,
        }
    }
}

/// Engine wrapper with circuit breaker protection.
pub struct ResilientEngine<E: VectorEngine> {
    inner: E,
    breaker: Mutex<CircuitBreaker>,
}

impl<E: VectorEngine> ResilientEngine<E> {
    /// Wraps an engine.
    #[must_use]
    pub fn new(inner: E, config: &EngineResilienceConfig) -> Self {
        let breaker = CircuitBreaker::new(config, inner.name());
        Self {
            inner,
            breaker: Mutex::new(breaker),
        }
    }

    /// Returns the breaker state (0 closed, 1 open, 2 half-open).
    pub fn breaker_state(&self) -> u8 {
        self.breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state_value()
    }

    fn execute<T>(&self, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let engine = self.inner.name();
        {
            let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
            if !breaker.allow() {
                let state = breaker.state_value();
                drop(breaker);
                record_metrics(engine, operation, "circuit_open", state);
                return Err(Error::OperationFailed {
                    operation: format!("engine_{operation}"),
                    cause: format!("circuit breaker open for engine '{engine}'"),
                });
            }
        }

        let result = match catch_unwind(AssertUnwindSafe(call)) {
            Ok(result) => result,
            Err(panic) => {
                self.record_failure(engine, operation, "panic");
                resume_unwind(panic);
            },
        };

        if let Err(e) = &result
            && !matches!(e, Error::InvalidInput(_))
        {
            self.record_failure(engine, operation, "error");
            return result;
        }

        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        // Caller mistakes say nothing about engine health.
        breaker.on_success();
        let state = breaker.state_value();
        drop(breaker);
        let status = if result.is_ok() { "success" } else { "invalid" };
        record_metrics(engine, operation, status, state);

        result
    }

    fn record_failure(&self, engine: &'static str, operation: &'static str, status: &'static str) {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        if breaker.on_failure() {
            metrics::counter!(
                "engine_circuit_breaker_trips_total",
                "engine" => engine,
                "operation" => operation
            )
            .increment(1);
        }
        let state = breaker.state_value();
        drop(breaker);
        record_metrics(engine, operation, status, state);
    }
}

fn record_metrics(engine: &'static str, operation: &'static str, status: &'static str, state: u8) {
    metrics::counter!(
        "engine_requests_total",
        "engine" => engine,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::gauge!("engine_circuit_breaker_state", "engine" => engine).set(f64::from(state));
}

impl<E: VectorEngine> VectorEngine for ResilientEngine<E> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        self.execute("describe_collection", || {
            self.inner.describe_collection(collection)
        })
    }

    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        self.execute("create_collection", || {
            self.inner.create_collection(collection, dimensions)
        })
    }

    fn create_keyword_index(&self, collection: &str, field: &str) -> Result<()> {
        self.execute("create_index", || {
            self.inner.create_keyword_index(collection, field)
        })
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        self.execute("upsert", || self.inner.upsert(collection, point))
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>> {
        self.execute("get", || self.inner.get(collection, id))
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        self.execute("delete", || self.inner.delete(collection, id))
    }

    fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        self.execute("scroll", || self.inner.scroll(collection, filter, limit))
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.execute("search", || {
            self.inner.search(collection, vector, filter, limit)
        })
    }

    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize> {
        self.execute("count", || self.inner.count(collection, filter))
    }

    fn health_check(&self) -> bool {
        self.inner.health_check()
    }
}
