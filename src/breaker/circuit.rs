use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{BreakerConfig, BreakerError, BreakerSnapshot, BreakerState};

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    opened_until: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state breaker around calls to one dependency.
///
/// The lock is only held while deciding admission and while recording an outcome, never across
/// the wrapped call.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Admission ticket for one call. A trial ticket dropped before its outcome is recorded counts
/// as a failed trial, so a cancelled trial cannot wedge the breaker half-open.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Admission<'_> {
    fn success(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            tracing::debug!("Trial call to {} cancelled", self.breaker.name);
            self.breaker.on_failure(true);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_until: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Runs `f` unless the breaker is open. Only `Err` results of `f` count as failures.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;

        match f().await {
            Ok(value) => {
                admission.success();
                Ok(value)
            }
            Err(e) => {
                admission.failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn admit<E>(&self) -> Result<Admission<'_>, BreakerError<E>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let until = inner.opened_until.unwrap_or(now);
                if now < until {
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in: until - now,
                    });
                }
                tracing::info!("Circuit breaker HALF_OPEN for {}, allowing trial call", self.name);
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                true
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in: Duration::ZERO,
                    });
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Ok(Admission {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker CLOSED for {}", self.name);
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_until = None;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);

        let trip = match inner.state {
            BreakerState::HalfOpen => trial,
            BreakerState::Closed => inner.failure_count >= self.config.failure_threshold.max(1),
            BreakerState::Open => false,
        };

        if trip {
            inner.state = BreakerState::Open;
            inner.opened_until = Some(Instant::now() + self.config.recovery_timeout);
            inner.trial_in_flight = false;
            tracing::warn!(
                "Circuit breaker OPEN for {} ({} failures, retry in {:?})",
                self.name,
                inner.failure_count,
                self.config.recovery_timeout
            );
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let retry_in_ms = match (inner.state, inner.opened_until) {
            (BreakerState::Open, Some(until)) => Some(
                until
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
            ),
            _ => None,
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            retry_in_ms,
        }
    }
}

/// One breaker per dependency name, created on first use.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            breakers: DashMap::new(),
            config,
        })
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return breaker.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|breaker| breaker.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
