//! Circuit breaker for outbound dependency protection.
//!
//! # States
//! - Closed: calls pass through, outcomes counted in a rolling window
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: sleep window elapsed, one trial call allowed
//!
//! # State Transitions
//! ```text
//! Closed → Open: error% >= threshold over at least volume_threshold calls
//! Open → Half-Open: after sleep window
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! A call that outlives the per-call timeout is a failure. A call whose
//! future is dropped before finishing releases its slot without recording
//! an outcome.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Why a guarded call did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreakerError<E> {
    #[error("circuit open")]
    Open,

    #[error("too many concurrent calls")]
    ConcurrencyLimit,

    #[error("call timed out")]
    Timeout,

    #[error(transparent)]
    Inner(E),
}

/// Tuning for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub volume_threshold: u64,
    pub sleep_window: Duration,
    pub error_percent_threshold: u8,
    /// Number of one-second buckets in the rolling window.
    pub window_buckets: usize,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_concurrent: config.max_concurrent,
            volume_threshold: config.volume_threshold,
            sleep_window: Duration::from_millis(config.sleep_window_ms),
            error_percent_threshold: config.error_percent_threshold,
            window_buckets: config.rolling_window_secs.max(1) as usize,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    second: u64,
    successes: u64,
    failures: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    buckets: Vec<Bucket>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    in_flight: usize,
}

/// One breaker per named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    settings: BreakerSettings,
    epoch: Instant,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, settings: BreakerSettings) -> Self {
        let buckets = vec![Bucket::default(); settings.window_buckets.max(1)];
        Self {
            name,
            settings,
            epoch: Instant::now(),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                buckets,
                opened_at: None,
                trial_in_flight: false,
                in_flight: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state, advancing Open to Half-Open if the sleep window has passed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner, Instant::now());
        inner.state
    }

    /// Run `f` through the breaker. Every error counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(f, |_| true).await
    }

    /// Run `f` through the breaker. Errors for which `is_failure` returns
    /// false are passed through but counted as successful calls.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        f: F,
        is_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.acquire()?;

        match tokio::time::timeout(self.settings.timeout, f()).await {
            Ok(Ok(value)) => {
                permit.finish(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.finish(!is_failure(&err));
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                permit.finish(false);
                Err(BreakerError::Timeout)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        let now = Instant::now();
        self.maybe_half_open(&mut inner, now);

        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => return Err(BreakerError::Open),
            BreakerState::HalfOpen if inner.trial_in_flight => return Err(BreakerError::Open),
            BreakerState::HalfOpen => true,
        };

        if inner.in_flight >= self.settings.max_concurrent {
            return Err(BreakerError::ConcurrencyLimit);
        }

        inner.in_flight += 1;
        if trial {
            inner.trial_in_flight = true;
            tracing::debug!(dependency = self.name, "Circuit breaker trial call");
        }

        Ok(Permit {
            breaker: self,
            trial,
            finished: false,
        })
    }

    fn maybe_half_open(&self, inner: &mut Inner, now: Instant) {
        if inner.state != BreakerState::Open {
            return;
        }
        let ready = inner
            .opened_at
            .map(|at| now.duration_since(at) >= self.settings.sleep_window)
            .unwrap_or(true);
        if ready {
            self.transition(inner, BreakerState::HalfOpen);
        }
    }

    fn record(&self, trial: bool, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        if trial {
            inner.trial_in_flight = false;
            if success {
                for bucket in inner.buckets.iter_mut() {
                    *bucket = Bucket::default();
                }
                inner.opened_at = None;
                self.transition(&mut inner, BreakerState::Closed);
            } else {
                inner.opened_at = Some(now);
                self.transition(&mut inner, BreakerState::Open);
            }
            return;
        }

        let second = now.duration_since(self.epoch).as_secs();
        let len = inner.buckets.len();
        let bucket = &mut inner.buckets[(second as usize) % len];
        if bucket.second != second {
            *bucket = Bucket {
                second,
                ..Bucket::default()
            };
        }
        if success {
            bucket.successes += 1;
        } else {
            bucket.failures += 1;
        }

        if inner.state == BreakerState::Closed && !success && self.should_trip(&inner, second) {
            inner.opened_at = Some(now);
            self.transition(&mut inner, BreakerState::Open);
        }
    }

    fn should_trip(&self, inner: &Inner, current_second: u64) -> bool {
        let window = inner.buckets.len() as u64;
        let (total, failures) = inner
            .buckets
            .iter()
            .filter(|b| b.second + window > current_second)
            .fold((0u64, 0u64), |(total, failures), b| {
                (total + b.successes + b.failures, failures + b.failures)
            });

        total >= self.settings.volume_threshold
            && total > 0
            && failures * 100 >= u64::from(self.settings.error_percent_threshold) * total
    }

    fn transition(&self, inner: &mut Inner, next: BreakerState) {
        if inner.state == next {
            return;
        }
        tracing::warn!(
            dependency = self.name,
            from = inner.state.as_str(),
            to = next.as_str(),
            "Circuit breaker state change"
        );
        metrics::record_breaker_transition(self.name, next.as_str());
        inner.state = next;
    }

    fn release(&self, trial: bool) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if trial {
            inner.trial_in_flight = false;
        }
    }
}

/// Slot held by an admitted call. Dropping it unfinished frees the slot
/// and, for a trial call, lets another trial through.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    finished: bool,
}

impl Permit<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        self.breaker.release(false);
        self.breaker.record(self.trial, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.release(self.trial);
        }
    }
}
