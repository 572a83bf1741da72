//! Timeout-bounded retry loop.
//!
//! Turns "eventually true" external conditions (a port starts listening, a
//! database session disappears, a daemon accepts a start request) into a
//! single pass/fail outcome. The loop knows nothing about Docker or SQL: the
//! operation reports each failure as either [`Attempt::Transient`] (try again
//! after the interval) or [`Attempt::Fatal`] (give up now).
//!
//! The budget is wall-clock time measured from the first invocation, not an
//! attempt count. Once it is spent the last transient error is surfaced inside
//! [`RetryError::Exhausted`].

mod clock;

pub use clock::{Clock, ManualClock, TokioClock};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for container start and readiness checks.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for confirming killed sessions are gone.
pub const SESSION_DEATH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default backoff between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Invalid retry policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("retry timeout must be greater than zero")]
    ZeroTimeout,

    #[error("retry interval must be greater than zero")]
    ZeroInterval,

    #[error("retry interval {interval:?} must be shorter than timeout {timeout:?}")]
    IntervalNotShorterThanTimeout {
        timeout: Duration,
        interval: Duration,
    },
}

/// How long to keep trying and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Duration,
    interval: Duration,
}

impl RetryPolicy {
    /// Build a policy, rejecting `interval >= timeout`.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if interval >= timeout {
            return Err(PolicyError::IntervalNotShorterThanTimeout { timeout, interval });
        }
        Ok(Self { timeout, interval })
    }

    /// 30s budget, 1s interval.
    pub const fn readiness() -> Self {
        Self {
            timeout: READINESS_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// 10s budget, 1s interval.
    pub const fn session_death() -> Self {
        Self {
            timeout: SESSION_DEATH_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::readiness()
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Not ready yet, worth trying again.
    Transient(E),
    /// Retrying cannot help.
    Fatal(E),
}

impl<E> Attempt<E> {
    pub fn into_inner(self) -> E {
        match self {
            Attempt::Transient(e) | Attempt::Fatal(e) => e,
        }
    }
}

/// Failure of a whole retry loop.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The budget ran out; `last` is the final transient error observed.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: E,
    },
    /// The operation reported a fatal error.
    Aborted(E),
}

impl<E> RetryError<E> {
    /// The underlying error, dropping retry bookkeeping.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            } => write!(
                f,
                "gave up after {} attempts in {:?}: {}",
                attempts, elapsed, last
            ),
            RetryError::Aborted(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Aborted(e) => Some(e),
        }
    }
}

/// Retry executor bound to one policy and one clock.
#[derive(Clone)]
pub struct BoundedRetry {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for BoundedRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedRetry")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BoundedRetry {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// Retry executor on the real clock.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new(policy, Arc::new(TokioClock))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Same clock, different budget.
    pub fn with_other_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// The first invocation happens immediately. After every transient
    /// failure the elapsed time since that first invocation is compared with
    /// the timeout: if it has been reached the loop stops, otherwise it sleeps
    /// for the interval and tries again. An always-failing operation therefore
    /// returns no later than `timeout + interval` plus the duration of one
    /// attempt.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
        E: fmt::Display,
    {
        let started = self.clock.now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("Operation succeeded after {} attempts", attempts);
                    }
                    return Ok(value);
                }
                Err(Attempt::Fatal(e)) => return Err(RetryError::Aborted(e)),
                Err(Attempt::Transient(e)) => e,
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.policy.timeout {
                warn!(
                    "Giving up after {} attempts in {:?}: {}",
                    attempts, elapsed, error
                );
                return Err(RetryError::Exhausted {
                    attempts,
                    elapsed,
                    last: error,
                });
            }

            debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempts, error, self.policy.interval
            );
            self.clock.sleep(self.policy.interval).await;
        }
    }
}
