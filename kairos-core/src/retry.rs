//! Retry/backoff helper for recoverable errors (spec §7 "Transport and
//! rate-limit errors are recoverable; callers may retry with backoff").
//!
//! This is a reusable utility offered to callers that dispatch tools or
//! guardrails over a transport; it is never invoked automatically around
//! `LLMProvider::chat` — spec §4.1 states plainly that retries there are not
//! safe. Grounded in the teacher's `graph::retry::RetryPolicy`, generalized
//! with jittered delays (the teacher's policy is deterministic) since spec
//! §7 calls for backoff that avoids synchronized retry storms across
//! concurrent Agents sharing one Runtime.

use std::time::Duration;

use crate::error::{AgentError, ErrorKind};

/// How to space retry attempts. Mirrors the teacher's `RetryPolicy` shape
/// (`None` / `Fixed` / `Exponential`) plus a jitter fraction applied to the
/// exponential variant.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    None,
    Fixed {
        max_attempts: usize,
        interval: Duration,
    },
    Exponential {
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        /// Fraction of the computed delay (0.0-1.0) applied as random jitter,
        /// so that N concurrent callers backing off from the same failure
        /// don't all retry in lockstep.
        jitter: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::None
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy::None
    }

    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        RetryPolicy::Fixed { max_attempts, interval }
    }

    pub fn exponential(max_attempts: usize, initial_interval: Duration, max_interval: Duration, multiplier: f64) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial_interval,
            max_interval,
            multiplier,
            jitter: 0.2,
        }
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        match self {
            RetryPolicy::None => false,
            RetryPolicy::Fixed { max_attempts, .. } => attempt < *max_attempts,
            RetryPolicy::Exponential { max_attempts, .. } => attempt < *max_attempts,
        }
    }

    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_attempts, .. } => *max_attempts,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Computed delay for `attempt` (0-indexed). The exponential variant's
    /// jitter is deterministic given `attempt` (no RNG dependency), derived
    /// from a cheap hash of the attempt number so tests stay reproducible.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { interval, .. } => *interval,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                jitter,
                ..
            } => {
                let base_secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                let capped = base_secs.min(max_interval.as_secs_f64());
                let jitter_fraction = pseudo_jitter(attempt) * jitter;
                Duration::from_secs_f64((capped * (1.0 - jitter / 2.0 + jitter_fraction)).max(0.0))
            }
        }
    }
}

/// Deterministic pseudo-random value in `[0, 1)`, stable per `attempt` — no
/// `rand` dependency for a single jitter knob, and it keeps delay() pure and
/// reproducible in tests.
fn pseudo_jitter(attempt: usize) -> f64 {
    let x = (attempt as u64).wrapping_mul(2654435761).wrapping_add(1);
    let x = x ^ (x >> 15);
    (x % 1000) as f64 / 1000.0
}

/// Runs `op` under `policy`, retrying while `op`'s error reports
/// `recoverable` and attempts remain. Sleeps between attempts using the
/// policy's delay. Never retries a non-`recoverable` error.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if err.recoverable && policy.should_retry(attempt) => {
                tracing::warn!(attempt, kind = %err.kind, "recoverable error, retrying with backoff");
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fixed_policy_retries_up_to_max_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(0), Duration::from_millis(10));
    }

    #[test]
    fn exponential_policy_caps_at_max_interval() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(4), 2.0);
        // Uncapped base at attempt 3 would be 8s; jitter only perturbs within a small band around the cap.
        let delay = policy.delay(3);
        assert!(delay <= Duration::from_secs(5), "delay {delay:?} should stay near the cap");
    }

    #[tokio::test]
    async fn retry_stops_after_first_non_recoverable_error() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let result: Result<(), AgentError> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::new(ErrorKind::InvalidInput, "bad")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_recoverable_failures() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let result = retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AgentError::new(ErrorKind::TransportError, "flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts_exhausted() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let result: Result<(), AgentError> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::new(ErrorKind::TransportError, "down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
