//! Guarded provider execution: breaker check, bounded timeout, fallback.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ProviderError;
use crate::metrics::CallResult;
use crate::resilience::breaker::CircuitBreaker;

/// Result of a guarded call. Always carries a usable value.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    pub value: T,
    /// Why the fallback was used, None when the provider answered
    pub fallback_reason: Option<ProviderError>,
}

impl<T> Guarded<T> {
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Run one provider call behind its breaker.
///
/// 1. Deadline already passed: return `fallback` without asking the breaker.
///    The provider is neither called nor charged.
/// 2. Breaker refuses: return `fallback` immediately, the provider is not called.
/// 3. Otherwise call with `min(timeout, deadline - now)`. Success settles the
///    permit as success; error or timeout settles it as failure and returns
///    `fallback`.
///
/// Never returns an error.
pub async fn execute_guarded<T, F, Fut>(
    breaker: &CircuitBreaker,
    timeout: Duration,
    deadline: Instant,
    fallback: T,
    call: F,
) -> Guarded<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if deadline.saturating_duration_since(Instant::now()).is_zero() {
        tracing::debug!(provider = %breaker.name(), "Deadline passed before the call, using fallback");
        return Guarded {
            value: fallback,
            fallback_reason: Some(ProviderError::Timeout(Duration::ZERO)),
        };
    }

    let Some(permit) = breaker.allow() else {
        tracing::debug!(provider = %breaker.name(), "Circuit open, using fallback");
        breaker.report_call(CallResult::Rejected);
        return Guarded {
            value: fallback,
            fallback_reason: Some(ProviderError::Rejected),
        };
    };

    let budget = timeout.min(deadline.saturating_duration_since(Instant::now()));
    let error = match tokio::time::timeout(budget, call()).await {
        Ok(Ok(value)) => {
            breaker.record_success(permit);
            breaker.report_call(CallResult::Success);
            return Guarded {
                value,
                fallback_reason: None,
            };
        }
        Ok(Err(error)) => error,
        Err(_) => ProviderError::Timeout(budget),
    };

    breaker.record_failure(permit);
    breaker.report_call(CallResult::Failure);
    tracing::debug!(provider = %breaker.name(), error = %error, "Provider call failed, using fallback");
    Guarded {
        value: fallback,
        fallback_reason: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsAggregator, NoopSink};
    use crate::resilience::breaker::{BreakerConfig, BreakerState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "scorer",
            BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
            },
            Arc::new(NoopSink),
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_success_returns_provider_value() {
        let b = breaker(3);
        let result = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 0.5, || async { Ok(0.9) }).await;
        assert_eq!(result.value, 0.9);
        assert!(!result.is_fallback());
    }

    #[tokio::test]
    async fn test_error_returns_fallback_and_counts() {
        let b = breaker(3);
        let result = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 0.5, || async {
            Err(ProviderError::Failed("boom".into()))
        })
        .await;
        assert_eq!(result.value, 0.5);
        assert_eq!(result.fallback_reason, Some(ProviderError::Failed("boom".into())));
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_timeout_returns_fallback() {
        let b = breaker(3);
        let result = execute_guarded(&b, Duration::from_millis(20), far_deadline(), 0.5, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0.9)
        })
        .await;
        assert_eq!(result.value, 0.5);
        assert!(matches!(result.fallback_reason, Some(ProviderError::Timeout(_))));
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_shared_deadline_caps_timeout() {
        let b = breaker(3);
        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_millis(30);
        let result = execute_guarded(&b, Duration::from_secs(5), deadline, 0.5, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0.9)
        })
        .await;
        assert!(result.is_fallback());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_call_without_charging_breaker() {
        let b = breaker(1);
        let calls = AtomicUsize::new(0);
        let deadline = Instant::now();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let result = execute_guarded(&b, Duration::from_secs(1), deadline, 0.5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.9)
        })
        .await;
        assert_eq!(result.value, 0.5);
        assert_eq!(result.fallback_reason, Some(ProviderError::Timeout(Duration::ZERO)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.consecutive_failures(), 0);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_provider() {
        let b = breaker(1);
        let calls = AtomicUsize::new(0);

        let first = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 0.5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<f64, _>(ProviderError::Failed("down".into()))
        })
        .await;
        assert!(first.is_fallback());
        assert_eq!(b.state(), BreakerState::Open);

        let second = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 0.5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.9)
        })
        .await;
        assert_eq!(second.value, 0.5);
        assert_eq!(second.fallback_reason, Some(ProviderError::Rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reports_calls_to_metrics() {
        let metrics = MetricsAggregator::new();
        let b = CircuitBreaker::new(
            "timing_advisor",
            BreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
            metrics.clone(),
        );
        let _ = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 1u8, || async { Ok(2u8) }).await;
        let _ = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 1u8, || async {
            Err(ProviderError::Malformed("bad".into()))
        })
        .await;
        let _ = execute_guarded(&b, Duration::from_secs(1), far_deadline(), 1u8, || async { Ok(2u8) }).await;

        let health = &metrics.snapshot().per_provider["timing_advisor"];
        assert_eq!(health.successes, 1);
        assert_eq!(health.failures, 1);
        assert_eq!(health.rejections, 1);
        assert_eq!(health.state, BreakerState::Open);
    }
}
