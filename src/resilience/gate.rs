//! The resilience gate: bulkhead, circuit breaker, deadline and fallback
//! composed around one outbound call.
//!
//! # Data Flow
//! ```text
//! protected_call(dependency, operation, fallback, timeout)
//!     → bulkhead.rs (admit or reject with BulkheadFull)
//!     → circuit_breaker.rs (short-circuit or run and record)
//!     → timeouts.rs (deadline around the operation)
//!     → fallback.rs (substitute on any CallError)
//! ```
//!
//! # Design Decisions
//! - Bulkhead rejection goes straight to the fallback without touching the
//!   breaker window
//! - The bulkhead permit is released before the fallback runs
//! - Only `FallbackError` ever escapes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error::{BoxError, CallError, FallbackError};
use crate::resilience::fallback::{run_fallback, substitute};
use crate::resilience::registry::ResilienceRegistry;
use crate::resilience::timeouts::with_deadline;

/// Entry point for protected calls. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ResilienceGate {
    registry: Arc<ResilienceRegistry>,
}

impl ResilienceGate {
    pub fn new(registry: Arc<ResilienceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    /// A call site using different breaker and bulkhead names.
    pub fn call_site(
        &self,
        breaker: impl Into<String>,
        bulkhead: impl Into<String>,
    ) -> CallSite {
        CallSite {
            registry: self.registry.clone(),
            breaker: breaker.into(),
            bulkhead: bulkhead.into(),
        }
    }

    /// Run `operation` protected by the breaker and bulkhead named `dependency`.
    pub async fn protected_call<T, E, Op, Fut, Fb, FbFut>(
        &self,
        dependency: &str,
        operation: Op,
        fallback: Fb,
        timeout: Duration,
    ) -> Result<T, FallbackError>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        Fb: FnOnce(CallError) -> FbFut,
        FbFut: Future<Output = Result<T, BoxError>>,
    {
        protect(&self.registry, dependency, dependency, operation, fallback, timeout).await
    }

    /// Like [`protected_call`](Self::protected_call), substituting `default`
    /// whenever the call does not succeed.
    pub async fn protected_call_or<T, E, Op, Fut>(
        &self,
        dependency: &str,
        operation: Op,
        default: T,
        timeout: Duration,
    ) -> T
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let (breaker, outcome) =
            attempt(&self.registry, dependency, dependency, operation, timeout).await;
        match outcome {
            Ok(value) => value,
            Err(trigger) => substitute(
                breaker.name(),
                &trigger,
                default,
                self.registry.observer().as_ref(),
            ),
        }
    }
}

/// A (breaker, bulkhead) pair bound to a registry.
#[derive(Debug, Clone)]
pub struct CallSite {
    registry: Arc<ResilienceRegistry>,
    breaker: String,
    bulkhead: String,
}

impl CallSite {
    pub fn breaker(&self) -> &str {
        &self.breaker
    }

    pub fn bulkhead(&self) -> &str {
        &self.bulkhead
    }

    pub async fn call<T, E, Op, Fut, Fb, FbFut>(
        &self,
        operation: Op,
        fallback: Fb,
        timeout: Duration,
    ) -> Result<T, FallbackError>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        Fb: FnOnce(CallError) -> FbFut,
        FbFut: Future<Output = Result<T, BoxError>>,
    {
        protect(
            &self.registry,
            &self.breaker,
            &self.bulkhead,
            operation,
            fallback,
            timeout,
        )
        .await
    }
}

async fn protect<T, E, Op, Fut, Fb, FbFut>(
    registry: &ResilienceRegistry,
    breaker_name: &str,
    bulkhead_name: &str,
    operation: Op,
    fallback: Fb,
    timeout: Duration,
) -> Result<T, FallbackError>
where
    Op: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
    Fb: FnOnce(CallError) -> FbFut,
    FbFut: Future<Output = Result<T, BoxError>>,
{
    let (breaker, outcome) =
        attempt(registry, breaker_name, bulkhead_name, operation, timeout).await;
    match outcome {
        Ok(value) => Ok(value),
        Err(trigger) => {
            run_fallback(breaker.name(), trigger, fallback, registry.observer().as_ref()).await
        }
    }
}

/// Admission plus the breaker-guarded call. The bulkhead permit is dropped
/// before this returns.
async fn attempt<T, E, Op, Fut>(
    registry: &ResilienceRegistry,
    breaker_name: &str,
    bulkhead_name: &str,
    operation: Op,
    timeout: Duration,
) -> (Arc<CircuitBreaker>, Result<T, CallError>)
where
    Op: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let bulkhead = registry.bulkhead(bulkhead_name);
    let breaker = registry.circuit_breaker(breaker_name);

    let outcome = match bulkhead.admit().await {
        Ok(_permit) => {
            breaker
                .call(|| with_deadline(timeout, operation()))
                .await
        }
        Err(rejected) => Err(rejected),
    };
    (breaker, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::config::schema::{BulkheadOverrides, CircuitBreakerOverrides, ResilienceConfig};
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::events::{RecordingObserver, ResilienceEvent};
    use crate::resilience::fallback::{fixed, propagate};

    const FALLBACK: &str = "fallback-response";

    fn gate_with(config: ResilienceConfig) -> (ResilienceGate, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let registry = ResilienceRegistry::new(config, observer.clone());
        (ResilienceGate::new(Arc::new(registry)), observer)
    }

    fn small_window() -> ResilienceConfig {
        let mut config = ResilienceConfig::default();
        config.circuit_breakers.insert(
            "flaky".into(),
            CircuitBreakerOverrides {
                sliding_window_size: Some(5),
                minimum_samples: Some(5),
                failure_rate_threshold: Some(50.0),
                wait_duration_in_open_ms: Some(10_000),
                ..Default::default()
            },
        );
        config
    }

    async fn ok_call(gate: &ResilienceGate, dep: &str) -> &'static str {
        gate.protected_call(
            dep,
            || async { Ok::<_, BoxError>("ok") },
            fixed(FALLBACK),
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    async fn failing_call(gate: &ResilienceGate, dep: &str) -> &'static str {
        gate.protected_call(
            dep,
            || async { Err::<&'static str, BoxError>("boom".into()) },
            fixed(FALLBACK),
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_never_invokes_fallback() {
        let (gate, observer) = gate_with(ResilienceConfig::default());
        for _ in 0..20 {
            let value = gate
                .protected_call(
                    "working-api",
                    || async { Ok::<_, BoxError>("working-API") },
                    |_: CallError| -> std::future::Ready<Result<&'static str, BoxError>> {
                        panic!("fallback must not run")
                    },
                    Duration::from_secs(1),
                )
                .await
                .unwrap();
            assert_eq!(value, "working-API");
        }
        assert!(!observer
            .events()
            .iter()
            .any(|e| matches!(e, ResilienceEvent::FallbackInvoked { .. })));
    }

    #[tokio::test]
    async fn test_three_successes_three_failures_opens_circuit() {
        let (gate, observer) = gate_with(small_window());

        for _ in 0..3 {
            assert_eq!(ok_call(&gate, "flaky").await, "ok");
        }
        for _ in 0..2 {
            assert_eq!(failing_call(&gate, "flaky").await, FALLBACK);
        }
        // 3S/2F over five samples: 40%, still closed.
        let breaker = gate.registry().circuit_breaker("flaky");
        assert_eq!(breaker.state(), CircuitState::Closed);

        assert_eq!(failing_call(&gate, "flaky").await, FALLBACK);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            observer.transitions(),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );

        let invoked = AtomicUsize::new(0);
        let err = gate
            .protected_call(
                "flaky",
                || async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>("ok")
                },
                propagate(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.trigger, CallError::CircuitOpen { .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let mut config = ResilienceConfig::default();
        config.circuit_breakers.insert(
            "slow".into(),
            CircuitBreakerOverrides {
                sliding_window_size: Some(2),
                minimum_samples: Some(2),
                ..Default::default()
            },
        );
        let (gate, _observer) = gate_with(config);

        for _ in 0..2 {
            let err = gate
                .protected_call(
                    "slow",
                    || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, BoxError>(())
                    },
                    propagate(),
                    Duration::from_millis(100),
                )
                .await
                .unwrap_err();
            assert!(matches!(err.trigger, CallError::Timeout(_)));
        }
        assert_eq!(
            gate.registry().circuit_breaker("slow").state(),
            CircuitState::Open
        );
        assert_eq!(gate.registry().bulkhead("slow").in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_bulkhead_rejects_concurrent_call() {
        let mut config = ResilienceConfig::default();
        config.bulkheads.insert(
            "single".into(),
            BulkheadOverrides {
                max_concurrent_calls: Some(1),
                ..Default::default()
            },
        );
        let (gate, _observer) = gate_with(config);

        let slow = || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, BoxError>("done")
        };

        let first = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.protected_call("single", slow, fixed(FALLBACK), Duration::ZERO)
                    .await
            })
        };
        // Let the first call take the only slot.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = tokio::time::Instant::now();
        let second = gate
            .protected_call("single", slow, fixed(FALLBACK), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(second, FALLBACK);
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(first.await.unwrap().unwrap(), "done");
        // Bulkhead rejections never feed the breaker.
        let snapshot = gate.registry().circuit_breaker("single").snapshot();
        assert_eq!(snapshot.samples, 1);
    }

    #[tokio::test]
    async fn test_cancellation_releases_permit() {
        let mut config = ResilienceConfig::default();
        config.bulkheads.insert(
            "cancel".into(),
            BulkheadOverrides {
                max_concurrent_calls: Some(1),
                ..Default::default()
            },
        );
        let (gate, _observer) = gate_with(config);

        let task = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.protected_call(
                    "cancel",
                    || std::future::pending::<Result<(), BoxError>>(),
                    fixed(()),
                    Duration::ZERO,
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.registry().bulkhead("cancel").in_flight(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(gate.registry().bulkhead("cancel").in_flight(), 0);
        assert_eq!(ok_call(&gate, "cancel").await, "ok");
    }

    #[tokio::test]
    async fn test_call_site_uses_distinct_names() {
        let (gate, _observer) = gate_with(ResilienceConfig::default());
        let site = gate.call_site("default", "working-api");

        let value = site
            .call(
                || async { Ok::<_, BoxError>("working-API") },
                fixed(FALLBACK),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(value, "working-API");

        let breakers: Vec<_> = gate
            .registry()
            .breaker_snapshots()
            .into_iter()
            .map(|s| s.name)
            .collect();
        let bulkheads: Vec<_> = gate
            .registry()
            .bulkhead_snapshots()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(breakers, vec!["default"]);
        assert_eq!(bulkheads, vec!["working-api"]);
    }

    #[tokio::test]
    async fn test_protected_call_or_substitutes_default() {
        let (gate, _observer) = gate_with(ResilienceConfig::default());
        let value = gate
            .protected_call_or(
                "sample-api",
                || async { Err::<String, _>(std::io::Error::other("connection refused")) },
                FALLBACK.to_string(),
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(value, FALLBACK);
    }

    #[tokio::test]
    async fn test_fallback_error_names_dependency() {
        let (gate, _observer) = gate_with(ResilienceConfig::default());
        let err = gate
            .protected_call(
                "sample-api",
                || async { Err::<(), BoxError>("downstream 500".into()) },
                |_| async { Err::<(), BoxError>("no cached value".into()) },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.dependency, "sample-api");
        assert!(matches!(err.trigger, CallError::Downstream(_)));
        assert_eq!(err.source.to_string(), "no cached value");
    }
}
