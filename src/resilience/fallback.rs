//! Fallback dispatch.
//!
//! A fallback receives the `CallError` that diverted the call. Its own
//! failure is wrapped in `FallbackError` and returned as-is.

use std::future::{ready, Future, Ready};

use crate::resilience::error::{BoxError, CallError, FallbackError};
use crate::resilience::events::{ResilienceEvent, ResilienceObserver};

pub(crate) async fn run_fallback<T, Fb, FbFut>(
    dependency: &str,
    trigger: CallError,
    fallback: Fb,
    observer: &dyn ResilienceObserver,
) -> Result<T, FallbackError>
where
    Fb: FnOnce(CallError) -> FbFut,
    FbFut: Future<Output = Result<T, BoxError>>,
{
    let kind = trigger.kind();
    tracing::debug!(dependency = %dependency, trigger = %trigger, "Invoking fallback");
    observer.on_event(&ResilienceEvent::FallbackInvoked {
        dependency: dependency.to_string(),
        trigger: kind,
    });

    // Downstream errors are not `Clone`; keep a textual copy for FallbackError.
    let summary = describe(&trigger);
    match fallback(trigger).await {
        Ok(value) => Ok(value),
        Err(source) => {
            tracing::error!(dependency = %dependency, trigger = kind, error = %source, "Fallback failed");
            observer.on_event(&ResilienceEvent::FallbackFailed {
                dependency: dependency.to_string(),
                trigger: kind,
            });
            Err(FallbackError {
                dependency: dependency.to_string(),
                trigger: summary,
                source,
            })
        }
    }
}

/// Substitute `value` for a failed call without running a fallback closure.
pub(crate) fn substitute<T>(
    dependency: &str,
    trigger: &CallError,
    value: T,
    observer: &dyn ResilienceObserver,
) -> T {
    tracing::debug!(dependency = %dependency, trigger = %trigger, "Substituting default value");
    observer.on_event(&ResilienceEvent::FallbackInvoked {
        dependency: dependency.to_string(),
        trigger: trigger.kind(),
    });
    value
}

fn describe(trigger: &CallError) -> CallError {
    match trigger {
        CallError::Downstream(e) => CallError::Downstream(e.to_string().into()),
        CallError::Timeout(d) => CallError::Timeout(*d),
        CallError::CircuitOpen { name } => CallError::CircuitOpen { name: name.clone() },
        CallError::BulkheadFull { name } => CallError::BulkheadFull { name: name.clone() },
    }
}

/// Fallback that always yields `value`, whatever the trigger.
pub fn fixed<T>(value: T) -> impl FnOnce(CallError) -> Ready<Result<T, BoxError>> {
    move |_: CallError| ready(Ok(value))
}

/// Fallback that propagates the trigger as the fallback's own error.
pub fn propagate<T>() -> impl FnOnce(CallError) -> Ready<Result<T, BoxError>> {
    |err: CallError| ready(Err(Box::new(err) as BoxError))
}
