//! Bulkhead admission control.
//!
//! # Responsibilities
//! - Bound the number of in-flight calls per dependency
//! - Optionally queue a bounded number of callers for a bounded time
//! - Hand out RAII permits so release happens exactly once
//!
//! # Design Decisions
//! - Backed by a fair `tokio::sync::Semaphore`; queued callers are served in
//!   arrival order
//! - The queue length is tracked separately with an atomic counter so a full
//!   queue rejects without waiting
//! - Rejection never touches circuit-breaker statistics
//! - Reconfiguration resizes the live semaphore; permits that cannot be
//!   removed at once are forgotten as their holders release them

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::resilience::error::CallError;
use crate::resilience::events::{NoopObserver, ResilienceEvent, ResilienceObserver};

/// Bulkhead configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum concurrent in-flight calls.
    pub max_concurrent_calls: u32,
    /// Callers allowed to wait for a slot when all are taken (0 = none).
    pub max_wait_queue_size: u32,
    /// Longest time a queued caller waits before being rejected.
    pub max_wait_duration: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 25,
            max_wait_queue_size: 0,
            max_wait_duration: Duration::from_millis(500),
        }
    }
}

impl BulkheadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_calls(mut self, max: u32) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    pub fn with_max_wait_queue_size(mut self, size: u32) -> Self {
        self.max_wait_queue_size = size;
        self
    }

    pub fn with_max_wait_duration(mut self, wait: Duration) -> Self {
        self.max_wait_duration = wait;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkheadSnapshot {
    pub name: String,
    pub in_flight: usize,
    pub waiting: u32,
    pub max_concurrent_calls: u32,
    pub max_wait_queue_size: u32,
    pub max_wait_duration_ms: u64,
    pub total_admitted: u64,
    pub total_rejected: u64,
}

/// Per-dependency bulkhead.
pub struct Bulkhead {
    name: String,
    config: ArcSwap<BulkheadConfig>,
    semaphore: Arc<Semaphore>,
    /// Admitted, unreleased calls.
    in_flight: AtomicUsize,
    /// Permits still to be removed after a shrink.
    shrink_debt: AtomicU32,
    resize: Mutex<()>,
    waiting: AtomicU32,
    total_admitted: AtomicU64,
    total_rejected: AtomicU64,
    observer: Arc<dyn ResilienceObserver>,
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("config", &self.config())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Decrements the waiter count when the queued caller leaves, however it
/// leaves (admitted, timed out or cancelled).
struct QueueSlot<'a>(&'a AtomicU32);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self::with_observer(name, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        name: impl Into<String>,
        config: BulkheadConfig,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_calls as usize)),
            config: ArcSwap::from_pointee(config),
            in_flight: AtomicUsize::new(0),
            shrink_debt: AtomicU32::new(0),
            resize: Mutex::new(()),
            waiting: AtomicU32::new(0),
            total_admitted: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Arc<BulkheadConfig> {
        self.config.load_full()
    }

    /// Current number of admitted, unreleased calls.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Apply new settings without dropping admitted or queued callers.
    ///
    /// Growing adds permits. Shrinking removes free permits now and forgets
    /// the rest as held permits are released, so admitted calls never exceed
    /// the new maximum once the old calls drain.
    pub fn reconfigure(&self, config: BulkheadConfig) {
        let _resize = self.resize.lock().unwrap_or_else(PoisonError::into_inner);
        let old_max = self.config.load().max_concurrent_calls;
        let new_max = config.max_concurrent_calls;

        if new_max > old_max {
            let grow = new_max - old_max;
            let cancelled = self.cancel_shrink_debt(grow);
            self.semaphore.add_permits((grow - cancelled) as usize);
        } else if new_max < old_max {
            let mut shrink = old_max - new_max;
            while shrink > 0 {
                match self.semaphore.try_acquire() {
                    Ok(permit) => {
                        permit.forget();
                        shrink -= 1;
                    }
                    Err(_) => break,
                }
            }
            self.shrink_debt.fetch_add(shrink, Ordering::AcqRel);
        }

        tracing::info!(
            bulkhead = %self.name,
            old_max,
            new_max,
            max_wait_queue_size = config.max_wait_queue_size,
            "Bulkhead reconfigured"
        );
        self.config.store(Arc::new(config));
    }

    /// Cancel up to `n` permits of outstanding shrink debt; returns how many.
    fn cancel_shrink_debt(&self, n: u32) -> u32 {
        let mut current = self.shrink_debt.load(Ordering::Acquire);
        loop {
            let take = current.min(n);
            match self.shrink_debt.compare_exchange_weak(
                current,
                current - take,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve one concurrency slot.
    ///
    /// Returns `CallError::BulkheadFull` if no slot is free and the caller
    /// cannot (or could not, within `max_wait_duration`) wait for one.
    pub async fn admit(self: &Arc<Self>) -> Result<BulkheadPermit, CallError> {
        let started = Instant::now();

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => self.wait_for_slot().await,
        };

        match permit {
            Some(permit) => {
                self.total_admitted.fetch_add(1, Ordering::Relaxed);
                let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                self.observer.on_event(&ResilienceEvent::BulkheadAdmitted {
                    bulkhead: self.name.clone(),
                    in_flight,
                    waited: started.elapsed(),
                });
                Ok(BulkheadPermit {
                    bulkhead: self.clone(),
                    permit: Some(permit),
                })
            }
            None => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                let in_flight = self.in_flight();
                tracing::warn!(bulkhead = %self.name, in_flight, "Bulkhead full, rejecting call");
                self.observer.on_event(&ResilienceEvent::BulkheadRejected {
                    bulkhead: self.name.clone(),
                    in_flight,
                });
                Err(CallError::BulkheadFull {
                    name: self.name.clone(),
                })
            }
        }
    }

    async fn wait_for_slot(&self) -> Option<OwnedSemaphorePermit> {
        let config = self.config.load_full();
        let max_queue = config.max_wait_queue_size;
        if max_queue == 0 {
            return None;
        }

        let mut current = self.waiting.load(Ordering::Acquire);
        loop {
            if current >= max_queue {
                return None;
            }
            match self.waiting.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let _slot = QueueSlot(&self.waiting);

        tracing::debug!(bulkhead = %self.name, waiting = current + 1, "Queued for bulkhead slot");
        match tokio::time::timeout(
            config.max_wait_duration,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Some(permit),
            // Closed semaphore or wait timed out.
            _ => None,
        }
    }

    pub fn snapshot(&self) -> BulkheadSnapshot {
        let config = self.config.load();
        BulkheadSnapshot {
            name: self.name.clone(),
            in_flight: self.in_flight(),
            waiting: self.waiting.load(Ordering::Acquire),
            max_concurrent_calls: config.max_concurrent_calls,
            max_wait_queue_size: config.max_wait_queue_size,
            max_wait_duration_ms: config.max_wait_duration.as_millis() as u64,
            total_admitted: self.total_admitted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

/// A RAII guard holding one bulkhead slot. The slot is freed on drop.
pub struct BulkheadPermit {
    bulkhead: Arc<Bulkhead>,
    permit: Option<OwnedSemaphorePermit>,
}

impl fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadPermit")
            .field("bulkhead", &self.bulkhead.name)
            .finish()
    }
}

impl BulkheadPermit {
    pub fn bulkhead(&self) -> &str {
        &self.bulkhead.name
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        let bulkhead = &self.bulkhead;
        // The count drops before the slot is handed on, so it never exceeds
        // the permits actually held.
        let in_flight = bulkhead.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if let Some(permit) = self.permit.take() {
            if bulkhead.cancel_shrink_debt(1) == 1 {
                permit.forget();
            }
        }
        bulkhead.observer.on_event(&ResilienceEvent::BulkheadReleased {
            bulkhead: bulkhead.name.clone(),
            in_flight,
        });
    }
}
