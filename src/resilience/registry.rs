//! Registry of circuit breakers and bulkheads, keyed by name.
//!
//! # Responsibilities
//! - Build named instances from configuration at startup
//! - Create unknown names lazily from the configured defaults
//! - Apply configuration reloads
//!
//! # Design Decisions
//! - Owned by the process and passed around explicitly, no statics
//! - `DashMap` shards the maps so different names never contend
//! - A reload replaces only breakers whose effective settings changed;
//!   bulkheads are resized in place and keep their held permits

use std::sync::Arc;
use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::schema::ResilienceConfig;
use crate::resilience::bulkhead::{Bulkhead, BulkheadSnapshot};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::resilience::events::{NoopObserver, ResilienceObserver};

pub struct ResilienceRegistry {
    config: ArcSwap<ResilienceConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for ResilienceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceRegistry")
            .field("breakers", &self.breakers.len())
            .field("bulkheads", &self.bulkheads.len())
            .finish()
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new(ResilienceConfig::default(), Arc::new(NoopObserver))
    }
}

impl ResilienceRegistry {
    /// Create a registry and eagerly build every named instance in `config`.
    pub fn new(config: ResilienceConfig, observer: Arc<dyn ResilienceObserver>) -> Self {
        let registry = Self {
            config: ArcSwap::from_pointee(config),
            breakers: DashMap::new(),
            bulkheads: DashMap::new(),
            observer,
        };

        let config = registry.config.load_full();
        for name in config.circuit_breakers.keys() {
            registry.circuit_breaker(name);
        }
        for name in config.bulkheads.keys() {
            registry.bulkhead(name);
        }

        tracing::info!(
            breakers = registry.breakers.len(),
            bulkheads = registry.bulkheads.len(),
            "Resilience registry initialized"
        );
        registry
    }

    pub fn observer(&self) -> &Arc<dyn ResilienceObserver> {
        &self.observer
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<ResilienceConfig> {
        self.config.load_full()
    }

    /// The breaker registered as `name`, created from defaults if unknown.
    pub fn circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.config.load().circuit_breaker(name);
                tracing::debug!(breaker = %name, ?config, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_observer(name, config, self.observer.clone()))
            })
            .clone()
    }

    /// The bulkhead registered as `name`, created from defaults if unknown.
    pub fn bulkhead(&self, name: &str) -> Arc<Bulkhead> {
        if let Some(existing) = self.bulkheads.get(name) {
            return existing.clone();
        }
        self.bulkheads
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.config.load().bulkhead(name);
                tracing::debug!(bulkhead = %name, ?config, "Creating bulkhead");
                Arc::new(Bulkhead::with_observer(name, config, self.observer.clone()))
            })
            .clone()
    }

    /// Apply a new configuration.
    ///
    /// Returns the number of instances that were replaced or resized.
    pub fn reload(&self, config: ResilienceConfig) -> usize {
        let config = Arc::new(config);
        self.config.store(config.clone());
        let mut replaced = 0;

        for mut entry in self.breakers.iter_mut() {
            let name = entry.key().clone();
            let wanted = config.circuit_breaker(&name);
            if *entry.value().config() != wanted {
                tracing::info!(breaker = %name, "Circuit breaker reconfigured");
                *entry.value_mut() = Arc::new(CircuitBreaker::with_observer(
                    name,
                    wanted,
                    self.observer.clone(),
                ));
                replaced += 1;
            }
        }

        // Bulkheads are resized in place so held permits stay counted.
        for entry in self.bulkheads.iter() {
            let wanted = config.bulkhead(entry.key());
            if *entry.value().config() != wanted {
                entry.value().reconfigure(wanted);
                replaced += 1;
            }
        }

        // Instances named for the first time are built eagerly too.
        for name in config.circuit_breakers.keys() {
            self.circuit_breaker(name);
        }
        for name in config.bulkheads.keys() {
            self.bulkhead(name);
        }

        replaced
    }

    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn bulkhead_snapshots(&self) -> Vec<BulkheadSnapshot> {
        let mut snapshots: Vec<_> = self.bulkheads.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
