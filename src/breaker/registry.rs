//! Registry of process-wide circuit breakers
//!
//! The registry is built once at startup and owns exactly one breaker per
//! dependency. Call sites receive `Arc` handles from it instead of reaching
//! for globals, so every caller of a dependency shares the same failure count.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::config::ResilienceConfig;

/// Name of the database service breaker.
pub const DATABASE: &str = "database";

/// Name of the AI generation service breaker.
pub const AI_GENERATION: &str = "ai_generation";

/// Registry owning one breaker per named dependency.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    /// Registered breakers by dependency name
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one breaker per configured dependency.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let mut registry = Self::new();
        for (name, breaker) in &config.breakers {
            registry.register(name.clone(), breaker.clone());
        }
        registry
    }

    /// Register a breaker for a dependency
    ///
    /// If the dependency already has a breaker, the existing instance is
    /// returned and `config` is ignored; a dependency never gets a second breaker.
    pub fn register(&mut self, name: impl Into<String>, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let name = name.into();
        Arc::clone(
            self.breakers
                .entry(name.clone())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config))),
        )
    }

    /// Get the breaker for a dependency
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    /// Check if a dependency has a breaker
    pub fn has(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// All dependency names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.breakers.keys().map(String::as_str).collect()
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots of every breaker, sorted by name
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.values().map(|breaker| breaker.state()).collect()
    }
}
