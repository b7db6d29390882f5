//! FaultInjector - Probabilistic Fault Injection
//!
//! TigerStyle: Explicit fault injection for chaos testing of storage backends
//! and connection sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Storage Faults
    // =========================================================================
    /// Write (put) fails
    StorageWriteFail,
    /// Read (find/select) fails
    StorageReadFail,
    /// Delete (remove/removeAll) fails
    StorageDeleteFail,

    // =========================================================================
    // Database Faults
    // =========================================================================
    /// Connection cannot be established
    DbConnectionFail,
    /// Pool has no connection to hand out
    DbPoolExhausted,
    /// Statement timed out
    DbQueryTimeout,
}

impl FaultType {
    /// Stable snake_case name, used in stats and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageWriteFail => "storage_write_fail",
            Self::StorageReadFail => "storage_read_fail",
            Self::StorageDeleteFail => "storage_delete_fail",
            Self::DbConnectionFail => "db_connection_fail",
            Self::DbPoolExhausted => "db_pool_exhausted",
            Self::DbQueryTimeout => "db_query_timeout",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Operation filter (substring match); `None` applies to every operation
    pub operation_filter: Option<String>,
    /// Maximum number of injections (`None` = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {DST_FAULT_PROBABILITY_MAX}], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Only inject for operations whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Stop injecting after `max` hits.
    ///
    /// # Panics
    /// Panics if max is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        // Precondition
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }

    fn applies_to(&self, operation: &str) -> bool {
        self.operation_filter
            .as_deref()
            .map_or(true, |filter| operation.contains(filter))
    }
}

/// Fault injector for simulation testing.
///
/// Configs are evaluated in registration order; the first one that fires wins.
/// Interior mutability lets a single injector be shared via `Arc` between a
/// backend, a connection source and the test body.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    /// Hits per registered config, indexed like `configs`
    hits: Vec<AtomicU64>,
}

impl FaultInjector {
    /// Create an injector with no faults registered.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            hits: Vec::new(),
        }
    }

    /// Register a fault configuration.
    ///
    /// Registration needs `&mut self`, so it happens before sharing via `Arc`.
    pub fn register(&mut self, config: FaultConfig) {
        self.configs.push(config);
        self.hits.push(AtomicU64::new(0));
    }

    /// Decide whether `operation` should fail, and with which fault.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for (config, hits) in self.configs.iter().zip(&self.hits) {
            if !config.applies_to(operation) {
                continue;
            }
            if let Some(max) = config.max_injections {
                if hits.load(Ordering::Relaxed) >= max {
                    continue;
                }
            }

            let fire = {
                let mut rng = self
                    .rng
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                rng.next_bool(config.probability)
            };
            if fire {
                hits.fetch_add(1, Ordering::Relaxed);
                return Some(config.fault_type);
            }
        }

        None
    }

    /// Injection counts keyed by fault name.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<&'static str, u64> {
        let mut stats = HashMap::new();
        for (config, hits) in self.configs.iter().zip(&self.hits) {
            *stats.entry(config.fault_type.as_str()).or_insert(0) += hits.load(Ordering::Relaxed);
        }
        stats
    }

    /// Total injections across all configs.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.hits.iter().map(|h| h.load(Ordering::Relaxed)).sum()
    }

    /// Reset all counters, re-arming capped configs.
    pub fn reset_stats(&self) {
        for hits in &self.hits {
            hits.store(0, Ordering::Relaxed);
        }
    }
}

/// Builder for [`FaultInjector`].
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a builder drawing from the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add write, read and delete failures at the same probability.
    #[must_use]
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability).with_filter("put"))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability).with_filter("find"))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability).with_filter("select"))
            .with_fault(FaultConfig::new(FaultType::StorageDeleteFail, probability).with_filter("remove"))
    }

    /// Add connection acquisition failures.
    #[must_use]
    pub fn with_db_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::DbConnectionFail, probability))
            .with_fault(FaultConfig::new(FaultType::DbPoolExhausted, probability))
    }

    /// Build the injector.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn injector_with(config: FaultConfig) -> FaultInjector {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(config);
        injector
    }

    #[test]
    fn test_no_faults_registered() {
        let injector = FaultInjector::new(DeterministicRng::new(42));
        assert!((0..100).all(|_| injector.should_inject("put").is_none()));
    }

    #[test]
    fn test_always_and_never() {
        let always = injector_with(FaultConfig::new(FaultType::StorageWriteFail, 1.0));
        let never = injector_with(FaultConfig::new(FaultType::StorageWriteFail, 0.0));
        for _ in 0..20 {
            assert_eq!(always.should_inject("put"), Some(FaultType::StorageWriteFail));
            assert_eq!(never.should_inject("put"), None);
        }
    }

    #[test]
    fn test_operation_filter() {
        let injector =
            injector_with(FaultConfig::new(FaultType::StorageDeleteFail, 1.0).with_filter("remove"));
        assert_eq!(injector.should_inject("remove_all"), Some(FaultType::StorageDeleteFail));
        assert_eq!(injector.should_inject("select"), None);
    }

    #[test]
    fn test_max_injections_and_reset() {
        let injector =
            injector_with(FaultConfig::new(FaultType::DbConnectionFail, 1.0).with_max_injections(2));
        assert!(injector.should_inject("acquire").is_some());
        assert!(injector.should_inject("acquire").is_some());
        assert!(injector.should_inject("acquire").is_none());
        assert_eq!(injector.total_injections(), 2);

        injector.reset_stats();
        assert_eq!(injector.total_injections(), 0);
        assert!(injector.should_inject("acquire").is_some());
    }

    #[test]
    fn test_stats_group_by_fault_type() {
        let injector = FaultInjectorBuilder::new(DeterministicRng::new(1))
            .with_storage_faults(1.0)
            .build();
        injector.should_inject("find");
        injector.should_inject("select");
        injector.should_inject("put");

        let stats = injector.injection_stats();
        assert_eq!(stats.get("storage_read_fail"), Some(&2));
        assert_eq!(stats.get("storage_write_fail"), Some(&1));
        assert_eq!(stats.get("storage_delete_fail"), Some(&0));
    }

    #[test]
    fn test_shared_via_arc() {
        let injector = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(5))
                .with_db_faults(1.0)
                .build(),
        );
        let other = Arc::clone(&injector);
        assert_eq!(other.should_inject("acquire"), Some(FaultType::DbConnectionFail));
        assert_eq!(injector.total_injections(), 1);
    }

    #[test]
    #[should_panic(expected = "probability must be in")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::StorageWriteFail, 1.5);
    }

    #[test]
    #[should_panic(expected = "max_injections must be positive")]
    fn test_invalid_max_injections() {
        let _ = FaultConfig::new(FaultType::StorageWriteFail, 0.5).with_max_injections(0);
    }
}
