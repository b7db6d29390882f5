//! DST - Deterministic Simulation Testing
//!
//! Seeded randomness and fault injection shared by the simulation backend,
//! the fault-injecting connection source and the test suites.
//!
//! # Usage
//!
//! ```rust
//! use relstore_core::dst::{DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType};
//!
//! let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
//!     .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("put"))
//!     .build();
//!
//! assert_eq!(faults.should_inject("put"), Some(FaultType::StorageWriteFail));
//! assert_eq!(faults.should_inject("find"), None);
//! ```
//!
//! Run with an explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod config;
mod fault;
mod rng;

pub use config::{SimConfig, DST_SEED_ENV};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
