//! relstore Core - Simulation Primitives
//!
//! TigerStyle building blocks shared by every relstore backend:
//!
//! - [`constants`] - named limits with units in the name
//! - [`dst`] - seeded RNG and probabilistic fault injection
//!
//! Backends take an `Arc<FaultInjector>` so a single seed drives every fault
//! in a test run.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod dst;

pub use constants::*;
pub use dst::{
    DeterministicRng, FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType, SimConfig,
};
