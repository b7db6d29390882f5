//! TigerStyle Constants
//!
//! All limits use big-endian naming: CATEGORY_SPECIFICS_UNIT_LIMIT
//! Example: SQL_IDENTIFIER_BYTES_MAX (not MAX_SQL_IDENTIFIER_LENGTH)
//!
//! Every constant includes units in the name:
//! - _BYTES_MAX/MIN for size limits
//! - _COUNT_MAX for quantity limits
//! - _MS for milliseconds

// =============================================================================
// Query Limits
// =============================================================================

/// Skip/limit values at or above this are treated as unbounded (2^53 - 1)
pub const QUERY_BOUND_UNBOUNDED: i64 = 9_007_199_254_740_991;

/// Maximum number of values in a single IN (...) predicate
pub const QUERY_IN_VALUES_COUNT_MAX: usize = 1_000;

// =============================================================================
// SQL Limits
// =============================================================================

/// Maximum length of a table or column identifier
pub const SQL_IDENTIFIER_BYTES_MAX: usize = 63;

/// Initial capacity of a per-operation statement buffer
pub const SQL_STATEMENT_BYTES_DEFAULT: usize = 256;

/// Maximum number of persisted columns per entity
pub const SQL_COLUMNS_COUNT_MAX: usize = 256;

// =============================================================================
// Connection Pool Limits
// =============================================================================

/// Default maximum connections in a pool
pub const POOL_CONNECTIONS_COUNT_DEFAULT: u32 = 10;

/// Upper bound on pool size
pub const POOL_CONNECTIONS_COUNT_MAX: u32 = 1_000;

/// Default time to wait for a pooled connection
pub const POOL_ACQUIRE_TIMEOUT_MS_DEFAULT: u64 = 30_000;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum number of simulation steps
pub const DST_SIMULATION_STEPS_MAX: u64 = 1_000_000;

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Maximum bytes produced by a single `next_bytes` call
pub const DST_RANDOM_BYTES_MAX: usize = 1_000_000;
