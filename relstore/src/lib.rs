//! # relstore
//!
//! Typed object-relational storage with interchangeable backends and
//! transparent decorators.
//!
//! ## Features
//!
//! - **Uniform storage contract**: `put`, `find`, `remove`, `remove_all` and
//!   `select` for any [`Entity`](storage::Entity), with explicit errors
//! - **SQL engine**: [`RelationalStorage`](storage::RelationalStorage) creates
//!   its table on first use, upserts, and compiles predicate/order/paging
//!   queries into parameterized SQL for SQLite, PostgreSQL and MySQL
//! - **Decorators**: wrap any storage with an
//!   [`Interceptor`](decorator::Interceptor), e.g. latency
//!   [`Instrumentation`](decorator::Instrumentation)
//! - **Deterministic testing**: [`SimStorage`](storage::SimStorage) answers the
//!   same queries in memory, with seeded fault injection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relstore::config::StoreConfig;
//! use relstore::context::Context;
//! use relstore::decorator::{Instrumentation, TracingMeasurements};
//! use relstore::storage::{desc, gt, Entity, Property, Query, RelationalStorage, Storage, StorageExt};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Account {
//!     id: i64,
//!     owner: String,
//!     balance: i64,
//! }
//!
//! impl Entity for Account {
//!     type Id = i64;
//!     const TYPE_ID: &'static str = "Account";
//!
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//!
//!     fn new_zero() -> Self {
//!         Self::default()
//!     }
//!
//!     fn properties() -> Vec<Property<Self>> {
//!         vec![
//!             Property::new("id", "BIGINT", |a: &Self| a.id.into(), |a, v| {
//!                 a.id = v.try_into()?;
//!                 Ok(())
//!             })
//!             .primary_key(),
//!             Property::new("owner", "VARCHAR(64)", |a: &Self| a.owner.clone().into(), |a, v| {
//!                 a.owner = v.try_into()?;
//!                 Ok(())
//!             }),
//!             Property::new("balance", "BIGINT", |a: &Self| a.balance.into(), |a, v| {
//!                 a.balance = v.try_into()?;
//!                 Ok(())
//!             }),
//!         ]
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::sqlite_memory();
//! let pool = config.connect().await?;
//! let accounts = RelationalStorage::<Account>::new(pool, &config)
//!     .await?
//!     .decorate(Instrumentation::new(Arc::new(TracingMeasurements)));
//!
//! let ctx = Context::new();
//! accounts.put(&ctx, &Account { id: 1, owner: "alice".into(), balance: 120 }).await?;
//!
//! let rich = gt("balance", 100_i64);
//! let order = desc("balance");
//! let page = accounts
//!     .select_all(&ctx, &Query::all().with_predicate(&rich).with_order(&order).with_limit(10))
//!     .await?;
//! assert_eq!(page.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  caller                                                  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Decorated<E, I>   │ enter → forward → exit, guard drop │
//! ├─────────────────────────────────────────────────────────┤
//! │  RelationalStorage │ compile · bind · execute · map     │
//! │  SimStorage        │ evaluate in memory, inject faults  │
//! ├─────────────────────────────────────────────────────────┤
//! │  ConnectionSource  │ AnyPool (sqlite/postgres/mysql)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - SQLite driver
//! - `postgres` - PostgreSQL driver
//! - `mysql` - MySQL / MariaDB driver

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod decorator;
pub mod storage;
pub mod telemetry;

pub use config::{ConfigError, StoreConfig};
pub use context::Context;
pub use decorator::{Decorated, Instrumentation, Interceptor};
pub use storage::{RelationalStorage, SimStorage, Storage, StorageError, StorageExt, StorageResult};

/// Simulation primitives, re-exported from `relstore-core`.
pub mod dst {
    pub use relstore_core::dst::*;
}
