//! Instrumentation - Latency Measurement Decorator
//!
//! `TigerStyle`: Measurements never change outcomes.
//!
//! Measurement names are derived once per decorator from the entity type id:
//! `"<TypeId>:put"`, `"<TypeId>:find"`, `"<TypeId>:remove"` and
//! `"<TypeId>:removeAll"`. `select` is forwarded unmeasured.
//!
//! A measurement is opened before forwarding and recorded when its guard is
//! dropped, so exactly one record is produced per call whether the delegate
//! succeeds, fails, panics or is cancelled. Recording failures and panics
//! raised by the sink are logged and swallowed.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{Interceptor, Operation, Outcome};
use crate::context::Context;
use crate::storage::Entity;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by a measurement sink.
#[derive(Debug, Clone, Error)]
pub enum MeasurementError {
    /// The sink cannot accept records right now.
    #[error("measurement sink unavailable: {message}")]
    Unavailable {
        /// Why
        message: String,
    },

    /// The sink refused this record.
    #[error("measurement {name} rejected: {message}")]
    Rejected {
        /// Measurement name
        name: String,
        /// Why
        message: String,
    },
}

// =============================================================================
// Sink contract
// =============================================================================

/// A finished measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    /// Measurement name, e.g. `Account:put`
    pub name: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Time from open to record
    pub elapsed: Duration,
    /// How the measured call ended
    pub outcome: Outcome,
}

/// Destination for measurements.
pub trait MeasurementSink: Send + Sync + fmt::Debug {
    /// Record one finished measurement.
    ///
    /// # Errors
    /// Implementations may fail; callers log and drop the error.
    fn record(&self, ctx: &Context, record: MeasurementRecord) -> Result<(), MeasurementError>;
}

/// Emits each measurement as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMeasurements;

impl MeasurementSink for TracingMeasurements {
    fn record(&self, ctx: &Context, record: MeasurementRecord) -> Result<(), MeasurementError> {
        tracing::info!(
            target: "relstore::measurement",
            name = %record.name,
            elapsed_us = u64::try_from(record.elapsed.as_micros()).unwrap_or(u64::MAX),
            outcome = ?record.outcome,
            request_id = %ctx.request_id(),
            "measurement"
        );
        Ok(())
    }
}

/// Keeps measurements in memory for inspection.
#[derive(Debug, Default)]
pub struct MeasurementLog {
    records: Mutex<Vec<MeasurementRecord>>,
}

impl MeasurementLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record so far.
    #[must_use]
    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of records with `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.name == name)
            .count()
    }

    /// Forget every record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl MeasurementSink for MeasurementLog {
    fn record(&self, _ctx: &Context, record: MeasurementRecord) -> Result<(), MeasurementError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

// =============================================================================
// Measurement
// =============================================================================

/// An open measurement.
#[derive(Debug)]
pub struct Measurement {
    name: String,
    started_at: DateTime<Utc>,
    started: Instant,
    outcome: Outcome,
    sink: Arc<dyn MeasurementSink>,
}

impl Measurement {
    /// Start measuring now.
    #[must_use]
    pub fn open(name: impl Into<String>, sink: Arc<dyn MeasurementSink>) -> Self {
        let name = name.into();
        // Precondition
        assert!(!name.is_empty(), "measurement name must not be empty");

        Self {
            name,
            started_at: Utc::now(),
            started: Instant::now(),
            outcome: Outcome::Aborted,
            sink,
        }
    }

    /// Measurement name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outcome reported when recorded. Defaults to `Aborted`.
    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = outcome;
    }

    /// Stop and hand the measurement to its sink.
    ///
    /// # Errors
    /// Whatever the sink returns.
    pub fn record(self, ctx: &Context) -> Result<(), MeasurementError> {
        let record = MeasurementRecord {
            name: self.name,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            outcome: self.outcome,
        };
        self.sink.record(ctx, record)
    }

    /// Tie recording to a guard's drop.
    #[must_use]
    pub fn guard(self, ctx: &Context) -> MeasurementGuard {
        MeasurementGuard {
            measurement: Some(self),
            ctx: ctx.clone(),
        }
    }
}

/// Records its measurement exactly once, when dropped.
#[derive(Debug)]
pub struct MeasurementGuard {
    measurement: Option<Measurement>,
    ctx: Context,
}

impl MeasurementGuard {
    /// Outcome to report on drop.
    pub fn set_outcome(&mut self, outcome: Outcome) {
        if let Some(measurement) = self.measurement.as_mut() {
            measurement.set_outcome(outcome);
        }
    }
}

impl Drop for MeasurementGuard {
    fn drop(&mut self) {
        let Some(measurement) = self.measurement.take() else {
            return;
        };
        let name = measurement.name().to_owned();
        let ctx = &self.ctx;

        match catch_unwind(AssertUnwindSafe(|| measurement.record(ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(measurement = %name, %error, "failed to record measurement");
            }
            Err(_) => {
                tracing::warn!(measurement = %name, "measurement sink panicked");
            }
        }
    }
}

// =============================================================================
// Instrumentation
// =============================================================================

/// Interceptor measuring put, find, remove and remove_all latency.
pub struct Instrumentation<E> {
    put: String,
    find: String,
    remove: String,
    remove_all: String,
    sink: Arc<dyn MeasurementSink>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Instrumentation<E> {
    /// Measure into `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MeasurementSink>) -> Self {
        let type_id = E::TYPE_ID;
        Self {
            put: format!("{type_id}:{}", Operation::Put),
            find: format!("{type_id}:{}", Operation::Find),
            remove: format!("{type_id}:{}", Operation::Remove),
            remove_all: format!("{type_id}:{}", Operation::RemoveAll),
            sink,
            _entity: PhantomData,
        }
    }

    /// Measurement name for `op`; `None` for unmeasured operations.
    #[must_use]
    pub fn measurement_name(&self, op: Operation) -> Option<&str> {
        match op {
            Operation::Put => Some(&self.put),
            Operation::Find => Some(&self.find),
            Operation::Remove => Some(&self.remove),
            Operation::RemoveAll => Some(&self.remove_all),
            Operation::Select => None,
        }
    }
}

impl<E: Entity> Interceptor<E> for Instrumentation<E> {
    type Guard = Option<MeasurementGuard>;

    fn enter(&self, ctx: &Context, op: Operation) -> Self::Guard {
        let name = self.measurement_name(op)?;
        Some(Measurement::open(name, Arc::clone(&self.sink)).guard(ctx))
    }

    fn exit(&self, guard: &mut Self::Guard, outcome: Outcome) {
        if let Some(guard) = guard {
            guard.set_outcome(outcome);
        }
    }
}

impl<E> fmt::Debug for Instrumentation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("put", &self.put)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{account, Account};
    use crate::storage::{Query, SimStorage, Storage, StorageExt};
    use relstore_core::dst::{
        DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType, SimConfig,
    };

    #[derive(Debug)]
    struct BrokenSink;

    impl MeasurementSink for BrokenSink {
        fn record(&self, _ctx: &Context, record: MeasurementRecord) -> Result<(), MeasurementError> {
            Err(MeasurementError::Rejected {
                name: record.name,
                message: "disk full".into(),
            })
        }
    }

    #[derive(Debug)]
    struct PanickingSink;

    impl MeasurementSink for PanickingSink {
        fn record(&self, _ctx: &Context, _record: MeasurementRecord) -> Result<(), MeasurementError> {
            panic!("sink exploded");
        }
    }

    #[test]
    fn test_names_derive_from_type_id() {
        let inst = Instrumentation::<Account>::new(Arc::new(MeasurementLog::new()));
        assert_eq!(inst.measurement_name(Operation::Put), Some("Account:put"));
        assert_eq!(inst.measurement_name(Operation::Find), Some("Account:find"));
        assert_eq!(inst.measurement_name(Operation::Remove), Some("Account:remove"));
        assert_eq!(
            inst.measurement_name(Operation::RemoveAll),
            Some("Account:removeAll")
        );
        assert_eq!(inst.measurement_name(Operation::Select), None);
    }

    #[test]
    fn test_guard_records_once_with_default_aborted() {
        let log = Arc::new(MeasurementLog::new());
        let ctx = Context::new();
        {
            let _guard = Measurement::open("x:put", log.clone()).guard(&ctx);
        }
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Aborted);
    }

    #[tokio::test]
    async fn test_each_measured_call_records_once() {
        let log = Arc::new(MeasurementLog::new());
        let ctx = Context::new();
        let storage = SimStorage::<Account>::new(SimConfig::with_seed(42))
            .unwrap()
            .decorate(Instrumentation::new(log.clone()));

        storage.put(&ctx, &account(1, "alice", 5)).await.unwrap();
        storage.put(&ctx, &account(2, "bob", 7)).await.unwrap();
        storage.find(&ctx, &1).await.unwrap();
        storage.select_all(&ctx, &Query::all()).await.unwrap();
        storage.remove(&ctx, &account(2, "bob", 7)).await.unwrap();
        storage.remove_all(&ctx, &Query::all()).await.unwrap();

        assert_eq!(log.count("Account:put"), 2);
        assert_eq!(log.count("Account:find"), 1);
        assert_eq!(log.count("Account:remove"), 1);
        assert_eq!(log.count("Account:removeAll"), 1);
        assert_eq!(log.records().len(), 5);
        assert!(log.records().iter().all(|r| r.outcome == Outcome::Success));
    }

    #[tokio::test]
    async fn test_failed_put_still_recorded() {
        let log = Arc::new(MeasurementLog::new());
        let ctx = Context::new();
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(1))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("put"))
            .build();
        let storage = SimStorage::<Account>::with_fault_injector(Arc::new(faults))
            .unwrap()
            .decorate(Instrumentation::new(log.clone()));

        assert!(storage.put(&ctx, &account(1, "a", 1)).await.is_err());

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Account:put");
        assert_eq!(records[0].outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn test_sink_errors_never_reach_caller() {
        let ctx = Context::new();
        let broken = SimStorage::<Account>::new(SimConfig::with_seed(2))
            .unwrap()
            .decorate(Instrumentation::new(Arc::new(BrokenSink)));
        assert!(broken.put(&ctx, &account(1, "a", 1)).await.is_ok());

        let panicking = SimStorage::<Account>::new(SimConfig::with_seed(2))
            .unwrap()
            .decorate(Instrumentation::new(Arc::new(PanickingSink)));
        let saved = panicking.put(&ctx, &account(1, "a", 1)).await.unwrap();
        assert_eq!(saved.id, 1);
    }
}
