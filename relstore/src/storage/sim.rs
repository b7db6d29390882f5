//! `SimStorage` - In-Memory Storage for Testing
//!
//! `TigerStyle`: Deterministic testing with fault injection.
//!
//! Answers the same queries as the relational engine: predicates are
//! evaluated with [`Predicate::matches`](super::Predicate::matches), orders
//! with [`Order::compare`](super::Order::compare), and rows otherwise keep
//! insertion order.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use relstore_core::dst::{DeterministicRng, FaultInjector, SimConfig};

use super::backend::{Query, Sink, Storage};
use super::error::{StorageError, StorageResult};
use super::model::{Entity, EntityModel};
use super::value::SqlValue;
use crate::context::Context;

// =============================================================================
// SimStorage
// =============================================================================

/// In-memory storage backend for testing.
///
/// `TigerStyle`:
/// - Deterministic via `DeterministicRng`
/// - Fault injection via `FaultInjector`
/// - Thread-safe with `RwLock`
pub struct SimStorage<E: Entity> {
    model: Arc<EntityModel<E>>,
    /// Rows in insertion order
    rows: Arc<RwLock<Vec<E>>>,
    fault_injector: Arc<FaultInjector>,
}

impl<E: Entity> SimStorage<E> {
    /// Create a backend with no faults registered.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` if `E`'s model is invalid.
    pub fn new(config: SimConfig) -> StorageResult<Self> {
        let mut rng = DeterministicRng::new(config.seed());
        Self::with_fault_injector(Arc::new(FaultInjector::new(rng.fork())))
    }

    /// Create a backend sharing an external fault injector.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` if `E`'s model is invalid.
    pub fn with_fault_injector(fault_injector: Arc<FaultInjector>) -> StorageResult<Self> {
        Ok(Self {
            model: Arc::new(EntityModel::resolve()?),
            rows: Arc::new(RwLock::new(Vec::new())),
            fault_injector,
        })
    }

    /// Get fault injector for inspection.
    #[must_use]
    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.fault_injector
    }

    /// Number of stored rows (for testing).
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn maybe_inject_fault(&self, operation: &str) -> StorageResult<()> {
        if let Some(fault_type) = self.fault_injector.should_inject(operation) {
            tracing::debug!(%fault_type, operation, "injecting fault");
            Err(StorageError::simulated_fault(format!(
                "{fault_type} during {operation}"
            )))
        } else {
            Ok(())
        }
    }

    fn key_of(&self, entity: &E) -> SqlValue {
        self.model.key_of(entity)
    }

    fn position(&self, rows: &[E], key: &SqlValue) -> Option<usize> {
        rows.iter().position(|row| &self.key_of(row) == key)
    }

    /// Indices of the rows `query` selects, in result order.
    fn matching(&self, rows: &[E], query: &Query<'_>) -> StorageResult<Vec<usize>> {
        let mut hits = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let keep = match query.predicate() {
                Some(predicate) => predicate.matches(&self.model.row(row))?,
                None => true,
            };
            if keep {
                hits.push(i);
            }
        }

        if let Some(order) = query.order() {
            hits.sort_by(|&a, &b| {
                order.compare(&self.model.row(&rows[a]), &self.model.row(&rows[b]))
            });
        }

        let skip = query
            .skip()
            .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = query
            .limit()
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        Ok(hits.into_iter().skip(skip).take(limit).collect())
    }
}

impl<E: Entity> Clone for SimStorage<E> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            rows: Arc::clone(&self.rows),
            fault_injector: Arc::clone(&self.fault_injector),
        }
    }
}

impl<E: Entity> fmt::Debug for SimStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimStorage")
            .field("table", &self.model.table())
            .field("rows", &self.row_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: Entity> Storage<E> for SimStorage<E> {
    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn put(&self, ctx: &Context, entity: &E) -> StorageResult<E> {
        self.maybe_inject_fault("put")?;

        let key = self.key_of(entity);
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        match self.position(&rows, &key) {
            Some(i) => rows[i] = entity.clone(),
            None => rows.push(entity.clone()),
        }
        Ok(entity.clone())
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn find(&self, ctx: &Context, id: &E::Id) -> StorageResult<Option<E>> {
        self.maybe_inject_fault("find")?;

        let key: SqlValue = id.clone().into();
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self.position(&rows, &key).map(|i| rows[i].clone()))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn remove(&self, ctx: &Context, entity: &E) -> StorageResult<Option<E>> {
        self.maybe_inject_fault("remove")?;

        let key = self.key_of(entity);
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        Ok(self.position(&rows, &key).map(|i| {
            rows.remove(i);
            entity.clone()
        }))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<u64> {
        self.maybe_inject_fault("remove_all")?;

        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut doomed = self.matching(&rows, query)?;
        doomed.sort_unstable();
        for &i in doomed.iter().rev() {
            rows.remove(i);
        }
        Ok(doomed.len() as u64)
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn select(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink<E> + Send),
        query: &Query<'_>,
    ) -> StorageResult<()> {
        self.maybe_inject_fault("select")?;

        let selected: Vec<E> = {
            let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
            self.matching(&rows, query)?
                .into_iter()
                .map(|i| rows[i].clone())
                .collect()
        };
        for entity in selected {
            sink.put(entity);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
