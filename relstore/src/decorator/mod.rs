//! Decorators - Transparent Storage Wrappers
//!
//! `TigerStyle`: Composition over subclassing.
//!
//! A [`Decorated`] storage holds exactly one delegate, fixed at construction,
//! and forwards every operation to it with unmodified arguments and results.
//! Behaviour is added by an [`Interceptor`]:
//!
//! - `enter` runs before the call and returns a guard
//! - `exit` runs after the delegate returned, with the outcome
//! - the guard's `Drop` runs on every path: success, failure, panic
//!   unwinding, or the caller dropping the future
//!
//! Chains are built by decorating a decorated storage again:
//!
//! ```rust,ignore
//! let storage = RelationalStorage::<Account>::new(pool, &config).await?
//!     .decorate(Instrumentation::new(Arc::new(TracingMeasurements)))
//!     .decorate(());
//! ```

mod instrument;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::storage::{Entity, Query, Sink, Storage, StorageResult};

pub use instrument::{
    Instrumentation, Measurement, MeasurementError, MeasurementGuard, MeasurementLog,
    MeasurementRecord, MeasurementSink, TracingMeasurements,
};

// =============================================================================
// Operation / Outcome
// =============================================================================

/// A storage operation, as seen by interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// `put`
    Put,
    /// `find`
    Find,
    /// `remove`
    Remove,
    /// `remove_all`
    RemoveAll,
    /// `select`
    Select,
}

impl Operation {
    /// Name used in measurement names (`put`, `find`, `remove`, `removeAll`, `select`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Find => "find",
            Self::Remove => "remove",
            Self::RemoveAll => "removeAll",
            Self::Select => "select",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a forwarded call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Delegate returned `Ok`
    Success,
    /// Delegate returned `Err`
    Failed,
    /// The call never completed (panic or cancellation)
    Aborted,
}

impl Outcome {
    /// Classify a delegate result.
    #[must_use]
    pub fn of<T>(result: &StorageResult<T>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

// =============================================================================
// Interceptor
// =============================================================================

/// Behaviour wrapped around each forwarded operation.
pub trait Interceptor<E: Entity>: Send + Sync + 'static {
    /// State carried across the call. Its `Drop` is the guaranteed-run block.
    type Guard: Send;

    /// Called before forwarding.
    fn enter(&self, ctx: &Context, op: Operation) -> Self::Guard;

    /// Called after the delegate returned.
    fn exit(&self, guard: &mut Self::Guard, outcome: Outcome) {
        let _ = (guard, outcome);
    }
}

/// Pure pass-through.
impl<E: Entity> Interceptor<E> for () {
    type Guard = ();

    fn enter(&self, _ctx: &Context, _op: Operation) {}
}

// =============================================================================
// Decorated
// =============================================================================

/// The generic forwarding proxy.
pub struct Decorated<E: Entity, I> {
    delegate: Arc<dyn Storage<E>>,
    interceptor: I,
}

impl<E: Entity, I: Interceptor<E>> Decorated<E, I> {
    /// Wrap `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn Storage<E>>, interceptor: I) -> Self {
        Self {
            delegate,
            interceptor,
        }
    }

    /// The wrapped storage.
    #[must_use]
    pub fn delegate(&self) -> &Arc<dyn Storage<E>> {
        &self.delegate
    }

    /// The interceptor.
    #[must_use]
    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    async fn intercept<T, F>(&self, ctx: &Context, op: Operation, call: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let mut guard = self.interceptor.enter(ctx, op);
        let result = call.await;
        self.interceptor.exit(&mut guard, Outcome::of(&result));
        result
    }
}

#[async_trait]
impl<E: Entity, I: Interceptor<E>> Storage<E> for Decorated<E, I> {
    async fn put(&self, ctx: &Context, entity: &E) -> StorageResult<E> {
        self.intercept(ctx, Operation::Put, self.delegate.put(ctx, entity))
            .await
    }

    async fn find(&self, ctx: &Context, id: &E::Id) -> StorageResult<Option<E>> {
        self.intercept(ctx, Operation::Find, self.delegate.find(ctx, id))
            .await
    }

    async fn remove(&self, ctx: &Context, entity: &E) -> StorageResult<Option<E>> {
        self.intercept(ctx, Operation::Remove, self.delegate.remove(ctx, entity))
            .await
    }

    async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<u64> {
        self.intercept(ctx, Operation::RemoveAll, self.delegate.remove_all(ctx, query))
            .await
    }

    async fn select(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink<E> + Send),
        query: &Query<'_>,
    ) -> StorageResult<()> {
        self.intercept(ctx, Operation::Select, self.delegate.select(ctx, sink, query))
            .await
    }
}

impl<E: Entity, I: fmt::Debug> fmt::Debug for Decorated<E, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorated")
            .field("type_id", &E::TYPE_ID)
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}
