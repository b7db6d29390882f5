//! Storage Trait
//!
//! `TigerStyle`: Abstract interface for entity storage.
//!
//! # Simulation-First
//!
//! Every implementation, [`SimStorage`](super::SimStorage) and
//! [`RelationalStorage`](super::RelationalStorage) alike, satisfies the same
//! contract and runs the same query semantics.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use relstore_core::constants::QUERY_BOUND_UNBOUNDED;

use super::error::{CollapseExt, StorageResult};
use super::expr::{Order, Predicate};
use super::model::Entity;
use crate::context::Context;
use crate::decorator::{Decorated, Interceptor};

// =============================================================================
// Storage
// =============================================================================

/// Typed storage for one entity type.
///
/// `TigerStyle`: All operations are async, return explicit errors.
/// `Ok(None)` means "not found" and is never used to report a failure.
#[async_trait]
pub trait Storage<E: Entity>: Send + Sync {
    /// Insert or update, keyed by identity. Returns the persisted entity.
    async fn put(&self, ctx: &Context, entity: &E) -> StorageResult<E>;

    /// Look up by identity.
    async fn find(&self, ctx: &Context, id: &E::Id) -> StorageResult<Option<E>>;

    /// Delete the row keyed by `entity`'s identity.
    ///
    /// Returns the entity if a row was deleted.
    async fn remove(&self, ctx: &Context, entity: &E) -> StorageResult<Option<E>>;

    /// Delete every row matching `query`. Returns the number deleted.
    ///
    /// The order only matters when the query is bounded by skip or limit.
    async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<u64>;

    /// Deliver every row matching `query` to `sink`, in query order.
    ///
    /// Nothing reaches the sink if the operation fails.
    async fn select(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink<E> + Send),
        query: &Query<'_>,
    ) -> StorageResult<()>;
}

#[async_trait]
impl<E: Entity, S: Storage<E> + ?Sized> Storage<E> for Arc<S> {
    async fn put(&self, ctx: &Context, entity: &E) -> StorageResult<E> {
        (**self).put(ctx, entity).await
    }

    async fn find(&self, ctx: &Context, id: &E::Id) -> StorageResult<Option<E>> {
        (**self).find(ctx, id).await
    }

    async fn remove(&self, ctx: &Context, entity: &E) -> StorageResult<Option<E>> {
        (**self).remove(ctx, entity).await
    }

    async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<u64> {
        (**self).remove_all(ctx, query).await
    }

    async fn select(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink<E> + Send),
        query: &Query<'_>,
    ) -> StorageResult<()> {
        (**self).select(ctx, sink, query).await
    }
}

// =============================================================================
// Query
// =============================================================================

/// Selection criteria: predicate, order and paging bounds.
///
/// Skip and limit follow the wire convention: values `<= 0` or
/// `>= QUERY_BOUND_UNBOUNDED` mean "unbounded".
#[derive(Clone, Copy, Default)]
pub struct Query<'a> {
    skip: i64,
    limit: i64,
    order: Option<&'a dyn Order>,
    predicate: Option<&'a dyn Predicate>,
}

fn bound(n: i64) -> Option<u64> {
    if n <= 0 || n >= QUERY_BOUND_UNBOUNDED {
        None
    } else {
        u64::try_from(n).ok()
    }
}

impl<'a> Query<'a> {
    /// Every row, in storage order.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Skip the first `skip` rows.
    #[must_use]
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    /// Return at most `limit` rows.
    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Sort rows.
    #[must_use]
    pub fn with_order(mut self, order: &'a dyn Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Keep only matching rows.
    #[must_use]
    pub fn with_predicate(mut self, predicate: &'a dyn Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Normalized skip; `None` when unbounded.
    #[must_use]
    pub fn skip(&self) -> Option<u64> {
        bound(self.skip)
    }

    /// Normalized limit; `None` when unbounded.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        bound(self.limit)
    }

    /// True if skip or limit restricts the result.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.skip().is_some() || self.limit().is_some()
    }

    /// The ordering, if any.
    #[must_use]
    pub fn order(&self) -> Option<&'a dyn Order> {
        self.order
    }

    /// The predicate, if any.
    #[must_use]
    pub fn predicate(&self) -> Option<&'a dyn Predicate> {
        self.predicate
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("skip", &self.skip())
            .field("limit", &self.limit())
            .field("order", &self.order)
            .field("predicate", &self.predicate)
            .finish()
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives selected entities one at a time.
pub trait Sink<E> {
    /// Accept the next entity.
    fn put(&mut self, entity: E);
}

impl<E> Sink<E> for Vec<E> {
    fn put(&mut self, entity: E) {
        self.push(entity);
    }
}

/// Counts entities without keeping them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountSink {
    count: u64,
}

impl CountSink {
    /// Entities received so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<E> Sink<E> for CountSink {
    fn put(&mut self, _entity: E) {
        self.count += 1;
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<E, F: FnMut(E)> Sink<E> for FnSink<F> {
    fn put(&mut self, entity: E) {
        (self.0)(entity);
    }
}

// =============================================================================
// Extensions
// =============================================================================

/// Conveniences available on every storage.
#[async_trait]
pub trait StorageExt<E: Entity>: Storage<E> {
    /// Select into an owned sink and hand it back.
    async fn select_into<S>(&self, ctx: &Context, mut sink: S, query: &Query<'_>) -> StorageResult<S>
    where
        S: Sink<E> + Send,
    {
        self.select(ctx, &mut sink, query).await?;
        Ok(sink)
    }

    /// Select every matching entity into a `Vec`.
    async fn select_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<Vec<E>> {
        self.select_into(ctx, Vec::new(), query).await
    }

    /// Wrap this storage in a decorator.
    fn decorate<I>(self, interceptor: I) -> Decorated<E, I>
    where
        Self: Sized + 'static,
        I: Interceptor<E>,
    {
        Decorated::new(Arc::new(self), interceptor)
    }
}

impl<E: Entity, T: Storage<E> + ?Sized> StorageExt<E> for T {}

// =============================================================================
// FailSoft
// =============================================================================

/// Compatibility adapter where every failure reads as "absent".
///
/// Errors are logged at warn and dropped, so a failed `find` and a missing
/// row look the same. Prefer the underlying `Storage` when the difference
/// matters.
#[derive(Clone)]
pub struct FailSoft<E: Entity> {
    inner: Arc<dyn Storage<E>>,
}

impl<E: Entity> FailSoft<E> {
    /// Wrap a storage.
    #[must_use]
    pub fn new(inner: Arc<dyn Storage<E>>) -> Self {
        Self { inner }
    }

    /// `put`, or `None` on failure.
    pub async fn put(&self, ctx: &Context, entity: &E) -> Option<E> {
        self.inner.put(ctx, entity).await.collapse()
    }

    /// `find`, or `None` when missing or on failure.
    pub async fn find(&self, ctx: &Context, id: &E::Id) -> Option<E> {
        self.inner.find(ctx, id).await.collapse().flatten()
    }

    /// `remove`, or `None` when nothing was deleted or on failure.
    pub async fn remove(&self, ctx: &Context, entity: &E) -> Option<E> {
        self.inner.remove(ctx, entity).await.collapse().flatten()
    }

    /// `remove_all`, or `None` on failure.
    pub async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> Option<u64> {
        self.inner.remove_all(ctx, query).await.collapse()
    }

    /// `select` into `sink`, or `None` on failure.
    pub async fn select_into<S>(&self, ctx: &Context, sink: S, query: &Query<'_>) -> Option<S>
    where
        S: Sink<E> + Send,
    {
        self.inner.select_into(ctx, sink, query).await.collapse()
    }
}

impl<E: Entity> fmt::Debug for FailSoft<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailSoft")
            .field("type_id", &E::TYPE_ID)
            .finish_non_exhaustive()
    }
}
