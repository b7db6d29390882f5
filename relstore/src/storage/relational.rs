//! `RelationalStorage` - SQL Storage Engine
//!
//! `TigerStyle`: Real database storage through `sqlx::Any`, explicit schema,
//! proper error handling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RelationalStorage<E>                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Source: ConnectionSource (AnyPool, or a faulty wrapper)     │
//! │  Model:  EntityModel<E> (identity column first)              │
//! │  Cached: upsert text, select prefix                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema
//!
//! One table per entity type, named by the lowercased type id:
//!
//! ```sql
//! CREATE TABLE "account" (
//!     "id" BIGINT PRIMARY KEY,
//!     "owner" VARCHAR(64),
//!     "balance" BIGINT
//! )
//! ```
//!
//! Statements are compiled then bound: text with placeholders first, values
//! second, in the same order. No value is ever spliced into the text.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::AnyPool;
use sqlx::pool::PoolConnection;
use sqlx::{Any, Row, ValueRef};

use relstore_core::dst::FaultInjector;

use super::backend::{Query, Sink, Storage};
use super::error::{StorageError, StorageResult};
use super::model::{Entity, EntityModel, Property};
use super::sql::{Dialect, Params, SqlBuilder};
use super::value::{ColumnKind, SqlValue};
use crate::config::StoreConfig;
use crate::context::Context;

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

// =============================================================================
// ConnectionSource
// =============================================================================

/// Where the engine gets its connections.
///
/// Each operation acquires exactly one connection and returns it to the
/// source when the connection is dropped.
#[async_trait]
pub trait ConnectionSource: Send + Sync + fmt::Debug {
    /// Acquire a connection.
    ///
    /// # Errors
    /// Returns `StorageError::Resource` if no connection can be obtained.
    async fn acquire(&self) -> StorageResult<PoolConnection<Any>>;

    /// Called with the operation name after acquiring, before the statement
    /// runs. Sources that fail on demand hook in here.
    ///
    /// # Errors
    /// Returns `StorageError::Resource` if the statement must not run.
    fn before_statement(&self, _operation: &str) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ConnectionSource for AnyPool {
    async fn acquire(&self) -> StorageResult<PoolConnection<Any>> {
        sqlx::Pool::<Any>::acquire(self)
            .await
            .map_err(|e| StorageError::resource(format!("failed to acquire connection: {e}")))
    }
}

#[async_trait]
impl<S: ConnectionSource + ?Sized> ConnectionSource for Arc<S> {
    async fn acquire(&self) -> StorageResult<PoolConnection<Any>> {
        (**self).acquire().await
    }

    fn before_statement(&self, operation: &str) -> StorageResult<()> {
        (**self).before_statement(operation)
    }
}

/// A connection source that fails on demand.
///
/// Consults the injector with `"acquire"` before every acquisition and with
/// `"execute:<operation>"` (e.g. `"execute:put"`) before every statement. An
/// injected fault surfaces as `StorageError::Resource`.
#[derive(Debug)]
pub struct FaultyConnections<S> {
    inner: S,
    faults: Arc<FaultInjector>,
}

impl<S: ConnectionSource> FaultyConnections<S> {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: S, faults: Arc<FaultInjector>) -> Self {
        Self { inner, faults }
    }

    /// The injector, for inspection.
    #[must_use]
    pub fn faults(&self) -> &Arc<FaultInjector> {
        &self.faults
    }
}

#[async_trait]
impl<S: ConnectionSource> ConnectionSource for FaultyConnections<S> {
    async fn acquire(&self) -> StorageResult<PoolConnection<Any>> {
        if let Some(fault) = self.faults.should_inject("acquire") {
            return Err(StorageError::resource(format!(
                "injected {fault} while acquiring connection"
            )));
        }
        self.inner.acquire().await
    }

    fn before_statement(&self, operation: &str) -> StorageResult<()> {
        self.inner.before_statement(operation)?;
        let site = format!("execute:{operation}");
        if let Some(fault) = self.faults.should_inject(&site) {
            return Err(StorageError::resource(format!(
                "injected {fault} while executing {operation}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// RelationalStorage
// =============================================================================

/// Storage for `E` in one SQL table.
pub struct RelationalStorage<E: Entity> {
    source: Arc<dyn ConnectionSource>,
    dialect: Dialect,
    model: Arc<EntityModel<E>>,
    /// `INSERT ... ON CONFLICT/DUPLICATE ...`, built once
    upsert_sql: Arc<str>,
    /// `SELECT * FROM <table>`, built once
    select_sql: Arc<str>,
}

impl<E: Entity> RelationalStorage<E> {
    /// Build an engine and make sure its table exists.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` if the config or entity model
    /// is invalid or the table cannot be materialized, including when no
    /// connection can be acquired for it.
    #[tracing::instrument(skip_all, fields(type_id = E::TYPE_ID))]
    pub async fn new(
        source: impl ConnectionSource + 'static,
        config: &StoreConfig,
    ) -> StorageResult<Self> {
        let dialect = config
            .dialect()
            .map_err(|e| StorageError::initialization(e.to_string()))?;
        let model = EntityModel::<E>::resolve_with_prefix(&config.table_prefix)?;

        let storage = Self {
            source: Arc::new(source),
            dialect,
            upsert_sql: upsert_sql(dialect, &model).into(),
            select_sql: select_sql(dialect, &model).into(),
            model: Arc::new(model),
        };
        storage.materialize().await.map_err(|e| match e {
            StorageError::Initialization { .. } => e,
            other => StorageError::initialization(format!(
                "cannot materialize table {}: {other}",
                storage.model.table()
            )),
        })?;
        Ok(storage)
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        self.model.table()
    }

    /// Dialect statements are written in.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The resolved entity model.
    #[must_use]
    pub fn model(&self) -> &EntityModel<E> {
        &self.model
    }

    /// The cached upsert statement.
    #[must_use]
    pub fn upsert_sql(&self) -> &str {
        &self.upsert_sql
    }

    // =========================================================================
    // Schema
    // =========================================================================

    async fn materialize(&self) -> StorageResult<()> {
        let table = self.model.table();
        let mut conn = self.source.acquire().await?;
        self.source.before_statement("materialize")?;

        let existing = sqlx::query::<Any>(self.dialect.table_exists_sql())
            .bind(table.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                StorageError::initialization(format!("catalog lookup for {table} failed: {e}"))
            })?;
        if existing.is_some() {
            tracing::debug!(table, "table exists");
            return Ok(());
        }

        let create = create_table_sql(self.dialect, &self.model);
        match sqlx::query::<Any>(&create).execute(&mut *conn).await {
            Ok(_) => {
                tracing::info!(table, "created table");
                Ok(())
            }
            Err(e) if self.is_duplicate_object(&e) => {
                tracing::debug!(table, error = %e, "table created concurrently");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(table, error = %e, "failed to create table");
                Err(StorageError::initialization(format!(
                    "failed to create table {table}: {e}"
                )))
            }
        }
    }

    fn is_duplicate_object(&self, error: &sqlx::Error) -> bool {
        let code = error.as_database_error().and_then(|db| db.code());
        self.dialect
            .is_duplicate_object(code.as_deref(), &error.to_string())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.dialect)
    }

    fn push_where_key(&self, sql: &mut SqlBuilder) {
        sql.push(" WHERE ");
        self.model.primary_key().column_sql(sql);
        sql.push(" = ").push_placeholder();
    }

    /// Values for the cached upsert: every column, then the update columns.
    fn upsert_params(&self, entity: &E) -> Params {
        let mut params = Params::new();
        self.model.bind_key(&mut params, entity);
        for property in self.model.non_key_columns() {
            property.bind_value(&mut params, entity);
        }
        for property in update_columns(&self.model) {
            property.bind_value(&mut params, entity);
        }

        // Postcondition
        assert_eq!(
            params.len(),
            self.model.columns().len() + update_columns(&self.model).len(),
            "one value per upsert placeholder"
        );
        params
    }

    /// ` WHERE p ORDER BY o LIMIT n OFFSET m`, each part only when present.
    fn push_query_tail(&self, sql: &mut SqlBuilder, params: &mut Params, query: &Query<'_>) {
        if let Some(predicate) = query.predicate() {
            sql.push(" WHERE ");
            predicate.compile_sql(sql);
            predicate.bind_literals(params);
        }
        if let Some(order) = query.order() {
            sql.push(" ORDER BY ");
            order.compile_sql(sql);
        }
        match (query.limit(), query.skip()) {
            (Some(limit), _) => {
                sql.push(" LIMIT ").push_u64(limit);
            }
            (None, Some(_)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    sql.push(" LIMIT ").push(unbounded);
                }
            }
            (None, None) => {}
        }
        if let Some(skip) = query.skip() {
            sql.push(" OFFSET ").push_u64(skip);
        }
    }

    fn select_statement(&self, query: &Query<'_>) -> (String, Params) {
        let mut sql = SqlBuilder::new(self.dialect);
        sql.push(&self.select_sql);
        let mut params = Params::new();
        self.push_query_tail(&mut sql, &mut params, query);
        (sql.finish(), params)
    }

    fn remove_all_statement(&self, query: &Query<'_>) -> (String, Params) {
        let key = self.model.primary_key();
        let mut sql = self.builder();
        let mut params = Params::new();

        sql.push("DELETE FROM ").push_ident(self.model.table());
        if query.is_bounded() {
            sql.push(" WHERE ");
            key.column_sql(&mut sql);
            sql.push(" IN (SELECT ");
            key.column_sql(&mut sql);
            sql.push(" FROM (SELECT ");
            key.column_sql(&mut sql);
            sql.push(" FROM ").push_ident(self.model.table());
            self.push_query_tail(&mut sql, &mut params, query);
            sql.push(") AS doomed)");
        } else if let Some(predicate) = query.predicate() {
            sql.push(" WHERE ");
            predicate.compile_sql(&mut sql);
            predicate.bind_literals(&mut params);
        }
        (sql.finish(), params)
    }

    // =========================================================================
    // Row mapping
    // =========================================================================

    /// Walk the column list in step with the row's columns.
    ///
    /// A row with fewer columns than the model fills only the leading
    /// properties; the rest keep their zero values.
    fn map_row(&self, row: &AnyRow) -> StorageResult<E> {
        let mut entity = E::new_zero();
        let available = row.len();
        for (i, property) in self.model.columns().iter().enumerate() {
            if i >= available {
                break;
            }
            let value = decode_column(row, i, property)?;
            property.apply(&mut entity, value)?;
        }
        Ok(entity)
    }

    fn fail(&self, operation: &'static str, error: StorageError) -> StorageError {
        tracing::warn!(table = self.model.table(), operation, %error, "storage operation failed");
        error
    }
}

impl<E: Entity> fmt::Debug for RelationalStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalStorage")
            .field("table", &self.model.table())
            .field("dialect", &self.dialect)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: Entity> Storage<E> for RelationalStorage<E> {
    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn put(&self, ctx: &Context, entity: &E) -> StorageResult<E> {
        let result = async {
            let params = self.upsert_params(entity);
            let mut conn = self.source.acquire().await?;
            self.source.before_statement("put")?;
            let query = bind_params(sqlx::query::<Any>(&self.upsert_sql), params);

            let done = query
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::write(format!("upsert failed: {e}")))?;
            if done.rows_affected() == 0 {
                return Err(StorageError::write("upsert affected zero rows"));
            }
            Ok::<_, StorageError>(entity.clone())
        }
        .await;
        result.map_err(|e| self.fail("put", e))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn find(&self, ctx: &Context, id: &E::Id) -> StorageResult<Option<E>> {
        let result = async {
            let mut sql = self.builder();
            sql.push(&self.select_sql);
            self.push_where_key(&mut sql);
            sql.push(" LIMIT 1");
            let sql = sql.finish();

            let mut params = Params::new();
            params.bind_as(id.clone().into(), self.model.primary_key().kind());
            let mut conn = self.source.acquire().await?;
            self.source.before_statement("find")?;
            let row = bind_params(sqlx::query::<Any>(&sql), params)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| StorageError::read(format!("find failed: {e}")))?;
            row.map(|row| self.map_row(&row)).transpose()
        }
        .await;
        result.map_err(|e| self.fail("find", e))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn remove(&self, ctx: &Context, entity: &E) -> StorageResult<Option<E>> {
        let result = async {
            let mut sql = self.builder();
            sql.push("DELETE FROM ").push_ident(self.model.table());
            self.push_where_key(&mut sql);
            let sql = sql.finish();

            let mut params = Params::new();
            self.model.bind_key(&mut params, entity);
            let mut conn = self.source.acquire().await?;
            self.source.before_statement("remove")?;
            let done = bind_params(sqlx::query::<Any>(&sql), params)
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::write(format!("delete failed: {e}")))?;
            Ok::<_, StorageError>((done.rows_affected() > 0).then(|| entity.clone()))
        }
        .await;
        result.map_err(|e| self.fail("remove", e))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn remove_all(&self, ctx: &Context, query: &Query<'_>) -> StorageResult<u64> {
        let result = async {
            let (sql, params) = self.remove_all_statement(query);
            let mut conn = self.source.acquire().await?;
            self.source.before_statement("remove_all")?;
            let done = bind_params(sqlx::query::<Any>(&sql), params)
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::write(format!("bulk delete failed: {e}")))?;
            Ok::<_, StorageError>(done.rows_affected())
        }
        .await;
        result.map_err(|e| self.fail("remove_all", e))
    }

    #[tracing::instrument(skip_all, fields(table = %self.model.table(), request_id = %ctx.request_id()))]
    async fn select(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink<E> + Send),
        query: &Query<'_>,
    ) -> StorageResult<()> {
        let result = async {
            let (sql, params) = self.select_statement(query);
            let mut conn = self.source.acquire().await?;
            self.source.before_statement("select")?;
            let rows = bind_params(sqlx::query::<Any>(&sql), params)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| StorageError::read(format!("select failed: {e}")))?;
            drop(conn);

            rows.iter()
                .map(|row| self.map_row(row))
                .collect::<StorageResult<Vec<E>>>()
        }
        .await;

        let entities = result.map_err(|e| self.fail("select", e))?;
        tracing::debug!(rows = entities.len(), "selected");
        for entity in entities {
            sink.put(entity);
        }
        Ok(())
    }
}

// =============================================================================
// Static statement text
// =============================================================================

/// Columns the upsert's update clause assigns: every non-identity column,
/// or the identity itself when there is nothing else.
fn update_columns<E>(model: &EntityModel<E>) -> &[Property<E>] {
    if model.non_key_columns().is_empty() {
        &model.columns()[..1]
    } else {
        model.non_key_columns()
    }
}

fn upsert_sql<E>(dialect: Dialect, model: &EntityModel<E>) -> String {
    let mut sql = SqlBuilder::new(dialect);
    sql.push("INSERT INTO ").push_ident(model.table()).push(" (");
    sql.push_list(model.columns(), |sql, p| p.column_sql(sql));
    sql.push(") VALUES (");
    sql.push_list(model.columns(), |sql, _| {
        sql.push_placeholder();
    });
    sql.push(")");

    match dialect {
        Dialect::MySql => {
            sql.push(" ON DUPLICATE KEY UPDATE ");
        }
        Dialect::Sqlite | Dialect::Postgres => {
            sql.push(" ON CONFLICT (");
            model.primary_key().column_sql(&mut sql);
            sql.push(") DO UPDATE SET ");
        }
    }
    sql.push_list(update_columns(model), |sql, p| {
        p.column_sql(sql);
        sql.push(" = ").push_placeholder();
    });

    // Postcondition
    assert_eq!(
        sql.placeholders(),
        model.columns().len() + update_columns(model).len(),
        "one placeholder per bound value"
    );
    sql.finish()
}

fn select_sql<E>(dialect: Dialect, model: &EntityModel<E>) -> String {
    let mut sql = SqlBuilder::new(dialect);
    sql.push("SELECT * FROM ").push_ident(model.table());
    sql.finish()
}

fn create_table_sql<E>(dialect: Dialect, model: &EntityModel<E>) -> String {
    let mut sql = SqlBuilder::new(dialect);
    sql.push("CREATE TABLE ").push_ident(model.table()).push(" (");
    sql.push_list(model.columns(), |sql, p| {
        p.column_sql(sql);
        sql.push(" ").push(p.sql_type());
        if p.is_primary_key() {
            sql.push(" PRIMARY KEY");
        }
    });
    sql.push(")");
    sql.finish()
}

// =============================================================================
// Binding and decoding
// =============================================================================

fn bind_params(mut query: AnyQuery<'_>, params: Params) -> AnyQuery<'_> {
    for (value, kind) in params.into_typed() {
        query = bind_value(query, value, kind);
    }
    query
}

/// Bind one value; NULL is typed after the target column's kind.
fn bind_value(query: AnyQuery<'_>, value: SqlValue, null_kind: ColumnKind) -> AnyQuery<'_> {
    match value {
        SqlValue::Null => match null_kind {
            ColumnKind::Bool => query.bind(None::<bool>),
            ColumnKind::Int => query.bind(None::<i64>),
            ColumnKind::Real => query.bind(None::<f64>),
            ColumnKind::Text => query.bind(None::<String>),
            ColumnKind::Blob => query.bind(None::<Vec<u8>>),
        },
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Real(r) => query.bind(r),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

/// Decode column `index` as `property`'s kind.
///
/// Drivers disagree on the wire type behind a declared SQL type (SQLite
/// returns BOOLEAN as an integer, Postgres INTEGER as 32 bits), so each kind
/// tries its natural Rust type first and falls back to close relatives.
#[allow(clippy::cast_precision_loss)]
fn decode_column<E>(row: &AnyRow, index: usize, property: &Property<E>) -> StorageResult<SqlValue> {
    let column = property.name();
    let raw = row
        .try_get_raw(index)
        .map_err(|e| StorageError::mapping(column, e.to_string()))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match property.kind() {
        ColumnKind::Bool => row
            .try_get::<bool, _>(index)
            .map(SqlValue::Bool)
            .or_else(|_| row.try_get::<i64, _>(index).map(|i| SqlValue::Bool(i != 0)))
            .or_else(|_| row.try_get::<i32, _>(index).map(|i| SqlValue::Bool(i != 0))),
        ColumnKind::Int => row
            .try_get::<i64, _>(index)
            .or_else(|_| row.try_get::<i32, _>(index).map(i64::from))
            .or_else(|_| row.try_get::<i16, _>(index).map(i64::from))
            .map(SqlValue::Int),
        ColumnKind::Real => row
            .try_get::<f64, _>(index)
            .or_else(|_| row.try_get::<f32, _>(index).map(f64::from))
            .or_else(|_| row.try_get::<i64, _>(index).map(|i| i as f64))
            .map(SqlValue::Real),
        ColumnKind::Text => row.try_get::<String, _>(index).map(SqlValue::Text),
        ColumnKind::Blob => row
            .try_get::<Vec<u8>, _>(index)
            .or_else(|_| row.try_get::<String, _>(index).map(String::into_bytes))
            .map(SqlValue::Blob),
    };
    value.map_err(|e| StorageError::mapping(column, e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::StorageExt;
    use crate::storage::expr::{asc, desc, eq, gt, PredicateExt};
    use crate::storage::test_support::{account, Account};
    use relstore_core::dst::{DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType};

    async fn memory_pool() -> AnyPool {
        StoreConfig::sqlite_memory().connect().await.unwrap()
    }

    async fn engine() -> RelationalStorage<Account> {
        RelationalStorage::new(memory_pool().await, &StoreConfig::sqlite_memory())
            .await
            .unwrap()
    }

    // =========================================================================
    // Statement text
    // =========================================================================

    #[test]
    fn test_upsert_sql_per_dialect() {
        let model = EntityModel::<Account>::resolve().unwrap();

        assert_eq!(
            upsert_sql(Dialect::Sqlite, &model),
            r#"INSERT INTO "account" ("id", "owner", "balance") VALUES (?, ?, ?) ON CONFLICT ("id") DO UPDATE SET "owner" = ?, "balance" = ?"#
        );
        assert_eq!(
            upsert_sql(Dialect::Postgres, &model),
            r#"INSERT INTO "account" ("id", "owner", "balance") VALUES ($1, $2, $3) ON CONFLICT ("id") DO UPDATE SET "owner" = $4, "balance" = $5"#
        );
        assert_eq!(
            upsert_sql(Dialect::MySql, &model),
            "INSERT INTO `account` (`id`, `owner`, `balance`) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE `owner` = ?, `balance` = ?"
        );
    }

    #[test]
    fn test_create_table_sql_key_first() {
        let model = EntityModel::<Account>::resolve_with_prefix("app_").unwrap();
        assert_eq!(
            create_table_sql(Dialect::Postgres, &model),
            r#"CREATE TABLE "app_account" ("id" BIGINT PRIMARY KEY, "owner" VARCHAR(64), "balance" BIGINT)"#
        );
    }

    #[tokio::test]
    async fn test_select_statement_tail() {
        let storage = engine().await;
        let filter = eq("owner", "alice").and(gt("balance", 5_i64));
        let order = desc("balance");

        let (sql, params) = storage.select_statement(
            &Query::all()
                .with_predicate(&filter)
                .with_order(&order)
                .with_skip(3)
                .with_limit(3),
        );
        assert_eq!(
            sql,
            r#"SELECT * FROM "account" WHERE ("owner" = ?) AND ("balance" > ?) ORDER BY "balance" DESC LIMIT 3 OFFSET 3"#
        );
        assert_eq!(params.len(), 2);

        let (sql, _) = storage.select_statement(&Query::all().with_skip(2));
        assert_eq!(sql, r#"SELECT * FROM "account" LIMIT -1 OFFSET 2"#);

        let (sql, params) = storage.select_statement(&Query::all());
        assert_eq!(sql, r#"SELECT * FROM "account""#);
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_statement_shapes() {
        let storage = engine().await;
        let filter = eq("owner", "x");
        let order = asc("id");

        let (sql, params) = storage.remove_all_statement(&Query::all().with_predicate(&filter));
        assert_eq!(sql, r#"DELETE FROM "account" WHERE "owner" = ?"#);
        assert_eq!(params.len(), 1);

        let (sql, _) = storage.remove_all_statement(&Query::all().with_order(&order).with_limit(2));
        assert_eq!(
            sql,
            r#"DELETE FROM "account" WHERE "id" IN (SELECT "id" FROM (SELECT "id" FROM "account" ORDER BY "id" ASC LIMIT 2) AS doomed)"#
        );
    }

    // =========================================================================
    // Engine behaviour
    // =========================================================================

    #[tokio::test]
    async fn test_put_find_remove() {
        let storage = engine().await;
        let ctx = Context::new();

        let saved = storage.put(&ctx, &account(1, "alice", 100)).await.unwrap();
        assert_eq!(saved, account(1, "alice", 100));
        assert_eq!(storage.find(&ctx, &1).await.unwrap(), Some(saved.clone()));
        assert_eq!(storage.find(&ctx, &2).await.unwrap(), None);

        assert_eq!(storage.remove(&ctx, &saved).await.unwrap(), Some(saved.clone()));
        assert_eq!(storage.remove(&ctx, &saved).await.unwrap(), None);
        assert_eq!(storage.find(&ctx, &1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bounded_remove_all_respects_order() {
        let storage = engine().await;
        let ctx = Context::new();
        for i in 1..=5 {
            storage.put(&ctx, &account(i, "o", i)).await.unwrap();
        }
        let order = desc("balance");

        let deleted = storage
            .remove_all(&ctx, &Query::all().with_order(&order).with_limit(2))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let left = storage.select_all(&ctx, &Query::all().with_order(&asc("id"))).await.unwrap();
        let ids: Vec<i64> = left.iter().map(|a| a.id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_materialization_is_an_initialization_error() {
        let pool = memory_pool().await;
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_fault(
                FaultConfig::new(FaultType::DbPoolExhausted, 1.0)
                    .with_filter("acquire")
                    .with_max_injections(1),
            )
            .build();
        let source = FaultyConnections::new(pool, Arc::new(faults));

        // The first acquisition (table materialization) is the one that fails.
        let err = RelationalStorage::<Account>::new(source, &StoreConfig::sqlite_memory())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Initialization { .. }), "{err:?}");
        assert!(err.to_string().contains("db_pool_exhausted"), "{err}");
    }

    #[tokio::test]
    async fn test_statement_fault_surfaces_resource_error() {
        let faults = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(42))
                .with_fault(
                    FaultConfig::new(FaultType::DbQueryTimeout, 1.0).with_filter("execute:put"),
                )
                .build(),
        );
        let source = FaultyConnections::new(memory_pool().await, Arc::clone(&faults));
        let storage = RelationalStorage::<Account>::new(source, &StoreConfig::sqlite_memory())
            .await
            .unwrap();
        let ctx = Context::new();

        let err = storage.put(&ctx, &account(1, "alice", 10)).await.unwrap_err();
        assert!(matches!(err, StorageError::Resource { .. }), "{err:?}");
        assert!(err.is_transient());
        assert!(err.to_string().contains("db_query_timeout"), "{err}");

        // Other statements are unaffected.
        assert!(storage.find(&ctx, &1).await.unwrap().is_none());
        assert_eq!(faults.total_injections(), 1);
    }

    #[tokio::test]
    async fn test_key_and_upsert_values_bind_with_column_kinds() {
        let storage = engine().await;
        let mut params = Params::new();
        storage.model().bind_key(&mut params, &account(3, "carol", 0));
        assert_eq!(params.kinds(), &[ColumnKind::Int]);
        assert_eq!(storage.upsert_params(&account(3, "carol", 0)).len(), 5);
    }
}
