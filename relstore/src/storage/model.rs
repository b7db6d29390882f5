//! Entity Model
//!
//! Entities declare their persisted fields explicitly: an ordered list of
//! [`Property`] descriptors built by `Entity::properties()`. An engine resolves
//! that list once into an [`EntityModel`], the immutable persisted column list
//! every statement builder and the row mapper share.
//!
//! # Example
//!
//! ```rust
//! use relstore::storage::{Entity, Property};
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
//! ```

use std::collections::HashSet;
use std::fmt;

use relstore_core::constants::SQL_COLUMNS_COUNT_MAX;

use super::error::{StorageError, StorageResult};
use super::expr::Columns;
use super::sql::{is_valid_identifier, Params, SqlBuilder};
use super::value::{ColumnKind, SqlValue};

// =============================================================================
// Entity
// =============================================================================

/// An application record type persisted by a [`Storage`](super::Storage).
pub trait Entity: Clone + Send + Sync + fmt::Debug + 'static {
    /// Identity ("primary key") value type.
    type Id: Clone + Send + Sync + fmt::Debug + Into<SqlValue>;

    /// Stable type name; the table is named after it, lowercased.
    const TYPE_ID: &'static str;

    /// This entity's identity. Must equal the primary-key property's value;
    /// engines key rows on it.
    fn id(&self) -> Self::Id;

    /// A blank instance that row mapping fills column by column.
    fn new_zero() -> Self;

    /// Ordered property declarations. Exactly one persisted property must be
    /// marked `primary_key()`.
    fn properties() -> Vec<Property<Self>>;
}

// =============================================================================
// Property
// =============================================================================

/// Reads a field as a column value.
pub type Getter<E> = fn(&E) -> SqlValue;

/// Writes a column value into a field.
pub type Setter<E> = fn(&mut E, SqlValue) -> StorageResult<()>;

/// Immutable metadata and accessors for one entity field.
pub struct Property<E> {
    name: &'static str,
    sql_type: &'static str,
    kind: ColumnKind,
    transient: bool,
    primary_key: bool,
    get: Getter<E>,
    set: Setter<E>,
}

impl<E> Property<E> {
    /// Declare a property. An empty `sql_type` means "not persisted".
    #[must_use]
    pub fn new(name: &'static str, sql_type: &'static str, get: Getter<E>, set: Setter<E>) -> Self {
        Self {
            name,
            sql_type,
            kind: ColumnKind::from_sql_type(sql_type),
            transient: false,
            primary_key: false,
            get,
            set,
        }
    }

    /// Mark as the identity column.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Exclude from storage.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Property (and column) name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared SQL type; empty when not persisted.
    #[must_use]
    pub fn sql_type(&self) -> &'static str {
        self.sql_type
    }

    /// Storage class derived from the SQL type.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// True if excluded from storage.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// True for the identity column.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Stored as a column: not transient and has a SQL type.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.transient && !self.sql_type.trim().is_empty()
    }

    /// Current value of this field.
    pub fn read(&self, entity: &E) -> SqlValue {
        (self.get)(entity)
    }

    /// Store `value` into this field. Mapping errors name this column.
    ///
    /// # Errors
    /// Returns `StorageError::Mapping` if the value has the wrong type.
    pub fn apply(&self, entity: &mut E, value: SqlValue) -> StorageResult<()> {
        (self.set)(entity, value).map_err(|error| match error {
            StorageError::Mapping { message, .. } => StorageError::mapping(self.name, message),
            other => other,
        })
    }

    /// Write this property's column reference.
    pub fn column_sql(&self, sql: &mut SqlBuilder) {
        sql.push_ident(self.name);
    }

    /// Bind this field's value as the next parameter, NULL typed after
    /// this column's kind.
    pub fn bind_value(&self, params: &mut Params, entity: &E) -> usize {
        params.bind_as(self.read(entity), self.kind)
    }
}

impl<E> Clone for Property<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sql_type: self.sql_type,
            kind: self.kind,
            transient: self.transient,
            primary_key: self.primary_key,
            get: self.get,
            set: self.set,
        }
    }
}

impl<E> fmt::Debug for Property<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("sql_type", &self.sql_type)
            .field("transient", &self.transient)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// EntityModel
// =============================================================================

/// The persisted column list of an entity type, resolved once.
///
/// Invariant: the identity column is first, the remaining persisted columns
/// follow in declaration order. Table layout, INSERT column lists, positional
/// binding and positional row mapping all use this one order.
pub struct EntityModel<E> {
    table: String,
    columns: Vec<Property<E>>,
}

impl<E: Entity> EntityModel<E> {
    /// Resolve the model with the table named after `E::TYPE_ID`.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` if the declaration is invalid.
    pub fn resolve() -> StorageResult<Self> {
        Self::resolve_with_prefix("")
    }

    /// Resolve the model, prefixing the table name.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` if there is not exactly one
    /// persisted primary key, a name is not a plain identifier, a name
    /// repeats, or there are more than `SQL_COLUMNS_COUNT_MAX` columns.
    pub fn resolve_with_prefix(prefix: &str) -> StorageResult<Self> {
        let table = format!("{prefix}{}", E::TYPE_ID.to_ascii_lowercase());
        if !is_valid_identifier(&table) {
            return Err(StorageError::initialization(format!(
                "{}: table name {table:?} is not a valid identifier",
                E::TYPE_ID
            )));
        }

        let mut key = None;
        let mut rest = Vec::new();
        let mut seen = HashSet::new();
        for property in E::properties() {
            if property.is_primary_key() && property.is_transient() {
                return Err(StorageError::initialization(format!(
                    "{}: primary key {} cannot be transient",
                    E::TYPE_ID,
                    property.name()
                )));
            }
            if !property.is_persisted() {
                continue;
            }
            if !is_valid_identifier(property.name()) {
                return Err(StorageError::initialization(format!(
                    "{}: column name {:?} is not a valid identifier",
                    E::TYPE_ID,
                    property.name()
                )));
            }
            if !seen.insert(property.name().to_ascii_lowercase()) {
                return Err(StorageError::initialization(format!(
                    "{}: duplicate column {}",
                    E::TYPE_ID,
                    property.name()
                )));
            }
            if property.is_primary_key() {
                if key.is_some() {
                    return Err(StorageError::initialization(format!(
                        "{}: more than one primary key",
                        E::TYPE_ID
                    )));
                }
                key = Some(property);
            } else {
                rest.push(property);
            }
        }

        let Some(key) = key else {
            return Err(StorageError::initialization(format!(
                "{}: no persisted primary key",
                E::TYPE_ID
            )));
        };

        let mut columns = Vec::with_capacity(rest.len() + 1);
        columns.push(key);
        columns.extend(rest);

        if columns.len() > SQL_COLUMNS_COUNT_MAX {
            return Err(StorageError::initialization(format!(
                "{}: {} columns exceeds {SQL_COLUMNS_COUNT_MAX}",
                E::TYPE_ID,
                columns.len()
            )));
        }

        // Postcondition
        assert!(columns[0].is_primary_key(), "identity column must be first");

        Ok(Self { table, columns })
    }

    /// The key `entity` is stored under.
    ///
    /// Taken from `Entity::id`; debug builds check it against the
    /// primary-key property.
    #[must_use]
    pub fn key_of(&self, entity: &E) -> SqlValue {
        let key: SqlValue = entity.id().into();
        debug_assert_eq!(
            key,
            self.primary_key().read(entity),
            "{}: id() disagrees with primary key {}",
            E::TYPE_ID,
            self.primary_key().name()
        );
        key
    }

    /// Bind `entity`'s key as the next parameter.
    pub fn bind_key(&self, params: &mut Params, entity: &E) -> usize {
        params.bind_as(self.key_of(entity), self.primary_key().kind())
    }
}

impl<E> EntityModel<E> {
    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All persisted columns, identity first.
    #[must_use]
    pub fn columns(&self) -> &[Property<E>] {
        &self.columns
    }

    /// The identity column.
    #[must_use]
    pub fn primary_key(&self) -> &Property<E> {
        &self.columns[0]
    }

    /// Persisted columns other than the identity.
    #[must_use]
    pub fn non_key_columns(&self) -> &[Property<E>] {
        &self.columns[1..]
    }

    /// Look up a persisted column by name (case-insensitive).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Property<E>> {
        self.columns
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// View `entity` as a row of column values.
    #[must_use]
    pub fn row<'a>(&'a self, entity: &'a E) -> EntityRow<'a, E> {
        EntityRow {
            model: self,
            entity,
        }
    }
}

impl<E> fmt::Debug for EntityModel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

/// An entity seen through its model, for in-memory predicate evaluation.
pub struct EntityRow<'a, E> {
    model: &'a EntityModel<E>,
    entity: &'a E,
}

impl<E> Columns for EntityRow<'_, E> {
    fn column(&self, name: &str) -> Option<SqlValue> {
        self.model.column(name).map(|p| p.read(self.entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Widget {
        sku: String,
        label: String,
        cache: u32,
        weight: f64,
    }

    impl Entity for Widget {
        type Id = String;
        const TYPE_ID: &'static str = "Widget";

        fn id(&self) -> String {
            self.sku.clone()
        }

        fn new_zero() -> Self {
            Self::default()
        }

        fn properties() -> Vec<Property<Self>> {
            vec![
                Property::new("label", "TEXT", |w: &Self| w.label.clone().into(), |w, v| {
                    w.label = v.try_into()?;
                    Ok(())
                }),
                Property::new("cache", "INTEGER", |w: &Self| i64::from(w.cache).into(), |_, _| {
                    Ok(())
                })
                .transient(),
                Property::new("sku", "VARCHAR(32)", |w: &Self| w.sku.clone().into(), |w, v| {
                    w.sku = v.try_into()?;
                    Ok(())
                })
                .primary_key(),
                Property::new("note", "", |_: &Self| SqlValue::Null, |_, _| Ok(())),
                Property::new("weight", "REAL", |w: &Self| w.weight.into(), |w, v| {
                    w.weight = v.try_into()?;
                    Ok(())
                }),
            ]
        }
    }

    #[test]
    fn test_resolve_orders_key_first_and_skips_unpersisted() {
        let model = EntityModel::<Widget>::resolve().unwrap();
        let names: Vec<_> = model.columns().iter().map(Property::name).collect();
        assert_eq!(names, ["sku", "label", "weight"]);
        assert_eq!(model.table(), "widget");
        assert_eq!(model.primary_key().name(), "sku");
        assert_eq!(model.non_key_columns().len(), 2);
    }

    #[test]
    fn test_prefix_applies_to_table() {
        let model = EntityModel::<Widget>::resolve_with_prefix("app_").unwrap();
        assert_eq!(model.table(), "app_widget");
        assert!(EntityModel::<Widget>::resolve_with_prefix("bad-").is_err());
    }

    #[test]
    fn test_apply_names_column_on_mismatch() {
        let model = EntityModel::<Widget>::resolve().unwrap();
        let mut w = Widget::new_zero();
        let err = model
            .column("label")
            .unwrap()
            .apply(&mut w, SqlValue::Int(3))
            .unwrap_err();
        assert!(matches!(err, StorageError::Mapping { column, .. } if column == "label"));
    }

    #[test]
    fn test_key_and_values_bind_with_column_kinds() {
        let model = EntityModel::<Widget>::resolve().unwrap();
        let w = Widget {
            sku: "w-1".into(),
            ..Widget::default()
        };
        assert_eq!(model.key_of(&w), SqlValue::from("w-1"));

        let mut params = Params::new();
        assert_eq!(model.bind_key(&mut params, &w), 1);
        for property in model.non_key_columns() {
            property.bind_value(&mut params, &w);
        }
        assert_eq!(
            params.kinds(),
            &[ColumnKind::Text, ColumnKind::Text, ColumnKind::Real]
        );
        assert_eq!(params.values()[2], SqlValue::Real(0.0));
    }

    #[derive(Debug, Clone, Default)]
    struct Skewed {
        key: i64,
    }

    impl Entity for Skewed {
        type Id = i64;
        const TYPE_ID: &'static str = "Skewed";

        fn id(&self) -> i64 {
            self.key + 1
        }

        fn new_zero() -> Self {
            Self::default()
        }

        fn properties() -> Vec<Property<Self>> {
            vec![Property::new("key", "BIGINT", |s: &Self| s.key.into(), |s, v| {
                s.key = v.try_into()?;
                Ok(())
            })
            .primary_key()]
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "id() disagrees with primary key")]
    fn test_key_of_rejects_id_that_disagrees_with_primary_key() {
        let model = EntityModel::<Skewed>::resolve().unwrap();
        let _ = model.key_of(&Skewed { key: 4 });
    }

    #[test]
    fn test_row_view_reads_columns() {
        let model = EntityModel::<Widget>::resolve().unwrap();
        let w = Widget {
            sku: "w-1".into(),
            label: "bolt".into(),
            cache: 9,
            weight: 0.5,
        };
        let row = model.row(&w);
        assert_eq!(row.column("LABEL"), Some(SqlValue::from("bolt")));
        assert_eq!(row.column("cache"), None);
    }

    #[derive(Debug, Clone, Default)]
    struct Keyless;

    impl Entity for Keyless {
        type Id = i64;
        const TYPE_ID: &'static str = "Keyless";

        fn id(&self) -> i64 {
            0
        }

        fn new_zero() -> Self {
            Self
        }

        fn properties() -> Vec<Property<Self>> {
            vec![Property::new("n", "INTEGER", |_: &Self| SqlValue::Int(0), |_, _| Ok(()))]
        }
    }

    #[test]
    fn test_missing_primary_key_is_initialization_error() {
        let err = EntityModel::<Keyless>::resolve().unwrap_err();
        assert!(matches!(err, StorageError::Initialization { .. }));
    }
}
