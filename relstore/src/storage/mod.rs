//! Storage - Trait, Query Model and Implementations
//!
//! `TigerStyle`: Abstract storage with simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Storage<E> Trait                        │
//! │       put · find · remove · remove_all · select(sink)        │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                    ↑                    ↑
//! ┌────────┴────────┐  ┌────────┴──────────┐  ┌──────┴─────────┐
//! │   SimStorage    │  │ RelationalStorage │  │   Decorated    │
//! │   (testing)     │  │  (sqlx::Any SQL)  │  │ (interceptors) │
//! └─────────────────┘  └───────────────────┘  └────────────────┘
//! ```
//!
//! Entities describe their columns through [`Entity::properties`]; queries
//! are built from [`Predicate`] and [`Order`] expressions and compiled to
//! parameterized SQL by the relational engine.

mod backend;
mod error;
mod expr;
mod model;
mod relational;
mod sim;
mod sql;
mod value;

pub use backend::{CountSink, FailSoft, FnSink, Query, Sink, Storage, StorageExt};
pub use error::{CollapseExt, StorageError, StorageResult};
pub use expr::{
    asc, desc, eq, gt, gte, in_list, is_null, lt, lte, ne, not_null, And, Cmp, CmpOp, Columns,
    Direction, In, IsNull, Not, Or, Order, OrderBy, Predicate, PredicateExt,
};
pub use model::{Entity, EntityModel, EntityRow, Getter, Property, Setter};
pub use relational::{ConnectionSource, FaultyConnections, RelationalStorage};
pub use sim::SimStorage;
pub use sql::{is_valid_identifier, Dialect, Params, SqlBuilder};
pub use value::{nullable, ColumnKind, SqlValue};

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Entity, Property};

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Account {
        pub id: i64,
        pub owner: String,
        pub balance: i64,
    }

    pub fn account(id: i64, owner: &str, balance: i64) -> Account {
        Account {
            id,
            owner: owner.to_string(),
            balance,
        }
    }

    impl Entity for Account {
        type Id = i64;
        const TYPE_ID: &'static str = "Account";

        fn id(&self) -> i64 {
            self.id
        }

        fn new_zero() -> Self {
            Self::default()
        }

        fn properties() -> Vec<Property<Self>> {
            vec![
                Property::new("id", "BIGINT", |a: &Self| a.id.into(), |a, v| {
                    a.id = v.try_into()?;
                    Ok(())
                })
                .primary_key(),
                Property::new("owner", "VARCHAR(64)", |a: &Self| a.owner.clone().into(), |a, v| {
                    a.owner = v.try_into()?;
                    Ok(())
                }),
                Property::new("balance", "BIGINT", |a: &Self| a.balance.into(), |a, v| {
                    a.balance = v.try_into()?;
                    Ok(())
                }),
            ]
        }
    }
}
