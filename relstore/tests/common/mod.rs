//! Shared fixtures for integration tests.

#![allow(dead_code)]

use relstore::storage::{Entity, Property};

/// A bank account row.
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

/// An entity whose only column is its key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub name: String,
}

impl Entity for Tag {
    type Id = String;
    const TYPE_ID: &'static str = "Tag";

    fn id(&self) -> String {
        self.name.clone()
    }

    fn new_zero() -> Self {
        Self::default()
    }

    fn properties() -> Vec<Property<Self>> {
        vec![Property::new("name", "VARCHAR(32)", |t: &Self| t.name.clone().into(), |t, v| {
            t.name = v.try_into()?;
            Ok(())
        })
        .primary_key()]
    }
}
