//! Shared fixtures for integration tests.
#![allow(dead_code)]

use refstore_core::{
    Entity, Identifier, Scope, SqliteTableStore, SrefRegistry, Symbol, TableSchema,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const USER_SCOPE: &str = "accounts.user";
pub const FLAG_SCOPE: &str = "config.flag";
pub const TAG_SCOPE: &str = "catalog.tag";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i64,
}

impl User {
    pub fn new(id: i64, name: &str, age: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_ascii_lowercase()),
            age,
        }
    }
}

impl Entity for User {
    fn identifier(&self) -> Identifier {
        Identifier::Numeric(self.id)
    }
}

/// Rows: `identifier`, `entity`, `email`, `age`.
pub struct Users;

impl Scope for Users {
    type Entity = User;
    const NAME: &'static str = USER_SCOPE;

    fn schema() -> TableSchema {
        TableSchema::new("users", &["email", "age"])
    }

    fn projections(user: &User) -> Vec<Value> {
        vec![json!(user.email), json!(user.age)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub name: Symbol,
    pub enabled: bool,
}

impl Flag {
    pub fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: Symbol::new(name).unwrap(),
            enabled,
        }
    }
}

impl Entity for Flag {
    fn identifier(&self) -> Identifier {
        Identifier::Symbolic(self.name.clone())
    }
}

pub struct Flags;

impl Scope for Flags {
    type Entity = Flag;
    const NAME: &'static str = FLAG_SCOPE;

    fn schema() -> TableSchema {
        TableSchema::new("flags", &[])
    }
}

/// Keyed by free-form text, so identifiers are `Encoded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub label: String,
}

impl Tag {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    fn identifier(&self) -> Identifier {
        Identifier::Encoded(self.key.clone())
    }
}

/// Rows: `identifier`, `entity`, `label`.
pub struct Tags;

impl Scope for Tags {
    type Entity = Tag;
    const NAME: &'static str = TAG_SCOPE;

    fn schema() -> TableSchema {
        TableSchema::new("tags", &["label"])
    }

    fn projections(tag: &Tag) -> Vec<Value> {
        vec![json!(tag.label)]
    }
}

pub fn registry() -> SrefRegistry {
    SrefRegistry::new()
        .with(USER_SCOPE, "user")
        .unwrap()
        .with(FLAG_SCOPE, "flag")
        .unwrap()
        .with(TAG_SCOPE, "tag")
        .unwrap()
}

pub fn seed_users(count: i64) -> Vec<User> {
    (1..=count)
        .map(|id| User::new(id, &format!("User{id}"), 20 + id * 5))
        .collect()
}

pub fn open_store(conn: &Connection) -> SqliteTableStore<'_> {
    SqliteTableStore::try_new(conn).unwrap()
}
