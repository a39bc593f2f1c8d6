//! Entity/record shapes and per-scope table wiring.
//!
//! # Responsibility
//! - Define the contract a domain type implements to become addressable.
//! - Define the persisted record shape and the table schema it maps onto.
//!
//! # Invariants
//! - Schema attributes always start with `identifier` then `entity`.
//! - `Record::projections` is positionally aligned with the schema
//!   attributes that follow `entity`.

use crate::model::reference::Identifier;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Attribute name at position 1.
pub const IDENTIFIER_ATTRIBUTE: &str = "identifier";
/// Attribute name at position 2.
pub const ENTITY_ATTRIBUTE: &str = "entity";

/// In-memory domain object addressable through references.
pub trait Entity: Clone + Debug + PartialEq + Serialize + DeserializeOwned {
    /// Stored identifier of this entity.
    fn identifier(&self) -> Identifier;
}

/// Explicit per-type wiring between a domain type and its table.
///
/// Implemented once per domain type.
pub trait Scope {
    type Entity: Entity;

    /// Stable scope name, also the key into the sref registry.
    const NAME: &'static str;

    /// Table layout used to persist records of this scope.
    fn schema() -> TableSchema;

    /// Indexable values copied out of the entity on write.
    ///
    /// Must return one value per projection attribute declared by
    /// [`Scope::schema`], in declaration order.
    fn projections(_entity: &Self::Entity) -> Vec<Value> {
        Vec::new()
    }
}

/// Persisted-row shape of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
    pub identifier: Identifier,
    pub entity: E,
    pub projections: Vec<Value>,
}

/// Table name plus ordered attribute names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    attributes: Vec<String>,
}

impl TableSchema {
    /// Builds a schema with `identifier`, `entity` and the given projections.
    pub fn new(name: impl Into<String>, projections: &[&str]) -> Self {
        let mut attributes = Vec::with_capacity(projections.len() + 2);
        attributes.push(IDENTIFIER_ATTRIBUTE.to_string());
        attributes.push(ENTITY_ATTRIBUTE.to_string());
        attributes.extend(projections.iter().map(|name| (*name).to_string()));
        Self {
            name: name.into(),
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Number of attribute positions in a row.
    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    /// 1-based position of a named attribute.
    pub fn position_of(&self, attribute: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|candidate| candidate == attribute)
            .map(|index| index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::TableSchema;

    #[test]
    fn schema_prepends_identifier_and_entity() {
        let schema = TableSchema::new("users", &["email", "age"]);
        assert_eq!(schema.attributes(), ["identifier", "entity", "email", "age"]);
        assert_eq!(schema.arity(), 4);
        assert_eq!(schema.position_of("identifier"), Some(1));
        assert_eq!(schema.position_of("age"), Some(4));
        assert_eq!(schema.position_of("missing"), None);
    }
}
