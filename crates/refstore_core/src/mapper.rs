//! Entity/record mapper.
//!
//! # Responsibility
//! - Convert between in-memory entities and their persisted record shape.
//! - Encode records into positional store rows and decode them back.
//! - Short-circuit already-resolved inputs before touching the store.
//!
//! # Invariants
//! - `to_entity(as_record(e), None) == e` for every entity `e`.
//! - An entity input with explicit options always re-fetches, because the
//!   options may ask for transactional semantics.
//! - Decoded records carry the identifier their entity reports, which must
//!   match the row's identifier value.

use crate::model::context::CallingContext;
use crate::model::options::QueryOptions;
use crate::model::record::{Entity, Record, Scope};
use crate::model::reference::{resolve, Reference, ReferenceInput};
use crate::registry::SrefRegistry;
use crate::repo::error::{RepoError, RepoResult};
use crate::store::Row;

/// Which facade read a mapper fetch delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Plain `get`: honors `options.dirty`.
    Relaxed,
    /// `get_transactional`: never takes the dirty path.
    Strict,
}

/// Facade surface the mapper delegates fetches to.
pub trait RecordLoader<S: Scope> {
    fn registry(&self) -> &SrefRegistry;

    fn load(
        &self,
        reference: &Reference,
        context: &CallingContext,
        options: &QueryOptions,
        consistency: Consistency,
    ) -> RepoResult<Option<Record<S::Entity>>>;
}

/// Builds the record for `entity`, copying declared projections.
pub fn as_record<S: Scope>(entity: &S::Entity) -> Record<S::Entity> {
    Record {
        identifier: entity.identifier(),
        entity: entity.clone(),
        projections: S::projections(entity),
    }
}

/// Returns the entity for `input`, loading it when needed.
pub fn to_entity<S, L>(
    loader: &L,
    input: ReferenceInput<S::Entity>,
    context: &CallingContext,
    options: Option<&QueryOptions>,
    consistency: Consistency,
    operation: &'static str,
) -> RepoResult<Option<S::Entity>>
where
    S: Scope,
    L: RecordLoader<S> + ?Sized,
{
    match input {
        ReferenceInput::Entity(entity) if options.is_none() => Ok(Some(entity)),
        ReferenceInput::Record(record) => Ok(Some(record.entity)),
        other => Ok(load::<S, L>(loader, other, context, options, consistency, operation)?
            .map(|record| record.entity)),
    }
}

/// Returns the record for `input`, loading it when needed.
pub fn to_record<S, L>(
    loader: &L,
    input: ReferenceInput<S::Entity>,
    context: &CallingContext,
    options: Option<&QueryOptions>,
    consistency: Consistency,
    operation: &'static str,
) -> RepoResult<Option<Record<S::Entity>>>
where
    S: Scope,
    L: RecordLoader<S> + ?Sized,
{
    match input {
        ReferenceInput::Entity(entity) if options.is_none() => Ok(Some(as_record::<S>(&entity))),
        ReferenceInput::Record(record) => Ok(Some(record)),
        other => load::<S, L>(loader, other, context, options, consistency, operation),
    }
}

fn load<S, L>(
    loader: &L,
    input: ReferenceInput<S::Entity>,
    context: &CallingContext,
    options: Option<&QueryOptions>,
    consistency: Consistency,
    operation: &'static str,
) -> RepoResult<Option<Record<S::Entity>>>
where
    S: Scope,
    L: RecordLoader<S> + ?Sized,
{
    let reference = resolve(loader.registry(), S::NAME, input, operation)?;
    let options = options.cloned().unwrap_or_default();
    loader.load(&reference, context, &options, consistency)
}

/// Encodes a record as a positional row for `S::schema()`.
///
/// # Errors
/// - `InvalidData` when the projection count does not match the schema.
/// - `Codec` when the entity cannot be serialized.
pub fn record_to_row<S: Scope>(record: &Record<S::Entity>) -> RepoResult<Row> {
    let schema = S::schema();
    let expected = schema.arity() - 2;
    if record.projections.len() != expected {
        return Err(RepoError::InvalidData(format!(
            "scope {} declares {expected} projections, record carries {}",
            S::NAME,
            record.projections.len()
        )));
    }

    let mut row = Vec::with_capacity(schema.arity());
    row.push(record.identifier.to_value());
    row.push(serde_json::to_value(&record.entity)?);
    row.extend(record.projections.iter().cloned());
    Ok(row)
}

/// Decodes a positional row produced by [`record_to_row`].
///
/// # Errors
/// - `InvalidData` when the row shape, identifier or entity is malformed.
pub fn record_from_row<S: Scope>(row: Row) -> RepoResult<Record<S::Entity>> {
    let arity = S::schema().arity();
    if row.len() != arity {
        return Err(RepoError::InvalidData(format!(
            "row for scope {} has {} values, expected {arity}",
            S::NAME,
            row.len()
        )));
    }

    let mut values = row.into_iter();
    let identifier_value = values.next().unwrap_or_default();
    let entity_value = values.next().unwrap_or_default();
    let projections: Vec<_> = values.collect();

    let entity: S::Entity = serde_json::from_value(entity_value).map_err(|err| {
        RepoError::InvalidData(format!(
            "entity at identifier `{identifier_value}` does not decode: {err}"
        ))
    })?;
    let identifier = entity.identifier();
    if identifier.to_value() != identifier_value {
        return Err(RepoError::InvalidData(format!(
            "row identifier `{identifier_value}` does not match entity identifier {identifier}"
        )));
    }

    Ok(Record {
        identifier,
        entity,
        projections,
    })
}

#[cfg(test)]
mod tests {
    use super::{record_from_row, record_to_row};
    use crate::model::record::{Entity, Record, Scope, TableSchema};
    use crate::model::reference::Identifier;
    use crate::repo::error::RepoError;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        key: String,
    }

    impl Entity for Tag {
        fn identifier(&self) -> Identifier {
            Identifier::Encoded(self.key.clone())
        }
    }

    struct Tags;

    impl Scope for Tags {
        type Entity = Tag;
        const NAME: &'static str = "catalog.tag";

        fn schema() -> TableSchema {
            TableSchema::new("tags", &["length"])
        }

        fn projections(tag: &Tag) -> Vec<Value> {
            vec![json!(tag.key.len())]
        }
    }

    fn tag_record(key: &str) -> Record<Tag> {
        let tag = Tag {
            key: key.to_string(),
        };
        Record {
            identifier: tag.identifier(),
            projections: Tags::projections(&tag),
            entity: tag,
        }
    }

    #[test]
    fn encoded_identifiers_are_stored_bare_and_decoded_from_the_entity() {
        let record = tag_record("42");
        let row = record_to_row::<Tags>(&record).expect("encodes");
        assert_eq!(row[0], json!("42"));

        let decoded = record_from_row::<Tags>(row).expect("decodes");
        assert_eq!(decoded, record);
        assert_eq!(decoded.identifier, Identifier::Encoded("42".to_string()));
    }

    #[test]
    fn identifier_value_must_match_entity() {
        let mut row = record_to_row::<Tags>(&tag_record("red")).expect("encodes");
        row[0] = json!("blue");
        let err = record_from_row::<Tags>(row).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }

    #[test]
    fn projection_count_must_match_schema() {
        let mut record = tag_record("red");
        record.projections.push(json!("extra"));
        let err = record_to_row::<Tags>(&record).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));

        let err = record_from_row::<Tags>(vec![json!("red")]).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }
}
