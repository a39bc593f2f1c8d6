//! Query strategy contract and the default table-backed strategy.
//!
//! # Responsibility
//! - Translate repository calls into Table Store operations.
//! - Build positional match specifications from declarative filters.
//! - Walk the store's cursor protocol to reach a requested page.
//!
//! # Invariants
//! - The match pattern binds exactly one placeholder per schema attribute,
//!   in declaration order, and `list` checks that layout against the store.
//! - Store errors are returned unchanged and never retried.
//! - A missing page is `Ok(None)`, a malformed query is `Err(Store(..))`.

use crate::mapper::{record_from_row, record_to_row};
use crate::model::context::CallingContext;
use crate::model::options::{FieldSelector, FilterSpec, QueryOptions};
use crate::model::record::{Record, Scope, TableSchema};
use crate::model::reference::{Identifier, Reference};
use crate::repo::error::{RepoError, RepoResult};
use crate::store::{
    Cursor, Guard, GuardOperand, MatchSpec, Placeholder, Projection, StoreError, TableStore,
};
use log::{debug, warn};
use serde_json::Value;
use std::marker::PhantomData;

/// Pluggable storage strategy behind a repository.
pub trait QueryStrategy<S: Scope> {
    /// Prepares backing storage for `S`.
    fn ensure_table(&self) -> RepoResult<()>;

    fn get(
        &self,
        reference: &Reference,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<Record<S::Entity>>>;

    fn create(
        &self,
        record: &Record<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()>;

    fn update(
        &self,
        record: &Record<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()>;

    fn delete(
        &self,
        identifier: &Identifier,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()>;

    fn match_records(
        &self,
        filter: &FilterSpec,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>>;

    fn list(
        &self,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>>;
}

/// One page of rows tagged with the scope that decodes them.
pub struct RecordPage<S: Scope> {
    schema: TableSchema,
    cursor: Cursor,
    _scope: PhantomData<fn() -> S>,
}

impl<S: Scope> Clone for RecordPage<S> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            cursor: self.cursor.clone(),
            _scope: PhantomData,
        }
    }
}

impl<S: Scope> std::fmt::Debug for RecordPage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPage")
            .field("scope", &S::NAME)
            .field("schema", &self.schema)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<S: Scope> RecordPage<S> {
    fn new(cursor: Cursor) -> Self {
        Self {
            schema: S::schema(),
            cursor,
            _scope: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn len(&self) -> usize {
        self.cursor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    /// Decodes every row of this page.
    pub fn records(&self) -> RepoResult<Vec<Record<S::Entity>>> {
        self.cursor
            .rows()
            .iter()
            .cloned()
            .map(record_from_row::<S>)
            .collect()
    }

    pub fn entities(&self) -> RepoResult<Vec<S::Entity>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|record| record.entity)
            .collect())
    }
}

/// Builds the match specification `list` runs for `schema` and `filter`.
///
/// The pattern binds `$1..$n` to the schema's attributes in order; the
/// filter becomes one guard and the whole row is projected.
pub fn build_match_spec(schema: &TableSchema, filter: &FilterSpec) -> MatchSpec {
    let left = match filter.field {
        FieldSelector::Always => GuardOperand::Literal(Value::Bool(true)),
        FieldSelector::Position(position) => GuardOperand::Bound(Placeholder(position)),
    };

    MatchSpec {
        pattern: (1..=schema.arity()).map(Placeholder).collect(),
        guards: vec![Guard {
            operator: filter.operator,
            left,
            right: GuardOperand::Literal(filter.value.clone()),
        }],
        projection: Projection::WholeRow,
    }
}

/// Default strategy over any [`TableStore`].
pub struct DefaultQueryStrategy<'store, S, T: ?Sized> {
    store: &'store T,
    schema: TableSchema,
    _scope: PhantomData<fn() -> S>,
}

impl<'store, S: Scope, T: TableStore + ?Sized> DefaultQueryStrategy<'store, S, T> {
    pub fn new(store: &'store T) -> Self {
        Self {
            store,
            schema: S::schema(),
            _scope: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Fails unless the store holds the table with this scope's attributes,
    /// so the match pattern arity follows the stored layout.
    fn check_store_attributes(&self) -> RepoResult<()> {
        let registered = self.store.attributes(self.schema.name())?;
        if registered != self.schema.attributes() {
            warn!(
                "event=strategy_list module=strategy status=error scope={} error=schema_mismatch",
                S::NAME
            );
            return Err(StoreError::SchemaMismatch {
                table: self.schema.name().to_string(),
                registered,
                requested: self.schema.attributes().to_vec(),
            }
            .into());
        }
        Ok(())
    }

    fn write(
        &self,
        operation: &'static str,
        record: &Record<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()> {
        let row = record_to_row::<S>(record)?;
        let mode = options.execution_mode();
        debug!(
            "event=strategy_{operation} module=strategy scope={} mode={} identifier={}",
            S::NAME,
            mode.as_str(),
            record.identifier
        );
        self.store
            .write(context, &self.schema, &record.identifier, row, mode)?;
        Ok(())
    }
}

impl<S: Scope, T: TableStore + ?Sized> QueryStrategy<S> for DefaultQueryStrategy<'_, S, T> {
    fn ensure_table(&self) -> RepoResult<()> {
        self.store.ensure_table(&self.schema)?;
        Ok(())
    }

    fn get(
        &self,
        reference: &Reference,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<Record<S::Entity>>> {
        if reference.scope() != S::NAME {
            return Err(RepoError::unsupported("get", format!("{reference:?}")));
        }
        let mode = options.execution_mode();
        debug!(
            "event=strategy_get module=strategy scope={} mode={} identifier={}",
            S::NAME,
            mode.as_str(),
            reference.identifier()
        );
        self.store
            .read(context, &self.schema, reference.identifier(), mode)?
            .map(record_from_row::<S>)
            .transpose()
    }

    fn create(
        &self,
        record: &Record<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()> {
        self.write("create", record, context, options)
    }

    fn update(
        &self,
        record: &Record<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()> {
        self.write("update", record, context, options)
    }

    fn delete(
        &self,
        identifier: &Identifier,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()> {
        let mode = options.execution_mode();
        debug!(
            "event=strategy_delete module=strategy scope={} mode={} identifier={}",
            S::NAME,
            mode.as_str(),
            identifier
        );
        self.store.delete(context, &self.schema, identifier, mode)?;
        Ok(())
    }

    fn match_records(
        &self,
        _filter: &FilterSpec,
        _context: &CallingContext,
        _options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>> {
        Err(RepoError::NotImplemented("match"))
    }

    fn list(
        &self,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>> {
        let page = options.page.get();
        let limit = options.results_per_page.get() as usize;
        self.check_store_attributes()?;
        let spec = build_match_spec(&self.schema, &options.filter);
        debug!(
            "event=strategy_list module=strategy scope={} page={} results_per_page={} identity_filter={}",
            S::NAME,
            page,
            limit,
            options.filter.is_identity()
        );

        let mut cursor = match self.store.select(context, &self.schema, limit, &spec) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(
                    "event=strategy_list module=strategy status=error scope={} error={}",
                    S::NAME,
                    err
                );
                return Err(err.into());
            }
        };

        for _ in 1..page {
            cursor = match self.store.select_next(context, &cursor)? {
                Some(next) => next,
                None => return Ok(None),
            };
        }

        Ok(Some(RecordPage::new(cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::build_match_spec;
    use crate::model::options::{ComparisonOperator, FilterSpec};
    use crate::model::record::TableSchema;
    use crate::store::{GuardOperand, Placeholder, Projection};
    use serde_json::json;

    #[test]
    fn identity_filter_binds_every_attribute_and_compares_true() {
        let schema = TableSchema::new("users", &["email", "age"]);
        let spec = build_match_spec(&schema, &FilterSpec::default());

        assert_eq!(
            spec.pattern,
            vec![Placeholder(1), Placeholder(2), Placeholder(3), Placeholder(4)]
        );
        assert_eq!(spec.projection, Projection::WholeRow);
        assert_eq!(spec.guards.len(), 1);
        assert_eq!(spec.guards[0].left, GuardOperand::Literal(json!(true)));
        assert_eq!(spec.guards[0].right, GuardOperand::Literal(json!(true)));
    }

    #[test]
    fn positional_filter_binds_placeholder() {
        let schema = TableSchema::new("users", &["age"]);
        let filter = FilterSpec::field(3, ComparisonOperator::Lt, 30);
        let spec = build_match_spec(&schema, &filter);

        assert_eq!(spec.pattern.len(), 3);
        assert_eq!(spec.guards[0].operator, ComparisonOperator::Lt);
        assert_eq!(spec.guards[0].left, GuardOperand::Bound(Placeholder(3)));
        assert_eq!(spec.guards[0].right, GuardOperand::Literal(json!(30)));
    }
}
