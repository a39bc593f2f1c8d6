//! Repository facade: the uniform surface application code calls.
//!
//! # Responsibility
//! - Accept every reference-shaped input and normalize it once.
//! - Compose the mapper and a query strategy behind get/entity/record.
//!
//! # Invariants
//! - `*_transactional` operations never take the dirty path, whatever
//!   `options.dirty` says.
//! - Unsupported inputs fail with `UnsupportedReference` naming the
//!   operation; nothing is recovered locally.

use crate::mapper::{self, as_record, Consistency, RecordLoader};
use crate::model::context::CallingContext;
use crate::model::options::{FilterSpec, QueryOptions};
use crate::model::record::{Record, Scope};
use crate::model::reference::{self, Reference, ReferenceInput};
use crate::registry::SrefRegistry;
use crate::repo::error::RepoResult;
use crate::repo::strategy::{QueryStrategy, RecordPage};
use std::marker::PhantomData;

/// Reference-aware repository for one scope.
pub struct Repository<'reg, S: Scope, Q: QueryStrategy<S>> {
    registry: &'reg SrefRegistry,
    strategy: Q,
    _scope: PhantomData<fn() -> S>,
}

impl<'reg, S: Scope, Q: QueryStrategy<S>> Repository<'reg, S, Q> {
    /// Builds a repository and prepares its storage.
    ///
    /// # Errors
    /// - `Registry` when `S::NAME` has no sref prefix registered.
    /// - `Store` when the strategy cannot prepare the backing table.
    pub fn try_new(registry: &'reg SrefRegistry, strategy: Q) -> RepoResult<Self> {
        registry.prefix(S::NAME)?;
        strategy.ensure_table()?;
        Ok(Self {
            registry,
            strategy,
            _scope: PhantomData,
        })
    }

    pub fn strategy(&self) -> &Q {
        &self.strategy
    }

    /// Resolves `input` to its canonical reference.
    pub fn reference(&self, input: impl Into<ReferenceInput<S::Entity>>) -> RepoResult<Reference> {
        reference::resolve(self.registry, S::NAME, input.into(), "reference")
    }

    /// Resolves `input` and returns its external string form.
    pub fn encode(&self, input: impl Into<ReferenceInput<S::Entity>>) -> RepoResult<String> {
        let reference = reference::resolve(self.registry, S::NAME, input.into(), "encode")?;
        reference::encode(self.registry, &reference)
    }

    /// Loads the entity `input` refers to, honoring `options.dirty`.
    pub fn get(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<S::Entity>> {
        self.fetch(input.into(), context, options, Consistency::Relaxed, "get")
    }

    /// Loads the entity `input` refers to inside a store transaction.
    pub fn get_transactional(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<S::Entity>> {
        self.fetch(
            input.into(),
            context,
            options,
            Consistency::Strict,
            "get_transactional",
        )
    }

    /// Returns the entity for `input`, loading only when it is not at hand.
    pub fn entity(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: Option<&QueryOptions>,
    ) -> RepoResult<Option<S::Entity>> {
        mapper::to_entity::<S, Self>(
            self,
            input.into(),
            context,
            options,
            Consistency::Relaxed,
            "entity",
        )
    }

    pub fn entity_transactional(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: Option<&QueryOptions>,
    ) -> RepoResult<Option<S::Entity>> {
        mapper::to_entity::<S, Self>(
            self,
            input.into(),
            context,
            options,
            Consistency::Strict,
            "entity_transactional",
        )
    }

    /// Returns the record for `input`, loading only when it is not at hand.
    pub fn record(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: Option<&QueryOptions>,
    ) -> RepoResult<Option<Record<S::Entity>>> {
        mapper::to_record::<S, Self>(
            self,
            input.into(),
            context,
            options,
            Consistency::Relaxed,
            "record",
        )
    }

    pub fn record_transactional(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: Option<&QueryOptions>,
    ) -> RepoResult<Option<Record<S::Entity>>> {
        mapper::to_record::<S, Self>(
            self,
            input.into(),
            context,
            options,
            Consistency::Strict,
            "record_transactional",
        )
    }

    /// Persists a new entity and returns the record written.
    pub fn create(
        &self,
        entity: &S::Entity,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Record<S::Entity>> {
        let record = as_record::<S>(entity);
        self.strategy.create(&record, context, options)?;
        Ok(record)
    }

    /// Persists changes to an entity and returns the record written.
    pub fn update(
        &self,
        entity: &S::Entity,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Record<S::Entity>> {
        let record = as_record::<S>(entity);
        self.strategy.update(&record, context, options)?;
        Ok(record)
    }

    /// Removes the row `input` refers to. Missing rows are not an error.
    pub fn delete(
        &self,
        input: impl Into<ReferenceInput<S::Entity>>,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<()> {
        let reference = reference::resolve(self.registry, S::NAME, input.into(), "delete")?;
        self.strategy
            .delete(reference.identifier(), context, options)
    }

    /// Returns the requested page, or `None` when the page does not exist.
    pub fn list(
        &self,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>> {
        self.strategy.list(context, options)
    }

    pub fn match_records(
        &self,
        filter: &FilterSpec,
        context: &CallingContext,
        options: &QueryOptions,
    ) -> RepoResult<Option<RecordPage<S>>> {
        self.strategy.match_records(filter, context, options)
    }

    fn fetch(
        &self,
        input: ReferenceInput<S::Entity>,
        context: &CallingContext,
        options: &QueryOptions,
        consistency: Consistency,
        operation: &'static str,
    ) -> RepoResult<Option<S::Entity>> {
        let reference = reference::resolve(self.registry, S::NAME, input, operation)?;
        Ok(self
            .load(&reference, context, options, consistency)?
            .map(|record| record.entity))
    }
}

impl<S: Scope, Q: QueryStrategy<S>> RecordLoader<S> for Repository<'_, S, Q> {
    fn registry(&self) -> &SrefRegistry {
        self.registry
    }

    fn load(
        &self,
        reference: &Reference,
        context: &CallingContext,
        options: &QueryOptions,
        consistency: Consistency,
    ) -> RepoResult<Option<Record<S::Entity>>> {
        match consistency {
            Consistency::Relaxed => self.strategy.get(reference, context, options),
            Consistency::Strict => self
                .strategy
                .get(reference, context, &options.transactional()),
        }
    }
}

