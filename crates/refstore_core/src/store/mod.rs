//! Table Store contract and store-level query primitives.
//!
//! # Responsibility
//! - Define the storage collaborator every query strategy talks to.
//! - Define match specifications and the paginated cursor protocol.
//!
//! # Invariants
//! - Rows are positionally aligned with `TableSchema::attributes()`.
//! - `select`/`select_next` return `None` for an exhausted or empty result,
//!   and `StoreError::BadArgument` for a malformed match specification.
//! - Stores own all locking and transaction semantics.

use crate::db::DbError;
use crate::model::context::CallingContext;
use crate::model::options::{ComparisonOperator, ExecutionMode};
use crate::model::record::TableSchema;
use crate::model::reference::Identifier;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;

pub use sqlite::SqliteTableStore;

/// One stored row, one value per schema attribute.
pub type Row = Vec<Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a Table Store. Passed through the core unchanged.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed match specification or row shape.
    BadArgument(String),
    Db(DbError),
    InvalidTable(String),
    SchemaMismatch {
        table: String,
        registered: Vec<String>,
        requested: Vec<String>,
    },
    /// Persisted bytes could not be decoded into a row.
    Corrupt(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadArgument(message) => write!(f, "bad argument: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidTable(name) => write!(f, "invalid or unknown table `{name}`"),
            Self::SchemaMismatch {
                table,
                registered,
                requested,
            } => write!(
                f,
                "table `{table}` registered with attributes {registered:?}, requested {requested:?}"
            ),
            Self::Corrupt(message) => write!(f, "corrupt stored row: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::BadArgument(_)
            | Self::InvalidTable(_)
            | Self::SchemaMismatch { .. }
            | Self::Corrupt(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Positional pattern variable, rendered as `$n` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Placeholder(pub usize);

impl Display for Placeholder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// One side of a guard comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOperand {
    Bound(Placeholder),
    Literal(Value),
}

/// Guard condition evaluated against a pattern-matched row.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub operator: ComparisonOperator,
    pub left: GuardOperand,
    pub right: GuardOperand,
}

/// What a match specification returns for each matching row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// The whole matched row (`$_`).
    WholeRow,
}

/// Wildcard pattern plus guards plus projection.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSpec {
    /// One placeholder per attribute position, in declaration order.
    pub pattern: Vec<Placeholder>,
    pub guards: Vec<Guard>,
    pub projection: Projection,
}

/// Where the next page of a select starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub table: TableSchema,
    pub spec: MatchSpec,
    pub limit: usize,
    /// Rows consumed by this cursor and every batch before it.
    pub offset: usize,
}

/// One batch of selected rows plus the handle to fetch the next batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    rows: Vec<Row>,
    continuation: Continuation,
}

impl Cursor {
    pub fn new(rows: Vec<Row>, continuation: Continuation) -> Self {
        Self { rows, continuation }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn continuation(&self) -> &Continuation {
        &self.continuation
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Storage collaborator required by query strategies.
pub trait TableStore {
    /// Creates the table for `schema` if needed.
    fn ensure_table(&self, schema: &TableSchema) -> StoreResult<()>;

    /// Ordered attribute names of a registered table.
    fn attributes(&self, table: &str) -> StoreResult<Vec<String>>;

    fn read(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        mode: ExecutionMode,
    ) -> StoreResult<Option<Row>>;

    /// Unconditional upsert by key.
    fn write(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        row: Row,
        mode: ExecutionMode,
    ) -> StoreResult<()>;

    fn delete(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        mode: ExecutionMode,
    ) -> StoreResult<()>;

    /// Runs `spec` and returns the first batch of at most `limit` rows.
    fn select(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        limit: usize,
        spec: &MatchSpec,
    ) -> StoreResult<Option<Cursor>>;

    /// Fetches the batch following `cursor`.
    fn select_next(
        &self,
        context: &CallingContext,
        cursor: &Cursor,
    ) -> StoreResult<Option<Cursor>>;
}
