//! Reference resolution and table-backed repositories.
//! Application code addresses records by id, symbol, encoded string or the
//! object itself, and queries them through a pluggable strategy.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapper;
pub mod model;
pub mod registry;
pub mod repo;
pub mod store;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use mapper::{as_record, Consistency, RecordLoader};
pub use model::context::{Caller, CallingContext};
pub use model::options::{
    ComparisonOperator, ExecutionMode, FieldSelector, FilterSpec, OptionsError, QueryOptions,
};
pub use model::record::{Entity, Record, Scope, TableSchema};
pub use model::reference::{Identifier, InvalidSymbol, Reference, ReferenceInput, Symbol};
pub use registry::{RegistryError, SrefRegistry};
pub use repo::error::{RepoError, RepoResult};
pub use repo::repository::Repository;
pub use repo::strategy::{DefaultQueryStrategy, QueryStrategy, RecordPage};
pub use store::{Cursor, MatchSpec, Row, SqliteTableStore, StoreError, StoreResult, TableStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
