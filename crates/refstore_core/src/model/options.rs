//! Validated query options and filter specification.
//!
//! # Responsibility
//! - Replace the loosely typed options map with one validated struct.
//! - Apply defaults once, at construction.
//!
//! # Invariants
//! - `page` and `results_per_page` are always >= 1.
//! - The default filter matches every row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_RESULTS_PER_PAGE: u32 = 5000;

/// Comparison applied by a filter guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "le")]
    Le,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
}

impl ComparisonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Left-hand side of a filter guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    /// Match-everything sentinel; the guard compares literal `true`.
    Always,
    /// 1-based attribute position, same numbering as match placeholders.
    Position(usize),
}

/// Declarative row filter `{operator, field, value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub operator: ComparisonOperator,
    pub field: FieldSelector,
    pub value: Value,
}

impl FilterSpec {
    pub fn new(operator: ComparisonOperator, field: FieldSelector, value: impl Into<Value>) -> Self {
        Self {
            operator,
            field,
            value: value.into(),
        }
    }

    /// Filter comparing the attribute at `position` with `value`.
    pub fn field(position: usize, operator: ComparisonOperator, value: impl Into<Value>) -> Self {
        Self::new(operator, FieldSelector::Position(position), value)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::new(ComparisonOperator::Eq, FieldSelector::Always, true)
    }
}

/// Whether a store operation runs inside the store's transaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Transactional,
    Dirty,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::Dirty => "dirty",
        }
    }
}

/// Validated options shared by every repository operation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// 1-based page number.
    pub page: NonZeroU32,
    pub results_per_page: NonZeroU32,
    pub filter: FilterSpec,
    /// Selects the non-transactional execution path.
    pub dirty: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page: NonZeroU32::MIN,
            results_per_page: non_zero_or_min(DEFAULT_RESULTS_PER_PAGE),
            filter: FilterSpec::default(),
            dirty: false,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page number.
    ///
    /// # Errors
    /// - Returns `OptionsError` when `page` is zero.
    pub fn with_page(mut self, page: u32) -> Result<Self, OptionsError> {
        self.page = positive("page", u64::from(page))?;
        Ok(self)
    }

    /// Sets the page size.
    ///
    /// # Errors
    /// - Returns `OptionsError` when `results_per_page` is zero.
    pub fn with_results_per_page(mut self, results_per_page: u32) -> Result<Self, OptionsError> {
        self.results_per_page = positive("results_per_page", u64::from(results_per_page))?;
        Ok(self)
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    /// Copy of these options that never takes the dirty path.
    pub fn transactional(&self) -> Self {
        Self {
            dirty: false,
            ..self.clone()
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.dirty {
            ExecutionMode::Dirty
        } else {
            ExecutionMode::Transactional
        }
    }

    /// Parses a loosely typed options map.
    ///
    /// `null` yields defaults. Unknown keys are ignored.
    ///
    /// # Errors
    /// - Returns `OptionsError` when `value` is not an object or a recognized
    ///   key holds a value of the wrong type or range.
    pub fn from_json(value: &Value) -> Result<Self, OptionsError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(OptionsError::invalid(
                    "options",
                    format!("expected an object, got `{other}`"),
                ))
            }
        };

        let mut options = Self::default();
        if let Some(page) = present(map, "page") {
            options.page = positive("page", as_u64("page", page)?)?;
        }
        if let Some(results) = present(map, "results_per_page") {
            options.results_per_page =
                positive("results_per_page", as_u64("results_per_page", results)?)?;
        }
        if let Some(dirty) = present(map, "dirty") {
            options.dirty = dirty.as_bool().ok_or_else(|| {
                OptionsError::invalid("dirty", format!("expected a boolean, got `{dirty}`"))
            })?;
        }
        if let Some(filter) = present(map, "filter") {
            options.filter = parse_filter(filter)?;
        }
        Ok(options)
    }
}

/// Options map rejected by [`QueryOptions::from_json`] or a builder method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    InvalidValue { key: &'static str, message: String },
}

impl OptionsError {
    fn invalid(key: &'static str, message: String) -> Self {
        Self::InvalidValue { key, message }
    }
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, message } => write!(f, "invalid option `{key}`: {message}"),
        }
    }
}

impl Error for OptionsError {}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawField {
    Flag(bool),
    Position(usize),
}

#[derive(Deserialize)]
struct RawFilter {
    #[serde(default = "default_operator")]
    operator: ComparisonOperator,
    field: RawField,
    #[serde(default = "default_filter_value")]
    value: Value,
}

fn default_operator() -> ComparisonOperator {
    ComparisonOperator::Eq
}

fn default_filter_value() -> Value {
    Value::Bool(true)
}

fn parse_filter(value: &Value) -> Result<FilterSpec, OptionsError> {
    let raw: RawFilter = serde_json::from_value(value.clone())
        .map_err(|err| OptionsError::invalid("filter", err.to_string()))?;
    let field = match raw.field {
        RawField::Flag(true) => FieldSelector::Always,
        RawField::Flag(false) => {
            return Err(OptionsError::invalid(
                "filter",
                "field must be `true` or a positive attribute position".to_string(),
            ))
        }
        RawField::Position(position) => FieldSelector::Position(position),
    };
    Ok(FilterSpec::new(raw.operator, field, raw.value))
}

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn as_u64(key: &'static str, value: &Value) -> Result<u64, OptionsError> {
    value.as_u64().ok_or_else(|| {
        OptionsError::invalid(key, format!("expected a positive integer, got `{value}`"))
    })
}

fn positive(key: &'static str, value: u64) -> Result<NonZeroU32, OptionsError> {
    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| OptionsError::invalid(key, format!("must be in 1..={}, got {value}", u32::MAX)))
}

fn non_zero_or_min(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}
