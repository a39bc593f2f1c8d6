//! Canonical reference model and string codec.
//!
//! # Responsibility
//! - Define the single canonical in-memory form `(scope, Identifier)`.
//! - Resolve every supported input shape into that form.
//! - Encode/decode the external `ref.<sref>.<identifier>` string form.
//!
//! # Invariants
//! - Entity and record inputs never survive resolution; only their stored
//!   identifier is kept.
//! - Identifier text is unambiguous: numbers are bare decimals, symbols are
//!   bare names that cannot start with a digit, encoded strings are quoted.
//! - `resolve(scope, encode(r)) == r` for every canonical `r`.

use crate::model::record::{Entity, Record};
use crate::registry::SrefRegistry;
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Fixed head of every external reference string.
pub const REFERENCE_STRING_HEAD: &str = "ref";

static SYMBOL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_@-]*$").expect("valid symbol name regex"));

static SYMBOL_POOL: Lazy<Mutex<BTreeSet<Arc<str>>>> = Lazy::new(|| Mutex::new(BTreeSet::new()));

/// Names interned before new symbols stop being pooled.
pub const MAX_INTERNED_SYMBOLS: usize = 65_536;

/// Interned symbolic identifier.
///
/// Equal names share one allocation while the pool has room. Decoding
/// reference strings interns their symbol names, so the pool is capped at
/// [`MAX_INTERNED_SYMBOLS`]; past that, new names get their own allocation
/// and still compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

/// Symbol name rejected by [`Symbol::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSymbol(pub String);

impl Display for InvalidSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid symbol `{}`; expected [A-Za-z_][A-Za-z0-9_@-]*",
            self.0
        )
    }
}

impl Error for InvalidSymbol {}

impl Symbol {
    /// Validates `name` and returns its symbol, interning it when the pool
    /// has room.
    pub fn new(name: &str) -> Result<Self, InvalidSymbol> {
        if !SYMBOL_NAME_RE.is_match(name) {
            return Err(InvalidSymbol(name.to_string()));
        }
        Ok(Self(intern(&SYMBOL_POOL, name, MAX_INTERNED_SYMBOLS)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn intern(pool: &Mutex<BTreeSet<Arc<str>>>, name: &str, capacity: usize) -> Arc<str> {
    let mut pool = pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = pool.get(name) {
        return Arc::clone(existing);
    }
    let symbol: Arc<str> = Arc::from(name);
    if pool.len() < capacity {
        pool.insert(Arc::clone(&symbol));
    }
    symbol
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Symbol {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Symbol::new(&name).map_err(serde::de::Error::custom)
    }
}

/// Canonical identifier carried by a [`Reference`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(i64),
    Symbolic(Symbol),
    Encoded(String),
}

impl Identifier {
    /// Parses identifier text produced by [`Identifier::to_text`].
    ///
    /// Returns `None` for text that is neither a decimal, a quoted string nor
    /// a valid symbol name.
    pub fn parse_text(text: &str) -> Option<Self> {
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            return Some(Self::Encoded(text[1..text.len() - 1].to_string()));
        }
        if let Ok(value) = text.parse::<i64>() {
            return Some(Self::Numeric(value));
        }
        Symbol::new(text).ok().map(Self::Symbolic)
    }

    /// Unambiguous textual form used in reference strings and store keys.
    pub fn to_text(&self) -> String {
        match self {
            Self::Numeric(value) => value.to_string(),
            Self::Symbolic(symbol) => symbol.as_str().to_string(),
            Self::Encoded(text) => format!("\"{text}\""),
        }
    }

    /// Row value stored at the identifier attribute position.
    ///
    /// Numbers stay numeric so range guards compare numerically; symbols and
    /// encoded strings are stored bare so equality guards match the raw text.
    /// The kind is not recoverable from the value alone.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Numeric(value) => Value::from(*value),
            Self::Symbolic(symbol) => Value::String(symbol.as_str().to_string()),
            Self::Encoded(text) => Value::String(text.clone()),
        }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Canonical reference: owning scope plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    scope: &'static str,
    identifier: Identifier,
}

impl Reference {
    pub fn new(scope: &'static str, identifier: Identifier) -> Self {
        Self { scope, identifier }
    }

    pub fn numeric(scope: &'static str, id: i64) -> Self {
        Self::new(scope, Identifier::Numeric(id))
    }

    pub fn symbolic(scope: &'static str, symbol: Symbol) -> Self {
        Self::new(scope, Identifier::Symbolic(symbol))
    }

    pub fn encoded(scope: &'static str, text: impl Into<String>) -> Self {
        Self::new(scope, Identifier::Encoded(text.into()))
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn into_identifier(self) -> Identifier {
        self.identifier
    }
}

/// Every input shape a caller may hand to the resolver.
///
/// Conversions from integers, symbols and strings are provided; entity
/// inputs are built with `ReferenceInput::Entity` directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceInput<E> {
    Numeric(i64),
    Symbolic(Symbol),
    Text(String),
    Reference(Reference),
    Entity(E),
    Record(Record<E>),
    /// Any value the resolver does not understand, kept for diagnostics.
    Unsupported(String),
}

impl<E> ReferenceInput<E> {
    /// Wraps an arbitrary value as unsupported input, keeping its debug form.
    pub fn unsupported(value: impl std::fmt::Debug) -> Self {
        Self::Unsupported(format!("{value:?}"))
    }

    /// Short description of the input used in error messages.
    pub fn describe(&self) -> String
    where
        E: std::fmt::Debug,
    {
        match self {
            Self::Numeric(value) => value.to_string(),
            Self::Symbolic(symbol) => format!(":{symbol}"),
            Self::Text(text) => format!("{text:?}"),
            Self::Reference(reference) => format!("{reference:?}"),
            Self::Entity(entity) => format!("{entity:?}"),
            Self::Record(record) => format!("{record:?}"),
            Self::Unsupported(value) => value.clone(),
        }
    }
}

impl<E> From<i64> for ReferenceInput<E> {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

impl<E> From<i32> for ReferenceInput<E> {
    fn from(value: i32) -> Self {
        Self::Numeric(i64::from(value))
    }
}

impl<E> From<u64> for ReferenceInput<E> {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(id) => Self::Numeric(id),
            Err(_) => Self::unsupported(value),
        }
    }
}

impl<E> From<f64> for ReferenceInput<E> {
    fn from(value: f64) -> Self {
        Self::unsupported(value)
    }
}

impl<E> From<Symbol> for ReferenceInput<E> {
    fn from(value: Symbol) -> Self {
        Self::Symbolic(value)
    }
}

impl<E> From<&str> for ReferenceInput<E> {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<E> From<String> for ReferenceInput<E> {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<E> From<Reference> for ReferenceInput<E> {
    fn from(value: Reference) -> Self {
        Self::Reference(value)
    }
}

impl<E> From<Record<E>> for ReferenceInput<E> {
    fn from(value: Record<E>) -> Self {
        Self::Record(value)
    }
}

/// Resolves any supported input into the canonical reference for `scope`.
///
/// # Errors
/// - `UnsupportedReference` for unsupported values, references owned by a
///   different scope, and prefixed strings whose identifier text is malformed.
/// - `Registry` when `scope` has no registered sref prefix and a string input
///   must be inspected.
pub fn resolve<E: Entity>(
    registry: &SrefRegistry,
    scope: &'static str,
    input: ReferenceInput<E>,
    operation: &'static str,
) -> RepoResult<Reference> {
    match input {
        ReferenceInput::Numeric(id) => Ok(Reference::numeric(scope, id)),
        ReferenceInput::Symbolic(symbol) => Ok(Reference::symbolic(scope, symbol)),
        ReferenceInput::Text(text) => {
            let head = reference_head(registry, scope)?;
            if text.starts_with(head.as_str()) {
                return decode_tail(scope, &text, head.len(), operation);
            }
            Ok(Reference::encoded(scope, text))
        }
        ReferenceInput::Reference(reference) => {
            if reference.scope() != scope {
                return Err(RepoError::unsupported(operation, format!("{reference:?}")));
            }
            Ok(reference)
        }
        ReferenceInput::Entity(entity) => Ok(Reference::new(scope, entity.identifier())),
        ReferenceInput::Record(record) => Ok(Reference::new(scope, record.identifier)),
        ReferenceInput::Unsupported(value) => Err(RepoError::unsupported(operation, value)),
    }
}

/// Encodes a canonical reference as `ref.<sref>.<identifier>`.
pub fn encode(registry: &SrefRegistry, reference: &Reference) -> RepoResult<String> {
    let head = reference_head(registry, reference.scope())?;
    Ok(format!("{head}{}", reference.identifier().to_text()))
}

/// Decodes an external reference string for `scope`.
///
/// # Errors
/// - `UnsupportedReference` when `text` does not carry the scope's prefix or
///   its identifier text is malformed.
pub fn decode(registry: &SrefRegistry, scope: &'static str, text: &str) -> RepoResult<Reference> {
    let head = reference_head(registry, scope)?;
    if !text.starts_with(head.as_str()) {
        return Err(RepoError::unsupported("decode", format!("{text:?}")));
    }
    decode_tail(scope, text, head.len(), "decode")
}

fn reference_head(registry: &SrefRegistry, scope: &'static str) -> RepoResult<String> {
    let prefix = registry.prefix(scope)?;
    Ok(format!("{REFERENCE_STRING_HEAD}.{prefix}."))
}

fn decode_tail(
    scope: &'static str,
    text: &str,
    head_len: usize,
    operation: &'static str,
) -> RepoResult<Reference> {
    Identifier::parse_text(&text[head_len..])
        .map(|identifier| Reference::new(scope, identifier))
        .ok_or_else(|| RepoError::unsupported(operation, format!("{text:?}")))
}
