//! Scope → sref prefix registry used by the reference codec.
//!
//! # Responsibility
//! - Map each scope name to the string prefix of its external references.
//! - Optionally expose one process-wide registry populated at startup.
//!
//! # Invariants
//! - Prefixes are unique across scopes and never contain `.`.
//! - The process-wide registry is installed at most once.

use log::info;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SREF_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid sref prefix regex"));

static GLOBAL_REGISTRY: OnceCell<SrefRegistry> = OnceCell::new();

/// Registration/lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidPrefix(String),
    DuplicateScope(String),
    DuplicatePrefix { prefix: String, scope: String },
    ScopeNotFound(String),
    AlreadyInstalled,
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPrefix(value) => write!(f, "sref prefix is invalid: `{value}`"),
            Self::DuplicateScope(scope) => write!(f, "scope already registered: {scope}"),
            Self::DuplicatePrefix { prefix, scope } => {
                write!(f, "sref prefix `{prefix}` already registered by scope {scope}")
            }
            Self::ScopeNotFound(scope) => write!(f, "no sref prefix registered for scope {scope}"),
            Self::AlreadyInstalled => write!(f, "global sref registry already installed"),
        }
    }
}

impl Error for RegistryError {}

/// Registry of sref prefixes keyed by scope name.
#[derive(Debug, Clone, Default)]
pub struct SrefRegistry {
    prefixes: BTreeMap<String, String>,
    scopes: BTreeMap<String, String>,
}

impl SrefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the sref prefix for one scope.
    pub fn register(&mut self, scope: &str, prefix: &str) -> Result<(), RegistryError> {
        let prefix = prefix.trim();
        if !SREF_PREFIX_RE.is_match(prefix) {
            return Err(RegistryError::InvalidPrefix(prefix.to_string()));
        }
        if self.prefixes.contains_key(scope) {
            return Err(RegistryError::DuplicateScope(scope.to_string()));
        }
        if let Some(owner) = self.scopes.get(prefix) {
            return Err(RegistryError::DuplicatePrefix {
                prefix: prefix.to_string(),
                scope: owner.clone(),
            });
        }

        self.prefixes.insert(scope.to_string(), prefix.to_string());
        self.scopes.insert(prefix.to_string(), scope.to_string());
        Ok(())
    }

    /// Builder-style [`SrefRegistry::register`].
    pub fn with(mut self, scope: &str, prefix: &str) -> Result<Self, RegistryError> {
        self.register(scope, prefix)?;
        Ok(self)
    }

    /// Returns the sref prefix registered for `scope`.
    pub fn prefix(&self, scope: &str) -> Result<&str, RegistryError> {
        self.prefixes
            .get(scope)
            .map(String::as_str)
            .ok_or_else(|| RegistryError::ScopeNotFound(scope.to_string()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Installs `self` as the process-wide registry.
    ///
    /// # Errors
    /// - Returns `AlreadyInstalled` on every call after the first.
    pub fn install_global(self) -> Result<&'static SrefRegistry, RegistryError> {
        let scopes = self.len();
        GLOBAL_REGISTRY
            .set(self)
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        info!("event=sref_registry_install module=registry status=ok scopes={scopes}");
        GLOBAL_REGISTRY.get().ok_or(RegistryError::AlreadyInstalled)
    }

    /// Returns the process-wide registry, if one was installed.
    pub fn global() -> Option<&'static SrefRegistry> {
        GLOBAL_REGISTRY.get()
    }
}
