//! Repository-level error taxonomy.

use crate::registry::RegistryError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced by resolution, mapping and query operations.
///
/// Absence is never an error here; lookups return `Ok(None)`.
#[derive(Debug)]
pub enum RepoError {
    /// Input could not be resolved to a canonical reference or mapped value.
    UnsupportedReference {
        operation: &'static str,
        value: String,
    },
    NotImplemented(&'static str),
    /// Table store failure, passed through unchanged.
    Store(StoreError),
    /// Persisted row could not be decoded into a record.
    InvalidData(String),
    Codec(serde_json::Error),
    Registry(RegistryError),
}

impl RepoError {
    pub(crate) fn unsupported(operation: &'static str, value: impl Into<String>) -> Self {
        Self::UnsupportedReference {
            operation,
            value: value.into(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedReference { operation, value } => {
                write!(f, "{operation}: unsupported reference {value}")
            }
            Self::NotImplemented(operation) => write!(f, "{operation} is not implemented"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
            Self::Codec(err) => write!(f, "entity serialization failed: {err}"),
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Codec(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::UnsupportedReference { .. } | Self::NotImplemented(_) | Self::InvalidData(_) => {
                None
            }
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RegistryError> for RepoError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}
