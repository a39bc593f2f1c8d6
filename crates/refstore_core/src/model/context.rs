//! Calling context threaded through every repository operation.
//!
//! The core never interprets a context; stores may log or authorize on it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who initiated an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "caller")]
pub enum Caller {
    /// Internal call made by the system itself.
    System,
    /// External request on behalf of a named caller.
    Request(String),
}

/// Opaque execution-environment token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingContext {
    pub caller: Caller,
    /// Correlates log lines emitted for one logical request.
    pub request_id: Uuid,
    pub reason: Option<String>,
}

impl CallingContext {
    /// Context for internal system calls.
    pub fn system() -> Self {
        Self {
            caller: Caller::System,
            request_id: Uuid::new_v4(),
            reason: None,
        }
    }

    /// Context for an external request made by `caller`.
    pub fn request(caller: impl Into<String>) -> Self {
        Self {
            caller: Caller::Request(caller.into()),
            request_id: Uuid::new_v4(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Short caller label used in log events.
    pub fn caller_label(&self) -> &str {
        match &self.caller {
            Caller::System => "system",
            Caller::Request(caller) => caller.as_str(),
        }
    }
}
