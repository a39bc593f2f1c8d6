//! Domain-agnostic data model for reference resolution.
//!
//! # Responsibility
//! - Define the canonical reference form and its string codec.
//! - Define entity/record shapes, calling context and query options.
//!
//! # Invariants
//! - Every addressable object resolves to exactly one `(scope, Identifier)`.
//! - Options are validated once, when constructed.

pub mod context;
pub mod options;
pub mod record;
pub mod reference;
