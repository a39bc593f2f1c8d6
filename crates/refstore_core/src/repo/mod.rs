//! Repository layer: facade, query strategies and their errors.
//!
//! # Responsibility
//! - Expose the reference-aware facade application code calls.
//! - Keep store-level query details behind the `QueryStrategy` seam.
//!
//! # Invariants
//! - Absence is `Ok(None)`; errors are reserved for unsupported input,
//!   unimplemented operations and store failures.
//! - Store errors pass through verbatim.

pub mod error;
pub mod repository;
pub mod strategy;
