//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for the location tree and content records.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Every mutating repository call runs in exactly one transaction.
//! - Repository APIs return semantic errors (`LocationNotFound`,
//!   `CycleDetected`, ...) in addition to DB transport errors.

pub mod content_repo;
pub mod location_repo;
pub(crate) mod schema;
