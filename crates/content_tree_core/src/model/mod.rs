//! Domain model for content placed in a location tree.
//!
//! # Responsibility
//! - Define canonical records used by the repositories and services.
//!
//! # Invariants
//! - Ids are assigned by storage and never reused.
//! - Records are plain data; behavior lives in `tree`, `repo` and `service`.

pub mod content;
pub mod location;
