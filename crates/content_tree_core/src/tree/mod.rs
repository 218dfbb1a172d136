//! Pure tree algorithms used by the location store.
//!
//! # Responsibility
//! - Encode and rewrite materialized path strings (`path`).
//! - Recompute hidden/invisible flags over a subtree (`visibility`).
//! - Choose replacement main locations (`main_location`).
//!
//! # Invariants
//! - Nothing in this module touches storage; callers apply the results inside
//!   their own transaction.

pub mod main_location;
pub mod path;
pub mod visibility;
