//! Query-side value objects consumed by an external filtering layer.
//!
//! The tree engine never evaluates criteria; it only defines and validates
//! their shape.

pub mod criterion;
