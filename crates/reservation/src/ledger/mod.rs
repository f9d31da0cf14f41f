//! Invariant-checked ledger updaters.
//!
//! These run inside the unit of work opened by a public operation and never
//! open one themselves.

pub mod demand;
pub mod location;
pub mod movement;
