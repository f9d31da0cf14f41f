//! Public request / cancel / allocate / deallocate verbs.

pub mod demand_line;
pub mod location_line;
pub mod movement_line;
