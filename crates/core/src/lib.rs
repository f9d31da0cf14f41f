//! `stockres-core`: reservation domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the quantity type and the error taxonomy shared by the engine
//! and its collaborators.

pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;

pub use entity::Entity;
pub use error::{ReservationError, ReservationResult};
pub use id::{DemandLineId, LocationId, MovementLineId, ProductId, TransferId, UnitId};
pub use quantity::Quantity;
