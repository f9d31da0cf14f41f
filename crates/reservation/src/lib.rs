//! `stockres-reservation`: stock reservation allocation engine.
//!
//! Keeps three families of ledgers consistent while transfers move through
//! `draft -> planned -> {realized | canceled}`:
//!
//! - location ledgers (per location and product),
//! - movement lines (per transfer line),
//! - demand lines (per order item, optionally fanned out over several
//!   movement lines).
//!
//! All IO goes through the collaborator traits in [`contract`].

pub mod availability;
pub mod config;
pub mod contract;
pub mod engine;
pub mod facade;
pub mod ledger;
pub mod model;
pub mod workflow;

pub use availability::LocationUpdate;
pub use config::ReservationConfig;
pub use contract::{IdentityConverter, ReservationQuery, StockStore, UnitConverter, UnitOfWork};
pub use engine::ReservationEngine;
pub use model::{
    CancelReason, DemandLine, Location, LocationKind, LocationLine, LocationLineKey, MovementLine,
    Product, Transfer, TransferStatus,
};
