//! Reservation error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the reservation engine.
pub type ReservationResult<T> = Result<T, ReservationError>;

/// Reservation-level error.
///
/// Every variant is a deterministic business failure. Whichever one is raised,
/// the enclosing operation is aborted and none of its ledger writes are kept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// Ledger values are inconsistent with the requested change (negative
    /// quantity, value above its ceiling, missing movement line, requested
    /// quantity below delivered quantity, quantity not available).
    #[error("inconsistency: {0}")]
    Inconsistency(String),

    /// Not enough physically available quantity at a location.
    #[error("not enough available quantity for {product}: available {available}, needed {needed}")]
    InsufficientStock {
        product: String,
        available: Decimal,
        needed: Decimal,
    },

    /// Attempt to reduce a quantity promised under an availability request.
    #[error("availability request lock: {0}")]
    AvailabilityLock(String),

    /// The unit conversion collaborator has no ratio between two units.
    #[error("no unit conversion from {from} to {to}")]
    UnitConversion { from: String, to: String },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced record does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ReservationError {
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::Inconsistency(msg.into())
    }

    pub fn insufficient_stock(product: impl Into<String>, available: Decimal, needed: Decimal) -> Self {
        Self::InsufficientStock {
            product: product.into(),
            available,
            needed,
        }
    }

    pub fn availability_lock(msg: impl Into<String>) -> Self {
        Self::AvailabilityLock(msg.into())
    }

    pub fn unit_conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::UnitConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Stable category name, used in structured logs and replay output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inconsistency(_) => "inconsistency",
            Self::InsufficientStock { .. } => "configuration",
            Self::AvailabilityLock(_) => "availability_lock",
            Self::UnitConversion { .. } => "unit_conversion",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound(_) => "not_found",
        }
    }
}
