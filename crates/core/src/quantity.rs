//! Quantity type used by every ledger field.

use rust_decimal::Decimal;

/// Exact decimal quantity (stock units, never floating point).
pub type Quantity = Decimal;

/// Clamp a quantity at zero.
pub fn non_negative(qty: Quantity) -> Quantity {
    qty.max(Decimal::ZERO)
}
