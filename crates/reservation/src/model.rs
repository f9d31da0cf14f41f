//! Ledger records: location lines, movement lines, demand lines and transfers.
//!
//! Records reference each other by identifier only. Resolving a reference is
//! always a lookup against the injected store.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockres_core::quantity::non_negative;
use stockres_core::{
    DemandLineId, Entity, LocationId, MovementLineId, ProductId, Quantity, TransferId, UnitId,
};

/// Product master data needed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Only stock-managed products take part in reservations.
    pub stock_managed: bool,
    /// Stock unit; new location ledger rows are kept in this unit.
    #[serde(default)]
    pub unit: Option<UnitId>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Location kind. Virtual locations (suppliers, customers, inventory loss)
/// carry no reservation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Internal,
    External,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub kind: LocationKind,
}

impl Location {
    pub fn is_virtual(&self) -> bool {
        self.kind == LocationKind::Virtual
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Key of a location ledger row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationLineKey {
    pub location_id: LocationId,
    pub product_id: ProductId,
}

/// Per (location, product) stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationLine {
    pub key: LocationLineKey,
    #[serde(default)]
    pub unit: Option<UnitId>,
    #[serde(default)]
    pub current_qty: Quantity,
    #[serde(default)]
    pub future_qty: Quantity,
    #[serde(default)]
    pub reserved_qty: Quantity,
    #[serde(default)]
    pub requested_reserved_qty: Quantity,
    #[serde(default)]
    pub last_future_movement_date: Option<NaiveDate>,
}

impl LocationLine {
    /// Empty ledger row, as created on first touch.
    pub fn new(location_id: LocationId, product_id: ProductId, unit: Option<UnitId>) -> Self {
        Self {
            key: LocationLineKey {
                location_id,
                product_id,
            },
            unit,
            current_qty: Decimal::ZERO,
            future_qty: Decimal::ZERO,
            reserved_qty: Decimal::ZERO,
            requested_reserved_qty: Decimal::ZERO,
            last_future_movement_date: None,
        }
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    /// Physically present quantity not yet reserved (may be negative if the
    /// ledger is over-committed).
    pub fn free_qty(&self) -> Quantity {
        self.current_qty - self.reserved_qty
    }

    /// Requested quantity still waiting for a reservation.
    pub fn unallocated_requested_qty(&self) -> Quantity {
        self.requested_reserved_qty - self.reserved_qty
    }

    /// Portion of `requested` (location unit) that can actually be reserved now.
    pub fn grantable_qty(&self, requested: Quantity) -> Quantity {
        non_negative(self.free_qty().min(requested))
    }
}

impl Entity for LocationLine {
    type Id = LocationLineKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }
}

/// Line of a transfer for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLine {
    pub id: MovementLineId,
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    #[serde(default)]
    pub unit: Option<UnitId>,
    pub planned_qty: Quantity,
    #[serde(default)]
    pub real_qty: Quantity,
    #[serde(default)]
    pub reserved_qty: Quantity,
    #[serde(default)]
    pub requested_reserved_qty: Quantity,
    #[serde(default)]
    pub is_qty_requested: bool,
    #[serde(default)]
    pub reservation_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub demand_line_id: Option<DemandLineId>,
}

impl MovementLine {
    /// Planned quantity floored at zero; the ceiling for requested quantities.
    pub fn reservable_qty(&self) -> Quantity {
        non_negative(self.planned_qty)
    }

    /// Requested quantity not yet reserved, in the line's unit.
    pub fn outstanding_qty(&self) -> Quantity {
        self.requested_reserved_qty - self.reserved_qty
    }

    /// A line waits for allocation once it has been requested and is not yet
    /// fully reserved.
    pub fn is_waiting(&self) -> bool {
        self.reservation_at.is_some() && self.reserved_qty < self.requested_reserved_qty
    }
}

impl Entity for MovementLine {
    type Id = MovementLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Order item whose quantity is carried by one or more movement lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandLine {
    pub id: DemandLineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub unit: Option<UnitId>,
    pub ordered_qty: Quantity,
    #[serde(default)]
    pub delivered_qty: Quantity,
    #[serde(default)]
    pub reserved_qty: Quantity,
    #[serde(default)]
    pub requested_reserved_qty: Quantity,
    #[serde(default)]
    pub is_qty_requested: bool,
}

impl DemandLine {
    /// Ordered quantity not yet delivered.
    pub fn remaining_qty(&self) -> Quantity {
        non_negative(self.ordered_qty - self.delivered_qty)
    }
}

impl Entity for DemandLine {
    type Id = DemandLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Transfer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Draft,
    Planned,
    Realized,
    Canceled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Realized | TransferStatus::Canceled)
    }

    /// `draft -> planned -> {realized | canceled}`; a draft may also be canceled.
    pub fn can_transition_to(self, target: TransferStatus) -> bool {
        matches!(
            (self, target),
            (TransferStatus::Draft, TransferStatus::Planned)
                | (TransferStatus::Draft, TransferStatus::Canceled)
                | (TransferStatus::Planned, TransferStatus::Realized)
                | (TransferStatus::Planned, TransferStatus::Canceled)
        )
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TransferStatus::Draft => "draft",
            TransferStatus::Planned => "planned",
            TransferStatus::Realized => "realized",
            TransferStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReason {
    pub name: String,
    /// Hand the freed reservation to other waiting lines when canceling.
    #[serde(default)]
    pub reallocate_on_cancel: bool,
}

/// Stock transfer: an ordered list of movement lines between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub reference: String,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub status: TransferStatus,
    #[serde(default)]
    pub cancel_reason: Option<CancelReason>,
    #[serde(default)]
    pub availability_request: bool,
    #[serde(default)]
    pub estimated_date: Option<NaiveDate>,
    #[serde(default)]
    pub line_ids: Vec<MovementLineId>,
}

impl Transfer {
    pub fn reallocates_on_cancel(&self) -> bool {
        self.cancel_reason
            .as_ref()
            .map(|reason| reason.reallocate_on_cancel)
            .unwrap_or(false)
    }
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(planned: Decimal, requested: Decimal, reserved: Decimal) -> MovementLine {
        MovementLine {
            id: MovementLineId(1),
            transfer_id: TransferId::new(),
            product_id: ProductId::new(),
            unit: None,
            planned_qty: planned,
            real_qty: planned,
            reserved_qty: reserved,
            requested_reserved_qty: requested,
            is_qty_requested: true,
            reservation_at: None,
            demand_line_id: None,
        }
    }

    #[test]
    fn grantable_qty_is_bounded_by_free_stock_and_never_negative() {
        let mut ledger = LocationLine::new(LocationId::new(), ProductId::new(), None);
        ledger.current_qty = dec!(10);
        ledger.reserved_qty = dec!(7);
        assert_eq!(ledger.grantable_qty(dec!(5)), dec!(3));
        assert_eq!(ledger.grantable_qty(dec!(2)), dec!(2));

        ledger.reserved_qty = dec!(12);
        assert_eq!(ledger.grantable_qty(dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn waiting_requires_timestamp_and_outstanding_quantity() {
        let mut l = line(dec!(10), dec!(10), dec!(4));
        assert!(!l.is_waiting());
        l.reservation_at = Some(Utc::now());
        assert!(l.is_waiting());
        assert_eq!(l.outstanding_qty(), dec!(6));
        l.reserved_qty = dec!(10);
        assert!(!l.is_waiting());
    }

    #[test]
    fn status_machine_only_allows_forward_transitions() {
        use TransferStatus::*;
        assert!(Draft.can_transition_to(Planned));
        assert!(Planned.can_transition_to(Realized));
        assert!(Planned.can_transition_to(Canceled));
        assert!(!Realized.can_transition_to(Planned));
        assert!(!Canceled.can_transition_to(Realized));
        assert!(!Draft.can_transition_to(Realized));
        assert!(Realized.is_terminal() && Canceled.is_terminal());
    }

    #[test]
    fn remaining_qty_floors_at_zero() {
        let demand = DemandLine {
            id: DemandLineId(1),
            product_id: ProductId::new(),
            unit: None,
            ordered_qty: dec!(5),
            delivered_qty: dec!(7),
            reserved_qty: Decimal::ZERO,
            requested_reserved_qty: Decimal::ZERO,
            is_qty_requested: false,
        };
        assert_eq!(demand.remaining_qty(), Decimal::ZERO);
    }
}
