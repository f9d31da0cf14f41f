//! Collaborator contracts consumed by the engine.
//!
//! The engine performs no IO of its own. Persistence, querying, unit
//! conversion and transaction boundaries are injected through these traits.

use std::sync::Arc;

use stockres_core::{
    DemandLineId, LocationId, MovementLineId, ProductId, Quantity, ReservationResult, TransferId,
    UnitId,
};

use crate::model::{
    DemandLine, Location, LocationLine, LocationLineKey, MovementLine, Product, Transfer,
};

/// Record store: id-based lookups and whole-record writes.
pub trait StockStore: Send + Sync {
    fn product(&self, id: &ProductId) -> Option<Product>;
    fn location(&self, id: &LocationId) -> Option<Location>;
    fn transfer(&self, id: &TransferId) -> Option<Transfer>;
    fn movement_line(&self, id: &MovementLineId) -> Option<MovementLine>;
    fn demand_line(&self, id: &DemandLineId) -> Option<DemandLine>;
    fn location_line(&self, location: &LocationId, product: &ProductId) -> Option<LocationLine>;

    /// Fetch the ledger row for (location, product), creating an empty one
    /// (in the product's unit) on first touch.
    fn get_or_create_location_line(&self, location: &LocationId, product: &ProductId) -> LocationLine;

    fn upsert_transfer(&self, transfer: Transfer);
    fn upsert_movement_line(&self, line: MovementLine);
    fn upsert_demand_line(&self, line: DemandLine);
    fn upsert_location_line(&self, line: LocationLine);
}

/// Query contract returning candidate movement lines.
///
/// "Planned" always means: the owning transfer is in `planned` status.
pub trait ReservationQuery: Send + Sync {
    /// Lines leaving `location` for `product` in planned transfers that have
    /// a reservation timestamp and are not fully reserved, ordered by
    /// reservation timestamp, then transfer estimated date, then line id.
    fn waiting_movement_lines(&self, location: &LocationId, product: &ProductId) -> Vec<MovementLine>;

    /// Planned lines linked to a demand line, ascending line id.
    fn planned_movement_lines_for_demand(&self, demand: &DemandLineId) -> Vec<MovementLine>;

    /// Planned lines leaving the ledger's location for its product. With
    /// `exclude_availability_requested`, lines of transfers flagged with an
    /// availability request are left out.
    fn planned_movement_lines_for_location(
        &self,
        key: &LocationLineKey,
        exclude_availability_requested: bool,
    ) -> Vec<MovementLine>;

    /// First planned line linked to a demand line.
    fn planned_movement_line_for_demand(&self, demand: &DemandLineId) -> Option<MovementLine> {
        self.planned_movement_lines_for_demand(demand).into_iter().next()
    }
}

/// Transaction boundary around one top-level engine operation.
///
/// `rollback` discards the writes made since the matching `begin`. Units
/// opened inside another unit commit or roll back on their own.
pub trait UnitOfWork: Send + Sync {
    fn begin(&self);
    fn commit(&self);
    fn rollback(&self);
}

/// Unit of measure conversion. A missing unit on either side is an identity
/// conversion.
pub trait UnitConverter: Send + Sync {
    fn convert(
        &self,
        from: Option<&UnitId>,
        to: Option<&UnitId>,
        qty: Quantity,
        product: &ProductId,
    ) -> ReservationResult<Quantity>;
}

/// Converter for single-unit catalogs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl UnitConverter for IdentityConverter {
    fn convert(
        &self,
        _from: Option<&UnitId>,
        _to: Option<&UnitId>,
        qty: Quantity,
        _product: &ProductId,
    ) -> ReservationResult<Quantity> {
        Ok(qty)
    }
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn product(&self, id: &ProductId) -> Option<Product> {
        (**self).product(id)
    }

    fn location(&self, id: &LocationId) -> Option<Location> {
        (**self).location(id)
    }

    fn transfer(&self, id: &TransferId) -> Option<Transfer> {
        (**self).transfer(id)
    }

    fn movement_line(&self, id: &MovementLineId) -> Option<MovementLine> {
        (**self).movement_line(id)
    }

    fn demand_line(&self, id: &DemandLineId) -> Option<DemandLine> {
        (**self).demand_line(id)
    }

    fn location_line(&self, location: &LocationId, product: &ProductId) -> Option<LocationLine> {
        (**self).location_line(location, product)
    }

    fn get_or_create_location_line(&self, location: &LocationId, product: &ProductId) -> LocationLine {
        (**self).get_or_create_location_line(location, product)
    }

    fn upsert_transfer(&self, transfer: Transfer) {
        (**self).upsert_transfer(transfer)
    }

    fn upsert_movement_line(&self, line: MovementLine) {
        (**self).upsert_movement_line(line)
    }

    fn upsert_demand_line(&self, line: DemandLine) {
        (**self).upsert_demand_line(line)
    }

    fn upsert_location_line(&self, line: LocationLine) {
        (**self).upsert_location_line(line)
    }
}

impl<S> ReservationQuery for Arc<S>
where
    S: ReservationQuery + ?Sized,
{
    fn waiting_movement_lines(&self, location: &LocationId, product: &ProductId) -> Vec<MovementLine> {
        (**self).waiting_movement_lines(location, product)
    }

    fn planned_movement_lines_for_demand(&self, demand: &DemandLineId) -> Vec<MovementLine> {
        (**self).planned_movement_lines_for_demand(demand)
    }

    fn planned_movement_lines_for_location(
        &self,
        key: &LocationLineKey,
        exclude_availability_requested: bool,
    ) -> Vec<MovementLine> {
        (**self).planned_movement_lines_for_location(key, exclude_availability_requested)
    }

    fn planned_movement_line_for_demand(&self, demand: &DemandLineId) -> Option<MovementLine> {
        (**self).planned_movement_line_for_demand(demand)
    }
}

impl<S> UnitOfWork for Arc<S>
where
    S: UnitOfWork + ?Sized,
{
    fn begin(&self) {
        (**self).begin()
    }

    fn commit(&self) {
        (**self).commit()
    }

    fn rollback(&self) {
        (**self).rollback()
    }
}
