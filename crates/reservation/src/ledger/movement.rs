//! Movement line updater.

use rust_decimal::Decimal;
use tracing::debug;

use stockres_core::{MovementLineId, Quantity, ReservationError, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::{ReservationEngine, check_before_updating_qties};
use crate::model::MovementLine;

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Set the requested quantity of a movement line and shift the source
    /// location's requested quantity by the difference.
    ///
    /// When the new requested quantity falls below what is already reserved,
    /// the reservation is pulled down with it.
    pub(crate) fn set_movement_requested_qty(
        &self,
        line: MovementLine,
        new: Quantity,
    ) -> ReservationResult<MovementLine> {
        let mut line = check_before_updating_qties(Some(line), new)?;
        if new > line.reservable_qty() {
            return Err(ReservationError::inconsistency(format!(
                "requested quantity {new} exceeds planned quantity {} on line {}",
                line.planned_qty, line.id
            )));
        }
        let transfer = self.load_transfer(&line.transfer_id)?;
        self.check_availability_request(&transfer, line.requested_reserved_qty, new)?;

        let ledger = self
            .store()
            .get_or_create_location_line(&transfer.from_location, &line.product_id);
        let diff = new - line.requested_reserved_qty;
        self.shift_location_requested(&ledger.key, &line, diff)?;

        line.requested_reserved_qty = new;
        let pulled_down = line.reserved_qty > new;
        if pulled_down {
            line.reserved_qty = new;
        }
        self.store().upsert_movement_line(line.clone());
        debug!(line = %line.id, requested = %new, pulled_down, "movement requested quantity set");

        if pulled_down {
            self.recompute_location_reserved(&ledger.key)?;
            if let Some(demand_id) = line.demand_line_id {
                self.recompute_demand_reserved(&demand_id)?;
            }
        }
        Ok(line)
    }

    /// Set the reserved quantity of a movement line that is not linked to a
    /// demand line.
    pub(crate) fn set_movement_reserved_qty(
        &self,
        line: MovementLine,
        new: Quantity,
    ) -> ReservationResult<MovementLine> {
        let line = check_before_updating_qties(Some(line), new)?;
        let transfer = self.load_transfer(&line.transfer_id)?;
        self.check_availability_request(&transfer, line.reserved_qty, new)?;
        if new > line.reservable_qty() {
            return Err(ReservationError::inconsistency(format!(
                "allocated quantity {new} exceeds planned quantity {} on line {}",
                line.planned_qty, line.id
            )));
        }

        let ledger = self
            .store()
            .get_or_create_location_line(&transfer.from_location, &line.product_id);
        let diff = self.convert(
            line.unit.as_ref(),
            ledger.unit.as_ref(),
            new - line.reserved_qty,
            &line.product_id,
        )?;
        if diff > Decimal::ZERO && ledger.free_qty() < diff {
            return Err(ReservationError::inconsistency(format!(
                "quantity not available: {} free, {diff} needed",
                ledger.free_qty()
            )));
        }

        let mut line = if line.requested_reserved_qty < new && new > Decimal::ZERO {
            let planned = line.reservable_qty();
            self.set_movement_requested_qty(line, planned)?
        } else {
            line
        };
        line.reserved_qty = new;
        self.store().upsert_movement_line(line.clone());
        debug!(line = %line.id, reserved = %new, "movement reserved quantity set");

        self.recompute_location_reserved(&ledger.key)?;
        Ok(line)
    }

    /// Add `delta` (line unit) to a line's reserved quantity and propagate to
    /// the linked demand line.
    pub(crate) fn add_reserved_from_movement_line(
        &self,
        id: &MovementLineId,
        delta: Quantity,
    ) -> ReservationResult<MovementLine> {
        let mut line = self.load_movement_line(id)?;
        let reserved = line.reserved_qty + delta;
        if reserved < Decimal::ZERO {
            return Err(ReservationError::inconsistency(format!(
                "reserved quantity of line {} would become negative ({reserved})",
                line.id
            )));
        }
        line.reserved_qty = reserved;
        self.store().upsert_movement_line(line.clone());
        if let Some(demand_id) = line.demand_line_id {
            self.recompute_demand_reserved(&demand_id)?;
        }
        Ok(line)
    }
}
