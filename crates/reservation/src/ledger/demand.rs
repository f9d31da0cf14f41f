//! Demand line updater.
//!
//! A demand line fans out over its planned movement lines in ascending line
//! id order. Its reserved quantity is always the converted sum of theirs.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::debug;

use stockres_core::quantity::non_negative;
use stockres_core::{DemandLineId, Quantity, ReservationError, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::{ReservationEngine, check_before_updating_qties};
use crate::model::{DemandLine, LocationLineKey};

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    pub(crate) fn recompute_demand_reserved(
        &self,
        id: &DemandLineId,
    ) -> ReservationResult<DemandLine> {
        let mut demand = self.load_demand_line(id)?;
        let lines = self.store().planned_movement_lines_for_demand(id);
        let reserved = lines.iter().try_fold(Decimal::ZERO, |acc, line| {
            let qty = self.convert(
                line.unit.as_ref(),
                demand.unit.as_ref(),
                line.reserved_qty,
                &line.product_id,
            )?;
            Ok::<_, ReservationError>(acc + qty)
        })?;
        demand.reserved_qty = reserved;
        self.store().upsert_demand_line(demand.clone());
        Ok(demand)
    }

    /// Distribute `new` (demand unit) over the demand's planned lines.
    pub(crate) fn set_demand_reserved_qty(
        &self,
        demand: DemandLine,
        new: Quantity,
    ) -> ReservationResult<DemandLine> {
        if !self.is_stock_managed(&demand.product_id)? {
            return Ok(demand);
        }
        let first = self.store().planned_movement_line_for_demand(&demand.id);
        let first = check_before_updating_qties(first, new)?;
        if new > demand.remaining_qty() {
            return Err(ReservationError::inconsistency(format!(
                "allocated quantity {new} exceeds remaining ordered quantity {} on demand {}",
                demand.remaining_qty(),
                demand.id
            )));
        }
        let transfer = self.load_transfer(&first.transfer_id)?;
        self.check_availability_request(&transfer, demand.reserved_qty, new)?;

        let ledger = self
            .store()
            .get_or_create_location_line(&transfer.from_location, &demand.product_id);
        let diff = self.convert(
            demand.unit.as_ref(),
            ledger.unit.as_ref(),
            new - demand.reserved_qty,
            &demand.product_id,
        )?;
        if diff > Decimal::ZERO && ledger.free_qty() < diff {
            return Err(ReservationError::inconsistency(format!(
                "quantity not available: {} free, {diff} needed",
                ledger.free_qty()
            )));
        }

        let ceiling = new + demand.delivered_qty;
        if ceiling > demand.requested_reserved_qty && new > Decimal::ZERO {
            self.set_demand_requested_qty(demand.clone(), ceiling)?;
        }

        let mut touched = BTreeSet::new();
        let mut left = new;
        for mut line in self.store().planned_movement_lines_for_demand(&demand.id) {
            let wanted = self.convert(
                demand.unit.as_ref(),
                line.unit.as_ref(),
                non_negative(left),
                &line.product_id,
            )?;
            let reserved = non_negative(line.requested_reserved_qty.min(wanted));
            left -= self.convert(
                line.unit.as_ref(),
                demand.unit.as_ref(),
                reserved,
                &line.product_id,
            )?;
            if reserved != line.reserved_qty {
                line.reserved_qty = reserved;
                self.store().upsert_movement_line(line.clone());
            }
            let from = self.load_transfer(&line.transfer_id)?.from_location;
            touched.insert(LocationLineKey {
                location_id: from,
                product_id: line.product_id,
            });
        }

        let demand = self.recompute_demand_reserved(&demand.id)?;
        for key in &touched {
            self.recompute_location_reserved(key)?;
        }
        debug!(demand = %demand.id, target = %new, reserved = %demand.reserved_qty, "demand reserved quantity set");
        Ok(demand)
    }

    /// Set the demand's requested quantity, spreading everything above the
    /// delivered quantity over its planned lines.
    pub(crate) fn set_demand_requested_qty(
        &self,
        mut demand: DemandLine,
        new: Quantity,
    ) -> ReservationResult<DemandLine> {
        if !self.is_stock_managed(&demand.product_id)? {
            return Ok(demand);
        }
        if new < Decimal::ZERO {
            return Err(ReservationError::inconsistency(format!(
                "requested quantity cannot be negative (got {new})"
            )));
        }
        let Some(first) = self.store().planned_movement_line_for_demand(&demand.id) else {
            demand.requested_reserved_qty = new;
            self.store().upsert_demand_line(demand.clone());
            return Ok(demand);
        };
        let spread = new - demand.delivered_qty;
        if spread < Decimal::ZERO {
            return Err(ReservationError::inconsistency(format!(
                "requested quantity {new} is below delivered quantity {} on demand {}",
                demand.delivered_qty, demand.id
            )));
        }
        let transfer = self.load_transfer(&first.transfer_id)?;
        self.check_availability_request(&transfer, demand.requested_reserved_qty, new)?;

        let mut left = spread;
        let mut over_reserved = false;
        for mut line in self.store().planned_movement_lines_for_demand(&demand.id) {
            let wanted = self.convert(
                demand.unit.as_ref(),
                line.unit.as_ref(),
                non_negative(left),
                &line.product_id,
            )?;
            let requested = non_negative(line.reservable_qty().min(wanted));
            left -= self.convert(
                line.unit.as_ref(),
                demand.unit.as_ref(),
                requested,
                &line.product_id,
            )?;

            let diff = requested - line.requested_reserved_qty;
            if !diff.is_zero() {
                let from = self.load_transfer(&line.transfer_id)?.from_location;
                let key = LocationLineKey {
                    location_id: from,
                    product_id: line.product_id,
                };
                self.shift_location_requested(&key, &line, diff)?;
                line.requested_reserved_qty = requested;
                self.store().upsert_movement_line(line.clone());
            }
            over_reserved |= line.reserved_qty > line.requested_reserved_qty;
        }

        demand.requested_reserved_qty = new - non_negative(left);
        self.store().upsert_demand_line(demand.clone());
        debug!(demand = %demand.id, target = %new, requested = %demand.requested_reserved_qty, "demand requested quantity set");

        let allocated = demand.requested_reserved_qty - demand.delivered_qty;
        if allocated < demand.reserved_qty || over_reserved {
            let target = demand.reserved_qty.min(allocated);
            demand = self.set_demand_reserved_qty(demand, target)?;
        }
        Ok(demand)
    }
}
