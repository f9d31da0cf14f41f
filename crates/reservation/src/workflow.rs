//! Transfer status orchestrator and reallocation policy.
//!
//! On every status change of a transfer, reservations of its lines are
//! granted (planning), released (realization, cancellation) and optionally
//! handed over to other waiting lines. Lines are processed in ascending id
//! order and re-read at every step, since reallocation may touch siblings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use stockres_core::quantity::non_negative;
use stockres_core::{
    LocationId, MovementLineId, ProductId, Quantity, ReservationError, ReservationResult, TransferId,
};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::{LocationLine, LocationLineKey, MovementLine, Transfer, TransferStatus};

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Move `transfer` to `target` and update every reservation ledger it
    /// touches. Nothing is kept if any step fails.
    #[instrument(skip(self))]
    pub fn update_reserved_quantity(&self, transfer: TransferId, target: TransferStatus) -> ReservationResult<()> {
        self.atomically("update_reserved_quantity", || self.transition(&transfer, target))
    }

    /// Spread `qty` (ledger unit) of a location over its waiting lines, never
    /// more than is free and still requested there. Returns what was actually
    /// allocated.
    #[instrument(skip(self))]
    pub fn allocate_reserved_qty_in_waiting_lines(
        &self,
        qty: Quantity,
        location: LocationId,
        product: ProductId,
    ) -> ReservationResult<Quantity> {
        self.atomically("allocate_reserved_qty_in_waiting_lines", || {
            if !self.is_stock_managed(&product)? || qty <= Decimal::ZERO {
                return Ok(Decimal::ZERO);
            }
            let ledger = self.store().get_or_create_location_line(&location, &product);
            let (ledger, pool) = self.reallocation_pool(&ledger.key, qty)?;
            if pool <= Decimal::ZERO {
                return Ok(Decimal::ZERO);
            }
            let allocated = self.allocate_in_waiting_lines(pool, &ledger, None)?;
            self.recompute_location_reserved(&ledger.key)?;
            Ok(allocated)
        })
    }

    /// Take `amount` (line unit) of reservation off a line that was split,
    /// keeping the demand and source ledgers in line.
    #[instrument(skip(self))]
    pub fn deallocate_after_split(&self, line: MovementLineId, amount: Quantity) -> ReservationResult<MovementLine> {
        self.atomically("deallocate_after_split", || {
            let mut line = self.load_movement_line(&line)?;
            if !self.is_stock_managed(&line.product_id)? {
                return Ok(line);
            }
            if amount < Decimal::ZERO || amount > line.reserved_qty {
                return Err(ReservationError::inconsistency(format!(
                    "cannot take {amount} off the {} reserved on line {}",
                    line.reserved_qty, line.id
                )));
            }
            line.reserved_qty -= amount;
            self.store().upsert_movement_line(line.clone());
            if let Some(demand_id) = line.demand_line_id {
                self.recompute_demand_reserved(&demand_id)?;
            }
            let transfer = self.load_transfer(&line.transfer_id)?;
            if let Some(ledger) = self
                .store()
                .location_line(&transfer.from_location, &line.product_id)
            {
                self.recompute_location_reserved(&ledger.key)?;
            }
            debug!(line = %line.id, amount = %amount, "reservation reduced after split");
            Ok(line)
        })
    }

    fn transition(&self, id: &TransferId, target: TransferStatus) -> ReservationResult<()> {
        let mut transfer = self.load_transfer(id)?;
        let from_status = transfer.status;
        if !from_status.can_transition_to(target) {
            return Err(ReservationError::inconsistency(format!(
                "transfer {} cannot go from {from_status} to {target}",
                transfer.reference
            )));
        }

        if !self.config().manage_stock_reservation {
            transfer.status = target;
            self.store().upsert_transfer(transfer);
            return Ok(());
        }

        let mut lines = Vec::with_capacity(transfer.line_ids.len());
        for line_id in &transfer.line_ids {
            let line = self.load_movement_line(line_id)?;
            if self.is_stock_managed(&line.product_id)? {
                lines.push(line);
            }
        }
        lines.sort_by_key(|line| line.id);

        // Everything is validated before the first write.
        let mut clamped = Vec::new();
        for line in &mut lines {
            if target == TransferStatus::Planned && line.requested_reserved_qty > line.reservable_qty() {
                let excess = line.requested_reserved_qty - line.reservable_qty();
                line.requested_reserved_qty = line.reservable_qty();
                clamped.push((line.id, excess));
            }
            check_line_quantities(line)?;
        }

        transfer.status = target;
        self.store().upsert_transfer(transfer.clone());

        for (line_id, excess) in clamped {
            let Some(line) = lines.iter().find(|line| line.id == line_id) else {
                continue;
            };
            self.store().upsert_movement_line(line.clone());
            let ledger = self
                .store()
                .get_or_create_location_line(&transfer.from_location, &line.product_id);
            self.shift_location_requested(&ledger.key, line, -excess)?;
            debug!(line = %line.id, excess = %excess, "requested quantity clamped to planned quantity");
        }

        if target == TransferStatus::Realized {
            for line in consolidate_reserved(&mut lines) {
                self.store().upsert_movement_line(line);
            }
        }

        let from = self.load_location(&transfer.from_location)?;
        let to = self.load_location(&transfer.to_location)?;
        for line_id in lines.iter().map(|line| line.id) {
            if !from.is_virtual() {
                let line = self.load_movement_line(&line_id)?;
                self.update_source_location(&transfer, &line, target)?;
            }
            if !to.is_virtual() {
                let line = self.load_movement_line(&line_id)?;
                self.update_destination_location(&transfer, &line, target)?;
            }
        }

        info!(
            transfer = %transfer.reference,
            from = %from_status,
            to = %target,
            lines = lines.len(),
            "transfer reservations updated"
        );
        Ok(())
    }

    fn update_source_location(
        &self,
        transfer: &Transfer,
        line: &MovementLine,
        target: TransferStatus,
    ) -> ReservationResult<()> {
        let ledger = self
            .store()
            .get_or_create_location_line(&transfer.from_location, &line.product_id);

        if target.is_terminal() {
            let released = line.reserved_qty;
            if target == TransferStatus::Canceled && transfer.reallocates_on_cancel() && released > Decimal::ZERO {
                self.reallocate(line, &ledger, released)?;
            }
            if !released.is_zero() {
                self.add_reserved_from_movement_line(&line.id, -released)?;
            }
            self.settle_demand(line, target)?;
        } else {
            let wanted = self.convert(
                line.unit.as_ref(),
                ledger.unit.as_ref(),
                line.outstanding_qty(),
                &line.product_id,
            )?;
            let granted = self.convert(
                ledger.unit.as_ref(),
                line.unit.as_ref(),
                ledger.grantable_qty(wanted),
                &line.product_id,
            )?;
            if granted > Decimal::ZERO {
                self.add_reserved_from_movement_line(&line.id, granted)?;
            }
            debug!(line = %line.id, wanted = %wanted, granted = %granted, "reservation granted on planning");

            if self.config().auto_allocate_on_allocation {
                let free = self.convert(
                    ledger.unit.as_ref(),
                    line.unit.as_ref(),
                    ledger.free_qty(),
                    &line.product_id,
                )?;
                let left = free - granted;
                if left > Decimal::ZERO {
                    self.reallocate(line, &ledger, left)?;
                }
            }
        }

        self.recompute_location_reserved(&ledger.key)?;
        let ledger = self.recompute_location_requested(&ledger.key)?;
        let line = self.load_movement_line(&line.id)?;
        self.check_reserved_qty_stocks(&ledger, &line, target)
    }

    fn update_destination_location(
        &self,
        transfer: &Transfer,
        line: &MovementLine,
        target: TransferStatus,
    ) -> ReservationResult<()> {
        let Some(ledger) = self
            .store()
            .location_line(&transfer.to_location, &line.product_id)
        else {
            return Ok(());
        };
        if target == TransferStatus::Realized
            && self.config().auto_allocate_on_receipt
            && line.real_qty > Decimal::ZERO
        {
            self.reallocate(line, &ledger, line.real_qty)?;
        }
        let ledger = self.recompute_location_requested(&ledger.key)?;
        self.check_reserved_qty_stocks(&ledger, line, target)
    }

    /// Keep the demand's request floor at its delivered quantity.
    fn settle_demand(&self, line: &MovementLine, target: TransferStatus) -> ReservationResult<()> {
        let Some(demand_id) = line.demand_line_id else {
            return Ok(());
        };
        let mut demand = self.load_demand_line(&demand_id)?;
        let floor = match target {
            TransferStatus::Realized => demand.requested_reserved_qty.max(demand.delivered_qty),
            TransferStatus::Canceled if !demand.is_qty_requested => demand.delivered_qty,
            _ => return Ok(()),
        };
        if floor != demand.requested_reserved_qty {
            demand.requested_reserved_qty = floor;
            self.store().upsert_demand_line(demand);
        }
        Ok(())
    }

    /// Offer `qty` (unit of `origin`) at `ledger`'s location to waiting
    /// lines, bounded by free stock and by what the location still has
    /// requested and not reserved.
    fn reallocate(&self, origin: &MovementLine, ledger: &LocationLine, qty: Quantity) -> ReservationResult<Quantity> {
        let qty = self.convert(
            origin.unit.as_ref(),
            ledger.unit.as_ref(),
            qty,
            &origin.product_id,
        )?;
        let (ledger, pool) = self.reallocation_pool(&ledger.key, qty)?;
        if pool <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let allocated = self.allocate_in_waiting_lines(pool, &ledger, Some(origin))?;
        self.recompute_location_reserved(&ledger.key)?;
        debug!(origin = %origin.id, pool = %pool, allocated = %allocated, "quantity reallocated");
        Ok(allocated)
    }

    /// Freshly recomputed ledger and the part of `qty` (ledger unit) it can
    /// hand out: free and still requested there.
    fn reallocation_pool(&self, key: &LocationLineKey, qty: Quantity) -> ReservationResult<(LocationLine, Quantity)> {
        let ledger = self.recompute_location_reserved(key)?;
        let pool = qty
            .min(ledger.unallocated_requested_qty())
            .min(ledger.free_qty());
        Ok((ledger, pool))
    }

    /// Give each waiting line `min(left, outstanding)` in query order, lines
    /// of the origin's transfer first. `qty` is in the ledger's unit.
    pub(crate) fn allocate_in_waiting_lines(
        &self,
        qty: Quantity,
        ledger: &LocationLine,
        origin: Option<&MovementLine>,
    ) -> ReservationResult<Quantity> {
        let mut candidates = self
            .store()
            .waiting_movement_lines(&ledger.location_id(), &ledger.product_id());
        if let Some(origin) = origin {
            candidates.sort_by_key(|line| line.transfer_id != origin.transfer_id);
        }

        let mut left = qty;
        for line in candidates {
            if left <= Decimal::ZERO {
                break;
            }
            let available = self.convert(
                ledger.unit.as_ref(),
                line.unit.as_ref(),
                left,
                &line.product_id,
            )?;
            let give = available.min(line.outstanding_qty());
            if give <= Decimal::ZERO {
                continue;
            }
            self.add_reserved_from_movement_line(&line.id, give)?;
            left -= self.convert(
                line.unit.as_ref(),
                ledger.unit.as_ref(),
                give,
                &line.product_id,
            )?;
            debug!(line = %line.id, given = %give, "waiting line allocated");
        }
        Ok(qty - non_negative(left))
    }

    /// After realization or cancellation, a location must not hold more
    /// reservations than stock.
    fn check_reserved_qty_stocks(
        &self,
        ledger: &LocationLine,
        line: &MovementLine,
        target: TransferStatus,
    ) -> ReservationResult<()> {
        if !target.is_terminal() || ledger.reserved_qty <= ledger.current_qty {
            return Ok(());
        }
        let real = self.convert(
            line.unit.as_ref(),
            ledger.unit.as_ref(),
            line.real_qty,
            &line.product_id,
        )?;
        let reserved = self.convert(
            line.unit.as_ref(),
            ledger.unit.as_ref(),
            line.reserved_qty,
            &line.product_id,
        )?;
        let product = self.load_product(&line.product_id)?;
        Err(ReservationError::insufficient_stock(
            product.name,
            real + ledger.current_qty - (reserved + ledger.reserved_qty),
            real - reserved,
        ))
    }
}

fn check_line_quantities(line: &MovementLine) -> ReservationResult<()> {
    if line.requested_reserved_qty < Decimal::ZERO || line.reserved_qty < Decimal::ZERO {
        return Err(ReservationError::inconsistency(format!(
            "line {} carries a negative reservation quantity",
            line.id
        )));
    }
    if line.requested_reserved_qty > line.reservable_qty() {
        return Err(ReservationError::inconsistency(format!(
            "requested quantity {} exceeds planned quantity {} on line {}",
            line.requested_reserved_qty, line.planned_qty, line.id
        )));
    }
    if line.reserved_qty > line.reservable_qty() {
        return Err(ReservationError::inconsistency(format!(
            "reserved quantity {} exceeds planned quantity {} on line {}",
            line.reserved_qty, line.planned_qty, line.id
        )));
    }
    Ok(())
}

/// Move the reserved quantity of same-product lines onto the lowest-id one.
/// Returns the lines that changed.
fn consolidate_reserved(lines: &mut [MovementLine]) -> Vec<MovementLine> {
    let mut by_product: BTreeMap<ProductId, Vec<usize>> = BTreeMap::new();
    for (idx, line) in lines.iter().enumerate() {
        by_product.entry(line.product_id).or_default().push(idx);
    }

    let mut changed = Vec::new();
    for indices in by_product.into_values().filter(|indices| indices.len() > 1) {
        let total: Quantity = indices.iter().map(|&idx| lines[idx].reserved_qty).sum();
        for (pos, &idx) in indices.iter().enumerate() {
            let reserved = if pos == 0 { total } else { Decimal::ZERO };
            if lines[idx].reserved_qty != reserved {
                lines[idx].reserved_qty = reserved;
                changed.push(lines[idx].clone());
            }
        }
    }
    changed
}
