//! Movement line verbs.
//!
//! Lines linked to a demand line are routed through the demand line facade
//! so that the demand stays the source of truth for its movement lines.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use stockres_core::{MovementLineId, Quantity, ReservationError, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::MovementLine;

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Request the full planned quantity of a line, stamping the request
    /// time that orders waiting lines.
    #[instrument(skip(self))]
    pub fn request_qty(&self, id: MovementLineId, at: DateTime<Utc>) -> ReservationResult<MovementLine> {
        self.atomically("request_qty", || self.request_line(&id, at))
    }

    /// Withdraw the request (and with it any reservation) of a line.
    #[instrument(skip(self))]
    pub fn cancel_reservation(&self, id: MovementLineId) -> ReservationResult<MovementLine> {
        self.atomically("cancel_reservation", || self.cancel_line(&id))
    }

    /// Request, then reserve as much as free stock allows.
    #[instrument(skip(self))]
    pub fn allocate(&self, id: MovementLineId, at: DateTime<Utc>) -> ReservationResult<MovementLine> {
        self.atomically("allocate", || self.allocate_line(&id, at))
    }

    /// Release the reservation of a line, keeping its request.
    #[instrument(skip(self))]
    pub fn deallocate(&self, id: MovementLineId) -> ReservationResult<MovementLine> {
        self.atomically("deallocate", || self.update_line_reserved(&id, Decimal::ZERO))
    }

    /// Direct setter for the reserved quantity of a line.
    #[instrument(skip(self))]
    pub fn update_reserved_qty(&self, id: MovementLineId, qty: Quantity) -> ReservationResult<MovementLine> {
        self.atomically("update_reserved_qty", || self.update_line_reserved(&id, qty))
    }

    /// Direct setter for the requested quantity of a line.
    #[instrument(skip(self))]
    pub fn update_requested_reserved_qty(
        &self,
        id: MovementLineId,
        qty: Quantity,
    ) -> ReservationResult<MovementLine> {
        self.atomically("update_requested_reserved_qty", || self.update_line_requested(&id, qty))
    }

    pub(crate) fn request_line(&self, id: &MovementLineId, at: DateTime<Utc>) -> ReservationResult<MovementLine> {
        let mut line = self.load_movement_line(id)?;
        if !self.is_stock_managed(&line.product_id)? {
            return Ok(line);
        }
        if let Some(demand_id) = line.demand_line_id {
            line.reservation_at = Some(at);
            self.store().upsert_movement_line(line);
            self.request_demand(&demand_id)?;
            return self.load_movement_line(id);
        }
        if line.planned_qty < Decimal::ZERO {
            return Err(ReservationError::inconsistency(format!(
                "cannot request a negative quantity ({}) on line {}",
                line.planned_qty, line.id
            )));
        }
        line.reservation_at = Some(at);
        line.is_qty_requested = true;
        self.store().upsert_movement_line(line.clone());
        let planned = line.planned_qty;
        let line = self.set_movement_requested_qty(line, planned)?;
        info!(line = %line.id, requested = %line.requested_reserved_qty, "movement line requested");
        Ok(line)
    }

    fn cancel_line(&self, id: &MovementLineId) -> ReservationResult<MovementLine> {
        let mut line = self.load_movement_line(id)?;
        if !self.is_stock_managed(&line.product_id)? {
            return Ok(line);
        }
        if let Some(demand_id) = line.demand_line_id {
            line.reservation_at = None;
            self.store().upsert_movement_line(line);
            self.cancel_demand(&demand_id)?;
            return self.load_movement_line(id);
        }
        line.reservation_at = None;
        line.is_qty_requested = false;
        self.store().upsert_movement_line(line.clone());
        let line = self.set_movement_requested_qty(line, Decimal::ZERO)?;
        info!(line = %line.id, "movement line request canceled");
        Ok(line)
    }

    fn allocate_line(&self, id: &MovementLineId, at: DateTime<Utc>) -> ReservationResult<MovementLine> {
        let line = self.load_movement_line(id)?;
        if !self.is_stock_managed(&line.product_id)? {
            return Ok(line);
        }
        if let Some(demand_id) = line.demand_line_id {
            self.request_line(id, at)?;
            self.allocate_demand_line(&demand_id)?;
            return self.load_movement_line(id);
        }

        let line = self.request_line(id, at)?;
        let ledger = self.source_location_line(&line)?;
        let free = self.convert(
            ledger.unit.as_ref(),
            line.unit.as_ref(),
            ledger.free_qty(),
            &line.product_id,
        )?;
        let target = line.reservable_qty().min(free + line.reserved_qty);
        if target <= line.reserved_qty {
            return Ok(line);
        }
        let line = self.set_movement_reserved_qty(line, target)?;
        info!(line = %line.id, reserved = %line.reserved_qty, "movement line allocated");
        Ok(line)
    }

    /// Lines linked to a demand change the demand's request, which is then
    /// spread over its planned lines; `qty` comes on top of what was delivered.
    fn update_line_requested(&self, id: &MovementLineId, qty: Quantity) -> ReservationResult<MovementLine> {
        let line = self.load_movement_line(id)?;
        if !self.is_stock_managed(&line.product_id)? {
            return Ok(line);
        }
        if let Some(demand_id) = line.demand_line_id {
            if qty < Decimal::ZERO {
                return Err(ReservationError::inconsistency(format!(
                    "requested quantity cannot be negative (got {qty})"
                )));
            }
            let demand = self.load_demand_line(&demand_id)?;
            let qty = self.convert(
                line.unit.as_ref(),
                demand.unit.as_ref(),
                qty,
                &line.product_id,
            )?;
            let requested = qty + demand.delivered_qty;
            self.set_demand_requested_qty(demand, requested)?;
            return self.load_movement_line(id);
        }
        self.set_movement_requested_qty(line, qty)
    }

    fn update_line_reserved(&self, id: &MovementLineId, qty: Quantity) -> ReservationResult<MovementLine> {
        let line = self.load_movement_line(id)?;
        if !self.is_stock_managed(&line.product_id)? {
            return Ok(line);
        }
        if let Some(demand_id) = line.demand_line_id {
            let demand = self.load_demand_line(&demand_id)?;
            let qty = self.convert(
                line.unit.as_ref(),
                demand.unit.as_ref(),
                qty,
                &line.product_id,
            )?;
            self.set_demand_reserved_qty(demand, qty)?;
            return self.load_movement_line(id);
        }
        self.set_movement_reserved_qty(line, qty)
    }
}
