//! Demand line verbs.

use rust_decimal::Decimal;
use tracing::{info, instrument};

use stockres_core::{DemandLineId, Quantity, ReservationError, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::DemandLine;

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Request the whole ordered quantity of a demand line.
    #[instrument(skip(self))]
    pub fn request_demand_qty(&self, id: DemandLineId) -> ReservationResult<DemandLine> {
        self.atomically("request_demand_qty", || self.request_demand(&id))
    }

    /// Drop the request back to the delivered quantity.
    #[instrument(skip(self))]
    pub fn cancel_demand_reservation(&self, id: DemandLineId) -> ReservationResult<DemandLine> {
        self.atomically("cancel_demand_reservation", || self.cancel_demand(&id))
    }

    /// Request, then reserve as much of the remaining quantity as the source
    /// location can give.
    #[instrument(skip(self))]
    pub fn allocate_demand(&self, id: DemandLineId) -> ReservationResult<DemandLine> {
        self.atomically("allocate_demand", || self.allocate_demand_line(&id))
    }

    #[instrument(skip(self))]
    pub fn deallocate_demand(&self, id: DemandLineId) -> ReservationResult<DemandLine> {
        self.atomically("deallocate_demand", || {
            let demand = self.load_demand_line(&id)?;
            self.set_demand_reserved_qty(demand, Decimal::ZERO)
        })
    }

    /// Direct setter for the reserved quantity of a demand line.
    #[instrument(skip(self))]
    pub fn update_demand_reserved_qty(&self, id: DemandLineId, qty: Quantity) -> ReservationResult<DemandLine> {
        self.atomically("update_demand_reserved_qty", || {
            let demand = self.load_demand_line(&id)?;
            self.set_demand_reserved_qty(demand, qty)
        })
    }

    /// Direct setter for the requested quantity of a demand line.
    #[instrument(skip(self))]
    pub fn update_demand_requested_reserved_qty(
        &self,
        id: DemandLineId,
        qty: Quantity,
    ) -> ReservationResult<DemandLine> {
        self.atomically("update_demand_requested_reserved_qty", || {
            let demand = self.load_demand_line(&id)?;
            self.set_demand_requested_qty(demand, qty)
        })
    }

    pub(crate) fn request_demand(&self, id: &DemandLineId) -> ReservationResult<DemandLine> {
        let mut demand = self.load_demand_line(id)?;
        if !self.is_stock_managed(&demand.product_id)? {
            return Ok(demand);
        }
        if demand.ordered_qty < Decimal::ZERO {
            return Err(ReservationError::inconsistency(format!(
                "cannot request a negative quantity ({}) on demand {}",
                demand.ordered_qty, demand.id
            )));
        }
        self.flag_demand_request(&mut demand, true);
        let ordered = demand.ordered_qty;
        let demand = self.set_demand_requested_qty(demand, ordered)?;
        info!(demand = %demand.id, requested = %demand.requested_reserved_qty, "demand line requested");
        Ok(demand)
    }

    pub(crate) fn cancel_demand(&self, id: &DemandLineId) -> ReservationResult<DemandLine> {
        let mut demand = self.load_demand_line(id)?;
        if !self.is_stock_managed(&demand.product_id)? {
            return Ok(demand);
        }
        self.flag_demand_request(&mut demand, false);
        let delivered = demand.delivered_qty;
        let demand = self.set_demand_requested_qty(demand, delivered)?;
        info!(demand = %demand.id, "demand line request canceled");
        Ok(demand)
    }

    pub(crate) fn allocate_demand_line(&self, id: &DemandLineId) -> ReservationResult<DemandLine> {
        let demand = self.request_demand(id)?;
        if !self.is_stock_managed(&demand.product_id)? {
            return Ok(demand);
        }
        let line = self
            .store()
            .planned_movement_line_for_demand(id)
            .ok_or_else(|| {
                ReservationError::inconsistency(format!("demand {id} has no planned movement line"))
            })?;
        let ledger = self.source_location_line(&line)?;
        let free = self.convert(
            ledger.unit.as_ref(),
            demand.unit.as_ref(),
            ledger.free_qty(),
            &demand.product_id,
        )?;
        let target = demand.remaining_qty().min(free + demand.reserved_qty);
        if target <= demand.reserved_qty {
            return Ok(demand);
        }
        let demand = self.set_demand_reserved_qty(demand, target)?;
        info!(demand = %demand.id, reserved = %demand.reserved_qty, "demand line allocated");
        Ok(demand)
    }

    /// Set the request flag on the demand and on its first planned line.
    fn flag_demand_request(&self, demand: &mut DemandLine, requested: bool) {
        demand.is_qty_requested = requested;
        self.store().upsert_demand_line(demand.clone());
        if let Some(mut line) = self.store().planned_movement_line_for_demand(&demand.id) {
            line.is_qty_requested = requested;
            self.store().upsert_movement_line(line);
        }
    }
}
