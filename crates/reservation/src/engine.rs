//! Reservation engine: injected collaborators plus shared lookups.
//!
//! The engine's operations are spread over several modules, each adding an
//! `impl` block:
//!
//! - `ledger::*`: low-level, invariant-checked ledger updaters
//! - `facade::*`: public request / cancel / allocate / deallocate verbs
//! - `workflow`: the status-transition orchestrator and reallocation policy
//! - `availability`: reservation-aware stock checks
//!
//! Every public operation runs inside one unit of work: either all of its
//! ledger writes are kept, or none are.

use tracing::warn;

use stockres_core::{
    DemandLineId, LocationId, MovementLineId, ProductId, Quantity, ReservationError,
    ReservationResult, TransferId, UnitId,
};

use crate::config::ReservationConfig;
use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::model::{DemandLine, Location, LocationLine, MovementLine, Product, Transfer};

/// Allocation engine over an injected store, query contract and unit converter.
#[derive(Debug, Clone)]
pub struct ReservationEngine<S, U> {
    store: S,
    units: U,
    config: ReservationConfig,
}

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    pub fn new(store: S, units: U, config: ReservationConfig) -> Self {
        Self {
            store,
            units,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Run `op` as one unit of work, discarding its writes on failure.
    pub(crate) fn atomically<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce() -> ReservationResult<T>,
    ) -> ReservationResult<T> {
        self.store.begin();
        match op() {
            Ok(value) => {
                self.store.commit();
                Ok(value)
            }
            Err(err) => {
                self.store.rollback();
                warn!(operation, kind = err.kind(), error = %err, "reservation operation rolled back");
                Err(err)
            }
        }
    }

    pub(crate) fn convert(
        &self,
        from: Option<&UnitId>,
        to: Option<&UnitId>,
        qty: Quantity,
        product: &ProductId,
    ) -> ReservationResult<Quantity> {
        if qty.is_zero() || from == to {
            return Ok(qty);
        }
        self.units.convert(from, to, qty, product)
    }

    pub(crate) fn load_product(&self, id: &ProductId) -> ReservationResult<Product> {
        self.store
            .product(id)
            .ok_or_else(|| ReservationError::not_found(format!("product {id}")))
    }

    pub(crate) fn load_location(&self, id: &LocationId) -> ReservationResult<Location> {
        self.store
            .location(id)
            .ok_or_else(|| ReservationError::not_found(format!("location {id}")))
    }

    pub(crate) fn load_transfer(&self, id: &TransferId) -> ReservationResult<Transfer> {
        self.store
            .transfer(id)
            .ok_or_else(|| ReservationError::not_found(format!("transfer {id}")))
    }

    pub(crate) fn load_movement_line(&self, id: &MovementLineId) -> ReservationResult<MovementLine> {
        self.store
            .movement_line(id)
            .ok_or_else(|| ReservationError::not_found(format!("movement line {id}")))
    }

    pub(crate) fn load_demand_line(&self, id: &DemandLineId) -> ReservationResult<DemandLine> {
        self.store
            .demand_line(id)
            .ok_or_else(|| ReservationError::not_found(format!("demand line {id}")))
    }

    pub(crate) fn is_stock_managed(&self, product: &ProductId) -> ReservationResult<bool> {
        Ok(self.load_product(product)?.stock_managed)
    }

    /// Ledger row of the location the line's transfer leaves from.
    pub(crate) fn source_location_line(&self, line: &MovementLine) -> ReservationResult<LocationLine> {
        let transfer = self.load_transfer(&line.transfer_id)?;
        Ok(self
            .store
            .get_or_create_location_line(&transfer.from_location, &line.product_id))
    }

    /// Reject lowering `current` to `new` on a transfer under an active
    /// availability request.
    pub(crate) fn check_availability_request(
        &self,
        transfer: &Transfer,
        current: Quantity,
        new: Quantity,
    ) -> ReservationResult<()> {
        if self.config.block_deallocation_on_availability_request
            && transfer.availability_request
            && current > new
        {
            return Err(ReservationError::availability_lock(format!(
                "transfer {} is under an availability request: quantity cannot go from {current} to {new}",
                transfer.reference
            )));
        }
        Ok(())
    }
}

/// Shared pre-mutation guard: a movement line must exist and the target
/// quantity must not be negative.
pub(crate) fn check_before_updating_qties(
    line: Option<MovementLine>,
    qty: Quantity,
) -> ReservationResult<MovementLine> {
    let line = line.ok_or_else(|| ReservationError::inconsistency("no planned movement line to reserve on"))?;
    if qty.is_sign_negative() && !qty.is_zero() {
        return Err(ReservationError::inconsistency(format!(
            "reservation quantity cannot be negative (got {qty})"
        )));
    }
    Ok(line)
}
