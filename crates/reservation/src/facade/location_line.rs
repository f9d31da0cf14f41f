//! Location ledger verbs.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use stockres_core::{LocationId, ProductId, Quantity, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::{LocationLine, LocationLineKey};

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Hand all free, requested stock of a location to its waiting lines.
    /// Returns the allocated quantity in the ledger's unit.
    #[instrument(skip(self))]
    pub fn allocate_all(&self, location: LocationId, product: ProductId) -> ReservationResult<Quantity> {
        self.atomically("allocate_all", || {
            if !self.is_stock_managed(&product)? {
                return Ok(Decimal::ZERO);
            }
            let ledger = self.store().get_or_create_location_line(&location, &product);
            let qty = ledger
                .requested_reserved_qty
                .min(ledger.current_qty)
                - ledger.reserved_qty;
            if qty <= Decimal::ZERO {
                return Ok(Decimal::ZERO);
            }
            let allocated = self.allocate_in_waiting_lines(qty, &ledger, None)?;
            self.recompute_location_reserved(&ledger.key)?;
            info!(location = %location, product = %product, allocated = %allocated, "location allocated");
            Ok(allocated)
        })
    }

    /// Release every reservation taken on a location. Lines of transfers
    /// under an availability request keep theirs when deallocation is blocked.
    #[instrument(skip(self))]
    pub fn deallocate_all(&self, location: LocationId, product: ProductId) -> ReservationResult<LocationLine> {
        self.atomically("deallocate_all", || {
            let key = LocationLineKey {
                location_id: location,
                product_id: product,
            };
            if !self.is_stock_managed(&product)? {
                return Ok(self.store().get_or_create_location_line(&location, &product));
            }
            let exclude = self.config().block_deallocation_on_availability_request;
            let mut demands = BTreeSet::new();
            let mut released = 0usize;
            for mut line in self.store().planned_movement_lines_for_location(&key, exclude) {
                if line.reserved_qty <= Decimal::ZERO {
                    continue;
                }
                line.reserved_qty = Decimal::ZERO;
                if let Some(demand_id) = line.demand_line_id {
                    demands.insert(demand_id);
                }
                self.store().upsert_movement_line(line);
                released += 1;
            }
            for demand_id in &demands {
                self.recompute_demand_reserved(demand_id)?;
            }
            let ledger = self.recompute_location_reserved(&key)?;
            info!(location = %location, product = %product, released, "location deallocated");
            Ok(ledger)
        })
    }

    /// Rebuild the requested quantity of a ledger row from its planned lines.
    #[instrument(skip(self))]
    pub fn recompute_requested_reserved_qty(
        &self,
        location: LocationId,
        product: ProductId,
    ) -> ReservationResult<LocationLine> {
        self.atomically("recompute_requested_reserved_qty", || {
            self.recompute_location_requested(&LocationLineKey {
                location_id: location,
                product_id: product,
            })
        })
    }

    /// Rebuild the reserved quantity of a ledger row from its planned lines.
    #[instrument(skip(self))]
    pub fn recompute_reserved_qty(&self, location: LocationId, product: ProductId) -> ReservationResult<LocationLine> {
        self.atomically("recompute_reserved_qty", || {
            self.recompute_location_reserved(&LocationLineKey {
                location_id: location,
                product_id: product,
            })
        })
    }
}
