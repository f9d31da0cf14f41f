//! Reservation-aware stock checks and physical ledger updates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use stockres_core::{
    LocationId, ProductId, Quantity, ReservationError, ReservationResult,
};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::LocationLine;

/// Physical movement applied to a location ledger row.
///
/// `current` movements shift the on-hand quantity together with the
/// reservations that travel with it. `future` movements shift the expected
/// quantity and release the matching reservations in the opposite direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub qty: Quantity,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub future: bool,
    pub increment: bool,
    #[serde(default)]
    pub last_future_movement_date: Option<NaiveDate>,
    #[serde(default)]
    pub reserved_qty: Quantity,
    #[serde(default)]
    pub requested_reserved_qty: Quantity,
}

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Quantity that can still be taken from a location: on-hand minus
    /// reservations when reservations are managed, on-hand otherwise.
    pub fn available_qty(&self, location: LocationId, product: ProductId) -> ReservationResult<Quantity> {
        let Some(ledger) = self.store().location_line(&location, &product) else {
            return Ok(Decimal::ZERO);
        };
        if self.config().manage_stock_reservation && self.is_stock_managed(&product)? {
            Ok(ledger.free_qty())
        } else {
            Ok(ledger.current_qty)
        }
    }

    /// Fail with `InsufficientStock` unless `qty` (ledger unit) can leave the
    /// location.
    pub fn check_if_enough_stock(
        &self,
        location: LocationId,
        product: ProductId,
        qty: Quantity,
    ) -> ReservationResult<()> {
        let ledger = self
            .store()
            .location_line(&location, &product)
            .unwrap_or_else(|| LocationLine::new(location, product, None));
        let product = self.load_product(&product)?;

        if ledger.current_qty < qty {
            return Err(ReservationError::insufficient_stock(
                product.name,
                ledger.current_qty,
                qty,
            ));
        }
        if self.config().manage_stock_reservation && product.stock_managed && ledger.free_qty() < qty {
            return Err(ReservationError::insufficient_stock(
                product.name,
                ledger.free_qty(),
                qty,
            ));
        }
        Ok(())
    }

    /// Part of `requested` the location can still reserve out of its free
    /// stock.
    pub fn compute_real_reserved_qty(
        &self,
        location: LocationId,
        product: ProductId,
        requested: Quantity,
    ) -> ReservationResult<Quantity> {
        Ok(self
            .store()
            .location_line(&location, &product)
            .map(|ledger| ledger.grantable_qty(requested))
            .unwrap_or(Decimal::ZERO))
    }

    /// Apply a physical movement to a ledger row.
    #[instrument(skip(self))]
    pub fn update_location(
        &self,
        location: LocationId,
        product: ProductId,
        update: LocationUpdate,
    ) -> ReservationResult<LocationLine> {
        self.atomically("update_location", || {
            let mut ledger = self.store().get_or_create_location_line(&location, &product);
            let sign = if update.increment {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            if update.current {
                ledger.current_qty += sign * update.qty;
                ledger.reserved_qty += sign * update.reserved_qty;
                ledger.requested_reserved_qty += sign * update.requested_reserved_qty;
            }
            if update.future {
                ledger.future_qty += sign * update.qty;
                ledger.reserved_qty -= sign * update.reserved_qty;
                ledger.requested_reserved_qty -= sign * update.requested_reserved_qty;
                if update.last_future_movement_date.is_some() {
                    ledger.last_future_movement_date = update.last_future_movement_date;
                }
            }

            if ledger.current_qty < Decimal::ZERO {
                return Err(ReservationError::inconsistency(format!(
                    "stock cannot go negative at location {location} ({})",
                    ledger.current_qty
                )));
            }
            if ledger.reserved_qty < Decimal::ZERO || ledger.requested_reserved_qty < Decimal::ZERO {
                return Err(ReservationError::inconsistency(format!(
                    "reservation quantities cannot go negative at location {location}"
                )));
            }
            self.store().upsert_location_line(ledger.clone());
            debug!(
                location = %location,
                product = %product,
                current = %ledger.current_qty,
                future = %ledger.future_qty,
                "location quantities updated"
            );
            Ok(ledger)
        })
    }
}
