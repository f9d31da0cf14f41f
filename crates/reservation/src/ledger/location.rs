//! Location ledger updater.
//!
//! Both aggregates are recomputed from scratch over the planned movement
//! lines leaving the location. Incremental deltas elsewhere are best effort;
//! a recompute is the consistency anchor.

use rust_decimal::Decimal;
use tracing::debug;

use stockres_core::quantity::non_negative;
use stockres_core::{Quantity, ReservationResult};

use crate::contract::{ReservationQuery, StockStore, UnitConverter, UnitOfWork};
use crate::engine::ReservationEngine;
use crate::model::{LocationLine, LocationLineKey, MovementLine};

impl<S, U> ReservationEngine<S, U>
where
    S: StockStore + ReservationQuery + UnitOfWork,
    U: UnitConverter,
{
    /// Recompute `requested_reserved_qty` of the ledger row at `key`.
    pub(crate) fn recompute_location_requested(
        &self,
        key: &LocationLineKey,
    ) -> ReservationResult<LocationLine> {
        let mut ledger = self
            .store()
            .get_or_create_location_line(&key.location_id, &key.product_id);
        let requested = self.sum_planned(&ledger, |line| line.requested_reserved_qty)?;
        if requested != ledger.requested_reserved_qty {
            debug!(
                location = %key.location_id,
                product = %key.product_id,
                from = %ledger.requested_reserved_qty,
                to = %requested,
                "location requested quantity recomputed"
            );
        }
        ledger.requested_reserved_qty = requested;
        self.store().upsert_location_line(ledger.clone());
        Ok(ledger)
    }

    /// Recompute `reserved_qty` of the ledger row at `key`.
    pub(crate) fn recompute_location_reserved(
        &self,
        key: &LocationLineKey,
    ) -> ReservationResult<LocationLine> {
        let mut ledger = self
            .store()
            .get_or_create_location_line(&key.location_id, &key.product_id);
        let reserved = self.sum_planned(&ledger, |line| line.reserved_qty)?;
        if reserved != ledger.reserved_qty {
            debug!(
                location = %key.location_id,
                product = %key.product_id,
                from = %ledger.reserved_qty,
                to = %reserved,
                "location reserved quantity recomputed"
            );
        }
        ledger.reserved_qty = reserved;
        self.store().upsert_location_line(ledger.clone());
        Ok(ledger)
    }

    /// Shift the ledger's requested quantity by `delta_mv`, expressed in the
    /// unit of `line`. Floors at zero; the next recompute corrects any drift.
    pub(crate) fn shift_location_requested(
        &self,
        key: &LocationLineKey,
        line: &MovementLine,
        delta_mv: Quantity,
    ) -> ReservationResult<LocationLine> {
        let mut ledger = self
            .store()
            .get_or_create_location_line(&key.location_id, &key.product_id);
        let delta = self.convert(
            line.unit.as_ref(),
            ledger.unit.as_ref(),
            delta_mv,
            &line.product_id,
        )?;
        ledger.requested_reserved_qty = non_negative(ledger.requested_reserved_qty + delta);
        self.store().upsert_location_line(ledger.clone());
        Ok(ledger)
    }

    fn sum_planned(
        &self,
        ledger: &LocationLine,
        field: impl Fn(&MovementLine) -> Quantity,
    ) -> ReservationResult<Quantity> {
        let lines = self
            .store()
            .planned_movement_lines_for_location(&ledger.key, false);
        lines.iter().try_fold(Decimal::ZERO, |acc, line| {
            let qty = self.convert(
                line.unit.as_ref(),
                ledger.unit.as_ref(),
                field(line),
                &line.product_id,
            )?;
            Ok(acc + qty)
        })
    }
}
