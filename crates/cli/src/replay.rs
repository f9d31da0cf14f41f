//! Scenario replay against an in-memory store.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use stockres_core::ReservationResult;
use stockres_infra::{InMemoryStockStore, StoreSnapshot, UnitConversionTable};
use stockres_reservation::{ReservationConfig, ReservationEngine};

use crate::scenario::{Operation, Scenario};

/// Outcome of one replayed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-step outcomes and the final content of the store.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub config: ReservationConfig,
    pub steps: Vec<StepOutcome>,
    pub store: StoreSnapshot,
}

impl ReplayReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|step| !step.ok).count()
    }
}

/// Replay every operation of `scenario`. A failing operation leaves the store
/// as it was before it; replay goes on with the next one unless `stop_on_error`.
pub fn replay(scenario: Scenario, stop_on_error: bool) -> ReplayReport {
    let config = scenario.config.unwrap_or_else(ReservationConfig::from_env);
    let units = scenario.unit_table();
    let store = Arc::new(InMemoryStockStore::from_snapshot(scenario.store));
    let engine = ReservationEngine::new(store.clone(), units, config);

    let mut steps = Vec::with_capacity(scenario.operations.len());
    for (step, operation) in scenario.operations.into_iter().enumerate() {
        let op = operation.name();
        let outcome = match apply(&engine, operation) {
            Ok(()) => StepOutcome {
                step,
                op,
                ok: true,
                error_kind: None,
                error: None,
            },
            Err(err) => {
                warn!(step, op, kind = err.kind(), error = %err, "replayed operation failed");
                StepOutcome {
                    step,
                    op,
                    ok: false,
                    error_kind: Some(err.kind()),
                    error: Some(err.to_string()),
                }
            }
        };
        let failed = !outcome.ok;
        steps.push(outcome);
        if failed && stop_on_error {
            break;
        }
    }

    let report = ReplayReport {
        config,
        steps,
        store: store.snapshot(),
    };
    info!(steps = report.steps.len(), failures = report.failures(), "scenario replayed");
    report
}

fn apply(
    engine: &ReservationEngine<Arc<InMemoryStockStore>, UnitConversionTable>,
    operation: Operation,
) -> ReservationResult<()> {
    match operation {
        Operation::RequestQty { line, at } => engine.request_qty(line, at).map(drop),
        Operation::CancelReservation { line } => engine.cancel_reservation(line).map(drop),
        Operation::Allocate { line, at } => engine.allocate(line, at).map(drop),
        Operation::Deallocate { line } => engine.deallocate(line).map(drop),
        Operation::UpdateReservedQty { line, qty } => engine.update_reserved_qty(line, qty).map(drop),
        Operation::UpdateRequestedReservedQty { line, qty } => {
            engine.update_requested_reserved_qty(line, qty).map(drop)
        }
        Operation::DeallocateAfterSplit { line, amount } => {
            engine.deallocate_after_split(line, amount).map(drop)
        }
        Operation::RequestDemandQty { demand } => engine.request_demand_qty(demand).map(drop),
        Operation::CancelDemandReservation { demand } => engine.cancel_demand_reservation(demand).map(drop),
        Operation::AllocateDemand { demand } => engine.allocate_demand(demand).map(drop),
        Operation::DeallocateDemand { demand } => engine.deallocate_demand(demand).map(drop),
        Operation::UpdateDemandReservedQty { demand, qty } => {
            engine.update_demand_reserved_qty(demand, qty).map(drop)
        }
        Operation::UpdateDemandRequestedReservedQty { demand, qty } => {
            engine.update_demand_requested_reserved_qty(demand, qty).map(drop)
        }
        Operation::Transition { transfer, status } => engine.update_reserved_quantity(transfer, status),
        Operation::AllocateAll { location, product } => engine.allocate_all(location, product).map(drop),
        Operation::DeallocateAll { location, product } => engine.deallocate_all(location, product).map(drop),
        Operation::UpdateLocation {
            location,
            product,
            update,
        } => engine.update_location(location, product, update).map(drop),
    }
}
