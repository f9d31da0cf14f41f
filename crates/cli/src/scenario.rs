//! Replay scenario format.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockres_core::{DemandLineId, LocationId, MovementLineId, ProductId, Quantity, TransferId, UnitId};
use stockres_infra::{StoreSnapshot, UnitConversionTable};
use stockres_reservation::{LocationUpdate, ReservationConfig, TransferStatus};

/// Seed data plus the operations to replay against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Engine flags. Missing: read from the environment.
    #[serde(default)]
    pub config: Option<ReservationConfig>,
    #[serde(default)]
    pub units: Vec<UnitRatio>,
    /// Decimal places kept by unit conversions.
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub store: StoreSnapshot,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Scenario {
    pub fn unit_table(&self) -> UnitConversionTable {
        let table = self.units.iter().fold(UnitConversionTable::new(), |table, ratio| {
            match ratio.product {
                Some(product) => table.with_product_ratio(
                    product,
                    ratio.from.clone(),
                    ratio.to.clone(),
                    ratio.ratio,
                ),
                None => table.with_ratio(ratio.from.clone(), ratio.to.clone(), ratio.ratio),
            }
        });
        match self.scale {
            Some(scale) => table.with_scale(scale),
            None => table,
        }
    }
}

/// `1 from = ratio to`, optionally for a single product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRatio {
    pub from: UnitId,
    pub to: UnitId,
    pub ratio: Decimal,
    #[serde(default)]
    pub product: Option<ProductId>,
}

/// One engine call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    RequestQty { line: MovementLineId, at: DateTime<Utc> },
    CancelReservation { line: MovementLineId },
    Allocate { line: MovementLineId, at: DateTime<Utc> },
    Deallocate { line: MovementLineId },
    UpdateReservedQty { line: MovementLineId, qty: Quantity },
    UpdateRequestedReservedQty { line: MovementLineId, qty: Quantity },
    DeallocateAfterSplit { line: MovementLineId, amount: Quantity },
    RequestDemandQty { demand: DemandLineId },
    CancelDemandReservation { demand: DemandLineId },
    AllocateDemand { demand: DemandLineId },
    DeallocateDemand { demand: DemandLineId },
    UpdateDemandReservedQty { demand: DemandLineId, qty: Quantity },
    UpdateDemandRequestedReservedQty { demand: DemandLineId, qty: Quantity },
    Transition { transfer: TransferId, status: TransferStatus },
    AllocateAll { location: LocationId, product: ProductId },
    DeallocateAll { location: LocationId, product: ProductId },
    UpdateLocation {
        location: LocationId,
        product: ProductId,
        #[serde(flatten)]
        update: LocationUpdate,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RequestQty { .. } => "request_qty",
            Operation::CancelReservation { .. } => "cancel_reservation",
            Operation::Allocate { .. } => "allocate",
            Operation::Deallocate { .. } => "deallocate",
            Operation::UpdateReservedQty { .. } => "update_reserved_qty",
            Operation::UpdateRequestedReservedQty { .. } => "update_requested_reserved_qty",
            Operation::DeallocateAfterSplit { .. } => "deallocate_after_split",
            Operation::RequestDemandQty { .. } => "request_demand_qty",
            Operation::CancelDemandReservation { .. } => "cancel_demand_reservation",
            Operation::AllocateDemand { .. } => "allocate_demand",
            Operation::DeallocateDemand { .. } => "deallocate_demand",
            Operation::UpdateDemandReservedQty { .. } => "update_demand_reserved_qty",
            Operation::UpdateDemandRequestedReservedQty { .. } => "update_demand_requested_reserved_qty",
            Operation::Transition { .. } => "transition",
            Operation::AllocateAll { .. } => "allocate_all",
            Operation::DeallocateAll { .. } => "deallocate_all",
            Operation::UpdateLocation { .. } => "update_location",
        }
    }
}
