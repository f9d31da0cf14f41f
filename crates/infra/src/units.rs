//! Ratio-table unit conversion.

use std::collections::HashMap;

use rust_decimal::Decimal;

use stockres_core::{ProductId, Quantity, ReservationError, ReservationResult, UnitId};
use stockres_reservation::UnitConverter;

/// Conversion ratios between units, optionally specific to a product.
///
/// A ratio `r` registered for `(from, to)` means `1 from = r to`. The reverse
/// direction is derived by division. Product-specific ratios win over global
/// ones.
#[derive(Debug, Clone, Default)]
pub struct UnitConversionTable {
    ratios: HashMap<(UnitId, UnitId), Decimal>,
    product_ratios: HashMap<(ProductId, UnitId, UnitId), Decimal>,
    scale: Option<u32>,
}

impl UnitConversionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Round converted quantities to `scale` decimal places.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_ratio(mut self, from: impl Into<UnitId>, to: impl Into<UnitId>, ratio: Decimal) -> Self {
        self.ratios.insert((from.into(), to.into()), ratio);
        self
    }

    pub fn with_product_ratio(
        mut self,
        product: ProductId,
        from: impl Into<UnitId>,
        to: impl Into<UnitId>,
        ratio: Decimal,
    ) -> Self {
        self.product_ratios
            .insert((product, from.into(), to.into()), ratio);
        self
    }

    fn lookup(&self, from: &UnitId, to: &UnitId, product: &ProductId) -> Option<Ratio> {
        let direct = |f: &UnitId, t: &UnitId| {
            self.product_ratios
                .get(&(*product, f.clone(), t.clone()))
                .or_else(|| self.ratios.get(&(f.clone(), t.clone())))
                .copied()
        };
        direct(from, to)
            .map(Ratio::Multiply)
            .or_else(|| direct(to, from).map(Ratio::Divide))
    }
}

enum Ratio {
    Multiply(Decimal),
    Divide(Decimal),
}

impl UnitConverter for UnitConversionTable {
    fn convert(
        &self,
        from: Option<&UnitId>,
        to: Option<&UnitId>,
        qty: Quantity,
        product: &ProductId,
    ) -> ReservationResult<Quantity> {
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(qty);
        };
        if from == to {
            return Ok(qty);
        }
        let converted = match self.lookup(from, to, product) {
            Some(Ratio::Multiply(ratio)) => qty.checked_mul(ratio),
            Some(Ratio::Divide(ratio)) => qty.checked_div(ratio),
            None => None,
        }
        .ok_or_else(|| ReservationError::unit_conversion(from.as_str(), to.as_str()))?;

        Ok(match self.scale {
            Some(scale) => converted.round_dp(scale),
            None => converted,
        })
    }
}
