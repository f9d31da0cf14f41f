//! Reservation configuration flags.

use serde::{Deserialize, Serialize};

/// Flags consumed by the allocation engine.
///
/// Per-cancel-reason reallocation is carried by [`crate::model::CancelReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Global switch. When off, transitions leave reservation ledgers alone.
    pub manage_stock_reservation: bool,
    /// On planning, hand remaining free stock to other waiting lines.
    pub auto_allocate_on_allocation: bool,
    /// On realization, serve waiting lines at the destination from the receipt.
    pub auto_allocate_on_receipt: bool,
    /// Forbid lowering quantities on transfers under an availability request.
    pub block_deallocation_on_availability_request: bool,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            manage_stock_reservation: true,
            auto_allocate_on_allocation: false,
            auto_allocate_on_receipt: false,
            block_deallocation_on_availability_request: false,
        }
    }
}

impl ReservationConfig {
    /// Load flags from `STOCKRES_*` environment variables, falling back to the
    /// defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ReservationConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| {
            lookup(name)
                .and_then(|value| value.trim().parse::<bool>().ok())
                .unwrap_or(default)
        };

        Self {
            manage_stock_reservation: flag(
                "STOCKRES_MANAGE_STOCK_RESERVATION",
                defaults.manage_stock_reservation,
            ),
            auto_allocate_on_allocation: flag(
                "STOCKRES_AUTO_ALLOCATE_ON_ALLOCATION",
                defaults.auto_allocate_on_allocation,
            ),
            auto_allocate_on_receipt: flag(
                "STOCKRES_AUTO_ALLOCATE_ON_RECEIPT",
                defaults.auto_allocate_on_receipt,
            ),
            block_deallocation_on_availability_request: flag(
                "STOCKRES_BLOCK_DEALLOCATION_ON_AVAILABILITY_REQUEST",
                defaults.block_deallocation_on_availability_request,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_defaults_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STOCKRES_AUTO_ALLOCATE_ON_RECEIPT", "true"),
            ("STOCKRES_MANAGE_STOCK_RESERVATION", "maybe"),
            ("STOCKRES_BLOCK_DEALLOCATION_ON_AVAILABILITY_REQUEST", " true "),
        ]);
        let config = ReservationConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert!(config.auto_allocate_on_receipt);
        assert!(config.manage_stock_reservation);
        assert!(config.block_deallocation_on_availability_request);
        assert!(!config.auto_allocate_on_allocation);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ReservationConfig =
            serde_json::from_str(r#"{ "auto_allocate_on_allocation": true }"#).unwrap();
        assert!(config.auto_allocate_on_allocation);
        assert!(config.manage_stock_reservation);
        assert!(!config.auto_allocate_on_receipt);
    }
}
