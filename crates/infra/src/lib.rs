//! Infrastructure layer: in-memory record store and unit conversion table.

pub mod store;
pub mod units;


pub use store::{InMemoryStockStore, StoreSnapshot};
pub use units::UnitConversionTable;
