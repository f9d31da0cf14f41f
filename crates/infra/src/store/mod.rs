//! Record stores backing the reservation engine.

pub mod in_memory;

pub use in_memory::{InMemoryStockStore, StoreSnapshot};
