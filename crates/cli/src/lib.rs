//! `stockres-replay` support: scenario format and replay driver.

pub mod replay;
pub mod scenario;

pub use replay::{ReplayReport, StepOutcome, replay};
pub use scenario::{Operation, Scenario, UnitRatio};
