pub mod controller;
pub mod loop_worker;

pub use controller::{DriverController, DriverKind};
pub use loop_worker::DEFAULT_TICK_INTERVAL;
