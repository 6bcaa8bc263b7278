pub mod controller;
pub mod state;

pub use controller::{GestureController, GestureFrame};
pub use state::{CountdownTick, FireDecision, TrackerConfig, TrackerState, TrackerView};
