pub mod controller;
pub mod events;
pub mod writer;

pub use controller::{ControlError, LiveController, StartOutcome, StartReport};
pub use events::{ClockView, LiveEvent};
pub use writer::StatusWriter;
