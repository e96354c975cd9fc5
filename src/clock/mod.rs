pub mod cache;
pub mod engine;
pub mod state;
pub mod time_source;

pub use cache::ClockCache;
pub use engine::{apply, evaluate, ClockReading, Evaluation, Transition};
pub use state::ClockState;
pub use time_source::{ManualClock, SystemClock, TimeSource};
