pub mod board;
pub mod slots;

pub use board::LiveBoard;
pub use slots::{current_slot, next_slot};
