pub mod fields;
pub mod matches;
pub mod teams;
