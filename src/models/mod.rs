pub mod category;
pub mod field;
pub mod fixture;

pub use category::{Category, CategoryRules};
pub use field::{FieldConfig, FieldTiming};
pub use fixture::{Match, MatchStatus, Score};
