//! Whether a category may occupy a field on a given day.

mod checker;

pub use checker::EligibilityChecker;

use chrono::{NaiveDate, NaiveTime};

/// Why a proposed placement was refused. Always recoverable: the caller
/// shows the message and lets the user pick another spot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("unknown field '{field_id}'")]
    UnknownField { field_id: String },

    #[error(
        "category '{category}' is not allowed on {field} on {date}; permitted categories: {}",
        .permitted.join(", ")
    )]
    CategoryNotAllowed {
        category: String,
        field: String,
        date: NaiveDate,
        permitted: Vec<String>,
    },

    #[error("{field} is occupied at {slot} on {date} by match {occupant}")]
    FieldOccupied {
        field: String,
        date: NaiveDate,
        slot: NaiveTime,
        occupant: String,
    },

    #[error("'{team}' already plays at {slot} on {date} (match {other})")]
    OpponentBusy {
        team: String,
        date: NaiveDate,
        slot: NaiveTime,
        other: String,
    },

    #[error("'{team}' is not registered for category '{category}'")]
    NotRegistered { team: String, category: String },

    #[error("a match cannot be played by '{team}' against itself")]
    SameOpponent { team: String },

    #[error("unknown match '{0}'")]
    UnknownMatch(String),

    #[error("no free slot on {date}")]
    NoSlotAvailable { date: NaiveDate },
}
