use serde::Serialize;

use crate::{
    clock::{ClockReading, Transition},
    live::LiveBoard,
    models::MatchStatus,
};

/// Display state of one match at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockView {
    pub match_id: String,
    pub status: MatchStatus,
    pub reading: ClockReading,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LiveEvent {
    #[serde(rename_all = "camelCase")]
    MatchStateChanged {
        view: ClockView,
        transition: Option<Transition>,
    },
    Heartbeat { views: Vec<ClockView> },
    BoardRefreshed { board: LiveBoard },
}
