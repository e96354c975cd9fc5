//! A scheduled match and its lifecycle status.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    Scheduled,
    Running,
    Halftime,
    Finished,
}

impl Default for MatchStatus {
    fn default() -> Self {
        MatchStatus::Scheduled
    }
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "Scheduled",
            MatchStatus::Running => "Running",
            MatchStatus::Halftime => "Halftime",
            MatchStatus::Finished => "Finished",
        }
    }

    /// Running or in halftime: the clock engine owns this match.
    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Running | MatchStatus::Halftime)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub date: NaiveDate,
    pub slot: NaiveTime,
    pub field_id: String,
    pub category: String,
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default)]
    pub score: Option<Score>,
}

impl Match {
    pub fn new(
        date: NaiveDate,
        slot: NaiveTime,
        field_id: impl Into<String>,
        category: impl Into<String>,
        home: impl Into<String>,
        away: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            slot,
            field_id: field_id.into(),
            category: category.into(),
            home: home.into(),
            away: away.into(),
            status: MatchStatus::Scheduled,
            score: None,
        }
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home == team || self.away == team
    }
}
