use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::models::{MatchStatus, Score};

const DATE_FORMAT: &str = "%Y-%m-%d";
const SLOT_FORMAT: &str = "%H:%M";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_slot(slot: NaiveTime) -> String {
    slot.format(SLOT_FORMAT).to_string()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_slot(value: &str, field: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, SLOT_FORMAT).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<MatchStatus> {
    match value {
        "Scheduled" => Ok(MatchStatus::Scheduled),
        "Running" => Ok(MatchStatus::Running),
        "Halftime" => Ok(MatchStatus::Halftime),
        "Finished" => Ok(MatchStatus::Finished),
        other => Err(anyhow!("unknown match status {other}")),
    }
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

/// Both columns or neither.
pub fn parse_score(home: Option<i64>, away: Option<i64>) -> Result<Option<Score>> {
    match (home, away) {
        (Some(home), Some(away)) => Ok(Some(Score {
            home: to_u32(home, "home_score")?,
            away: to_u32(away, "away_score")?,
        })),
        (None, None) => Ok(None),
        _ => Err(anyhow!("score has only one side recorded")),
    }
}
