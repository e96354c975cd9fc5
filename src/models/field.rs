//! Per-field rules: timing and category eligibility.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub id: String,
    pub name: String,
    pub match_minutes: u32,
    pub break_minutes: u32,
    /// Advisory only; halftime never ends on its own.
    pub halftime_minutes: u32,
    pub two_halves: bool,
    /// Default allow-list. Empty means every category may play here.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Per-day allow-lists. A non-empty entry replaces `categories` for
    /// that day; an empty entry falls back to it.
    #[serde(default)]
    pub date_categories: BTreeMap<NaiveDate, Vec<String>>,
}

impl FieldConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, match_minutes: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            match_minutes,
            break_minutes: 0,
            halftime_minutes: 0,
            two_halves: false,
            categories: Vec::new(),
            date_categories: BTreeMap::new(),
        }
    }

    pub fn active_categories(&self, date: NaiveDate) -> &[String] {
        match self.date_categories.get(&date) {
            Some(list) if !list.is_empty() => list,
            _ => &self.categories,
        }
    }

    pub fn timing(&self) -> FieldTiming {
        FieldTiming {
            match_secs: i64::from(self.match_minutes) * 60,
            two_halves: self.two_halves,
            halftime_secs: i64::from(self.halftime_minutes) * 60,
        }
    }

    /// How long a match blocks this field, break included.
    pub fn footprint(&self) -> Duration {
        let halftime = if self.two_halves {
            self.halftime_minutes
        } else {
            0
        };
        Duration::minutes(i64::from(self.match_minutes + halftime + self.break_minutes))
    }
}

/// The part of a field's configuration the match clock needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTiming {
    pub match_secs: i64,
    pub two_halves: bool,
    pub halftime_secs: i64,
}

impl FieldTiming {
    /// Single-half timing used when a match references an unknown field.
    pub fn fallback(match_minutes: u32) -> Self {
        Self {
            match_secs: i64::from(match_minutes) * 60,
            two_halves: false,
            halftime_secs: 0,
        }
    }

    /// Playing time allotted to one phase: half the match when played in
    /// two halves, the whole match otherwise.
    pub fn phase_secs(&self) -> i64 {
        if self.two_halves {
            self.match_secs / 2
        } else {
            self.match_secs
        }
    }
}
