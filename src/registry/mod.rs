//! The authoritative in-memory list of scheduled matches.

mod placement;
mod roster;

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{
    eligibility::{EligibilityChecker, PlacementError},
    fields::FieldRegistry,
    models::{CategoryRules, Match, MatchStatus, Score},
};

pub use placement::check_conflicts;
pub use roster::Roster;

/// Everything a placement decision reads.
#[derive(Debug, Clone, Copy)]
pub struct PlacementContext<'a> {
    pub fields: &'a FieldRegistry,
    pub rules: &'a CategoryRules,
    pub roster: &'a Roster,
    pub fallback_minutes: u32,
}

/// Target of a re-placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub date: NaiveDate,
    pub slot: NaiveTime,
    pub field_id: String,
}

/// Manual edit of a match's participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEdit {
    pub category: Option<String>,
    pub home: Option<String>,
    pub away: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchRegistry {
    matches: HashMap<String, Match>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, match_id: &str) -> Option<&Match> {
        self.matches.get(match_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    /// Inserts without validation; used when loading from storage.
    pub fn insert(&mut self, record: Match) -> Option<Match> {
        self.matches.insert(record.id.clone(), record)
    }

    pub fn remove(&mut self, match_id: &str) -> Option<Match> {
        self.matches.remove(match_id)
    }

    /// Swaps out every match of `date` for `matches`.
    pub fn replace_date(&mut self, date: NaiveDate, matches: Vec<Match>) {
        self.matches.retain(|_, m| m.date != date);
        for record in matches {
            self.insert(record);
        }
    }

    /// Matches of one day ordered by slot, then field.
    pub fn for_date(&self, date: NaiveDate) -> Vec<&Match> {
        let mut day: Vec<&Match> = self.matches.values().filter(|m| m.date == date).collect();
        day.sort_by(|a, b| {
            (a.slot, &a.field_id, &a.id).cmp(&(b.slot, &b.field_id, &b.id))
        });
        day
    }

    /// Distinct slots of one day, ascending.
    pub fn slots_for_date(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let mut slots: Vec<NaiveTime> = self
            .matches
            .values()
            .filter(|m| m.date == date)
            .map(|m| m.slot)
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Returns `Some(true)` when the status changed, `Some(false)` when it
    /// already had that status, `None` for an unknown match.
    pub fn set_status(&mut self, match_id: &str, status: MatchStatus) -> Option<bool> {
        let record = self.matches.get_mut(match_id)?;
        if record.status == status {
            return Some(false);
        }
        record.status = status;
        Some(true)
    }

    pub fn set_score(&mut self, match_id: &str, score: Option<Score>) -> Option<bool> {
        let record = self.matches.get_mut(match_id)?;
        if record.score == score {
            return Some(false);
        }
        record.score = score;
        Some(true)
    }

    /// Validates `candidate` against eligibility, registrations and
    /// conflicts with every other match.
    pub fn validate(&self, candidate: &Match, ctx: PlacementContext<'_>) -> Result<(), PlacementError> {
        EligibilityChecker::new(ctx.fields, ctx.rules).check_placement(
            &candidate.category,
            &candidate.field_id,
            candidate.date,
        )?;

        for team in [&candidate.home, &candidate.away] {
            if !ctx.roster.accepts(&candidate.category, team) {
                return Err(PlacementError::NotRegistered {
                    team: team.clone(),
                    category: candidate.category.clone(),
                });
            }
        }

        check_conflicts(candidate, self.matches.values(), ctx.fields, ctx.fallback_minutes)
    }

    /// Validates and inserts a new match.
    pub fn place(&mut self, candidate: Match, ctx: PlacementContext<'_>) -> Result<&Match, PlacementError> {
        self.validate(&candidate, ctx)?;
        let id = candidate.id.clone();
        self.insert(candidate);
        self.get(&id)
            .ok_or(PlacementError::UnknownMatch(id))
    }

    /// Moves a match to another day, slot or field.
    pub fn relocate(
        &mut self,
        match_id: &str,
        target: Placement,
        ctx: PlacementContext<'_>,
    ) -> Result<&Match, PlacementError> {
        let mut candidate = self
            .get(match_id)
            .cloned()
            .ok_or_else(|| PlacementError::UnknownMatch(match_id.to_string()))?;
        candidate.date = target.date;
        candidate.slot = target.slot;
        candidate.field_id = target.field_id;
        self.place(candidate, ctx)
    }

    /// Changes category or opponents in place.
    pub fn edit(
        &mut self,
        match_id: &str,
        edit: MatchEdit,
        ctx: PlacementContext<'_>,
    ) -> Result<&Match, PlacementError> {
        let mut candidate = self
            .get(match_id)
            .cloned()
            .ok_or_else(|| PlacementError::UnknownMatch(match_id.to_string()))?;
        if let Some(category) = edit.category {
            candidate.category = category;
        }
        if let Some(home) = edit.home {
            candidate.home = home;
        }
        if let Some(away) = edit.away {
            candidate.away = away;
        }
        self.place(candidate, ctx)
    }
}

impl FromIterator<Match> for MatchRegistry {
    fn from_iter<I: IntoIterator<Item = Match>>(iter: I) -> Self {
        let mut registry = MatchRegistry::new();
        for record in iter {
            registry.insert(record);
        }
        registry
    }
}
