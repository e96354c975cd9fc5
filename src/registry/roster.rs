//! Registered teams per category, read from the registration source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    teams: BTreeMap<String, Vec<String>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: impl Into<String>, team: impl Into<String>) {
        let team = team.into();
        let teams = self.teams.entry(category.into()).or_default();
        if !teams.contains(&team) {
            teams.push(team);
        }
    }

    /// Legal opponent choices when editing a match of `category`.
    pub fn teams_for(&self, category: &str) -> &[String] {
        self.teams.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.teams
            .iter()
            .map(|(category, teams)| (category.as_str(), teams.as_slice()))
    }

    /// Categories without any registration accept any label.
    pub fn accepts(&self, category: &str, team: &str) -> bool {
        let teams = self.teams_for(category);
        teams.is_empty() || teams.iter().any(|t| t == team)
    }
}

impl FromIterator<(String, String)> for Roster {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for (category, team) in iter {
            roster.register(category, team);
        }
        roster
    }
}
