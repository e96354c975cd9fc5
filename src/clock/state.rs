use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live timing of one match. Elapsed time is always derived from
/// `phase_started_at`; nothing here counts up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub match_id: String,
    pub phase_started_at: DateTime<Utc>,
    pub second_half: bool,
    /// Set only while the match is in halftime.
    pub halftime_started_at: Option<DateTime<Utc>>,
}

impl ClockState {
    pub fn first_half(match_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            match_id: match_id.into(),
            phase_started_at: now,
            second_half: false,
            halftime_started_at: None,
        }
    }

    /// Second half counts from zero; first-half time is not carried over.
    pub fn second_half(match_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            second_half: true,
            ..Self::first_half(match_id, now)
        }
    }

    pub fn halftime(match_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            halftime_started_at: Some(now),
            ..Self::first_half(match_id, now)
        }
    }

    /// Whole seconds since the phase began. `None` when the recorded start
    /// lies in the future.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let elapsed = (now - self.phase_started_at).num_seconds();
        (elapsed >= 0 && self.phase_started_at <= now).then_some(elapsed)
    }

    pub fn in_halftime(&self) -> bool {
        self.halftime_started_at.is_some()
    }
}
