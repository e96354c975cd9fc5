//! Per-tick evaluation of a match clock.
//!
//! `Scheduled -> Running(1) -> [Halftime -> Running(2)] -> Finished`
//!
//! The bracketed path only exists for fields that play two halves; each half
//! gets exactly half of the configured duration. Leaving halftime is never
//! automatic: the configured halftime break is shown as a countdown but does
//! not trigger anything, the second half starts only through an explicit
//! start.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{FieldTiming, MatchStatus};

use super::ClockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    ToHalftime,
    ToFinished,
}

impl Transition {
    pub fn target(&self) -> MatchStatus {
        match self {
            Transition::ToHalftime => MatchStatus::Halftime,
            Transition::ToFinished => MatchStatus::Finished,
        }
    }
}

/// What a display shows for a match right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClockReading {
    /// Scheduled or finished: no clock.
    Idle,
    #[serde(rename_all = "camelCase")]
    Playing {
        second_half: bool,
        elapsed_secs: i64,
        remaining_secs: i64,
    },
    #[serde(rename_all = "camelCase")]
    Halftime {
        elapsed_secs: i64,
        /// Countdown of the configured break; informational.
        advisory_remaining_secs: i64,
    },
    /// Live status without a usable clock (missing, or started in the
    /// future). Shown as "not running".
    Anomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub reading: ClockReading,
    pub transition: Option<Transition>,
}

impl Evaluation {
    fn idle() -> Self {
        Self {
            reading: ClockReading::Idle,
            transition: None,
        }
    }

    fn anomaly() -> Self {
        Self {
            reading: ClockReading::Anomaly,
            transition: None,
        }
    }
}

/// Pure and non-blocking; safe to call as often as the ticker likes.
pub fn evaluate(
    status: MatchStatus,
    clock: Option<&ClockState>,
    timing: &FieldTiming,
    now: DateTime<Utc>,
) -> Evaluation {
    match status {
        MatchStatus::Scheduled | MatchStatus::Finished => Evaluation::idle(),
        MatchStatus::Halftime => {
            let Some(clock) = clock else {
                return Evaluation::anomaly();
            };
            let started = clock.halftime_started_at.unwrap_or(clock.phase_started_at);
            if started > now {
                return Evaluation::anomaly();
            }
            let elapsed = (now - started).num_seconds();
            Evaluation {
                reading: ClockReading::Halftime {
                    elapsed_secs: elapsed,
                    advisory_remaining_secs: (timing.halftime_secs - elapsed).max(0),
                },
                transition: None,
            }
        }
        MatchStatus::Running => {
            let Some(clock) = clock else {
                return Evaluation::anomaly();
            };
            let Some(elapsed) = clock.elapsed_secs(now) else {
                return Evaluation::anomaly();
            };

            let limit = timing.phase_secs();
            let transition = if elapsed < limit {
                None
            } else if timing.two_halves && !clock.second_half {
                Some(Transition::ToHalftime)
            } else {
                Some(Transition::ToFinished)
            };

            Evaluation {
                reading: ClockReading::Playing {
                    second_half: clock.second_half,
                    elapsed_secs: elapsed.min(limit),
                    remaining_secs: (limit - elapsed).max(0),
                },
                transition,
            }
        }
    }
}

/// Clock that replaces `clock` after `transition` at `now`. Finishing
/// destroys the clock.
pub fn apply(transition: Transition, match_id: &str, now: DateTime<Utc>) -> Option<ClockState> {
    match transition {
        Transition::ToHalftime => Some(ClockState::halftime(match_id, now)),
        Transition::ToFinished => None,
    }
}
