//! Time-window conflicts on a field and between opponents.

use chrono::NaiveDateTime;

use crate::{eligibility::PlacementError, fields::FieldRegistry, models::Match};

/// `[start, end)` a match blocks, break included. Unknown fields block
/// `fallback_minutes`.
fn window(m: &Match, fields: &FieldRegistry, fallback_minutes: u32) -> (NaiveDateTime, NaiveDateTime) {
    let start = m.date.and_time(m.slot);
    let footprint = fields
        .get(&m.field_id)
        .map(|field| field.footprint())
        .unwrap_or_else(|| chrono::Duration::minutes(i64::from(fallback_minutes)));
    (start, start + footprint)
}

fn overlaps(a: (NaiveDateTime, NaiveDateTime), b: (NaiveDateTime, NaiveDateTime)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Checks `candidate` against every other match on the same day. Matches
/// with the candidate's id are ignored so a match can be moved onto a spot
/// that overlaps its old position.
pub fn check_conflicts<'a>(
    candidate: &Match,
    others: impl IntoIterator<Item = &'a Match>,
    fields: &FieldRegistry,
    fallback_minutes: u32,
) -> Result<(), PlacementError> {
    if candidate.home == candidate.away {
        return Err(PlacementError::SameOpponent {
            team: candidate.home.clone(),
        });
    }

    let own = window(candidate, fields, fallback_minutes);
    for other in others {
        if other.id == candidate.id || other.date != candidate.date {
            continue;
        }
        if !overlaps(own, window(other, fields, fallback_minutes)) {
            continue;
        }

        if other.field_id == candidate.field_id {
            let field = fields
                .get(&candidate.field_id)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| candidate.field_id.clone());
            return Err(PlacementError::FieldOccupied {
                field,
                date: candidate.date,
                slot: other.slot,
                occupant: other.id.clone(),
            });
        }

        for team in [&candidate.home, &candidate.away] {
            if other.involves(team) {
                return Err(PlacementError::OpponentBusy {
                    team: team.clone(),
                    date: candidate.date,
                    slot: other.slot,
                    other: other.id.clone(),
                });
            }
        }
    }
    Ok(())
}
