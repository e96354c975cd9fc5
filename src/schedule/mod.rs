//! First-fit bulk placement. Puts each pairing on the earliest legal
//! slot and field; makes no attempt at an optimal packing.

use chrono::{Duration, NaiveDate, NaiveTime};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    eligibility::PlacementError,
    models::Match,
    registry::{MatchRegistry, PlacementContext},
};

/// Two opponents of one category waiting for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub category: String,
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub placed: Vec<Match>,
    pub unplaced: Vec<(Pairing, PlacementError)>,
}

/// Slot grid from `first` to `last` inclusive.
pub fn day_slots(first: NaiveTime, last: NaiveTime, granularity_minutes: u32) -> Vec<NaiveTime> {
    let mut slots = Vec::new();
    if granularity_minutes == 0 {
        return slots;
    }
    let step = Duration::minutes(i64::from(granularity_minutes));
    let mut slot = first;
    while slot <= last {
        slots.push(slot);
        let (next, wrapped) = slot.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        slot = next;
    }
    slots
}

pub fn place_pairings(
    pairings: Vec<Pairing>,
    date: NaiveDate,
    slots: &[NaiveTime],
    registry: &mut MatchRegistry,
    ctx: PlacementContext<'_>,
) -> GenerationReport {
    let mut report = GenerationReport::default();

    for pairing in pairings {
        match place_one(&pairing, date, slots, registry, ctx) {
            Ok(placed) => report.placed.push(placed),
            Err(err) => {
                warn!(
                    "could not place {} vs {} ({}): {}",
                    pairing.home, pairing.away, pairing.category, err
                );
                report.unplaced.push((pairing, err));
            }
        }
    }

    info!(
        "placed {} of {} pairings on {}",
        report.placed.len(),
        report.placed.len() + report.unplaced.len(),
        date
    );
    report
}

fn place_one(
    pairing: &Pairing,
    date: NaiveDate,
    slots: &[NaiveTime],
    registry: &mut MatchRegistry,
    ctx: PlacementContext<'_>,
) -> Result<Match, PlacementError> {
    // A category rejection explains more than a later occupancy clash, so
    // it is kept unless nothing else was tried.
    let mut last_err: Option<PlacementError> = None;

    for &slot in slots {
        for field in ctx.fields.iter() {
            let candidate = Match::new(
                date,
                slot,
                field.id.clone(),
                pairing.category.clone(),
                pairing.home.clone(),
                pairing.away.clone(),
            );
            match registry.place(candidate, ctx) {
                Ok(placed) => return Ok(placed.clone()),
                Err(err @ PlacementError::CategoryNotAllowed { .. }) => {
                    if !matches!(last_err, Some(PlacementError::CategoryNotAllowed { .. })) {
                        last_err = Some(err);
                    }
                }
                Err(err @ (PlacementError::NotRegistered { .. } | PlacementError::SameOpponent { .. })) => {
                    return Err(err);
                }
                Err(err) => {
                    if last_err.is_none() {
                        last_err = Some(err);
                    }
                }
            }
        }
    }

    Err(last_err.unwrap_or(PlacementError::NoSlotAvailable { date }))
}
