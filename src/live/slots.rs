//! Picks the slot shown as "now" and the one announced as "next".

use chrono::{NaiveTime, Timelike};

fn sorted_distinct(slots: &[NaiveTime]) -> Vec<NaiveTime> {
    let mut sorted = slots.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Seconds are dropped: a slot stays current for the whole minute it
/// starts in.
fn to_minute(now: NaiveTime) -> NaiveTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// First slot at or after `now`; the last slot once every slot has passed.
/// `None` only for a day without slots.
pub fn current_slot(slots: &[NaiveTime], now: NaiveTime) -> Option<NaiveTime> {
    let sorted = sorted_distinct(slots);
    let now = to_minute(now);
    sorted
        .iter()
        .copied()
        .find(|slot| *slot >= now)
        .or_else(|| sorted.last().copied())
}

/// Slot right after `current`, or `None` when `current` is the last one.
pub fn next_slot(slots: &[NaiveTime], current: NaiveTime) -> Option<NaiveTime> {
    sorted_distinct(slots).into_iter().find(|slot| *slot > current)
}
