use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::models::Match;

use super::slots::{current_slot, next_slot};

/// The two display sets for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBoard {
    pub date: Option<NaiveDate>,
    pub current_slot: Option<NaiveTime>,
    pub next_slot: Option<NaiveTime>,
    /// Matches of the current slot plus anything still running or in
    /// halftime, whatever slot it started in.
    pub live: Vec<Match>,
    /// Matches of the next slot, for announcements.
    pub upcoming: Vec<Match>,
}

impl LiveBoard {
    /// `day` must already be ordered by slot.
    pub fn build<'a>(
        date: NaiveDate,
        day: impl IntoIterator<Item = &'a Match>,
        now: NaiveTime,
    ) -> Self {
        let day: Vec<&Match> = day.into_iter().filter(|m| m.date == date).collect();
        let slots: Vec<NaiveTime> = day.iter().map(|m| m.slot).collect();

        let current = current_slot(&slots, now);
        let next = current.and_then(|slot| next_slot(&slots, slot));

        let live = day
            .iter()
            .filter(|m| Some(m.slot) == current || m.status.is_live())
            .map(|m| (*m).clone())
            .collect();
        let upcoming = day
            .iter()
            .filter(|m| Some(m.slot) == next && !m.status.is_live())
            .map(|m| (*m).clone())
            .collect();

        Self {
            date: Some(date),
            current_slot: current,
            next_slot: next,
            live,
            upcoming,
        }
    }

    /// Ids of matches in the current slot.
    pub fn current_ids(&self) -> Vec<String> {
        self.live
            .iter()
            .filter(|m| Some(m.slot) == self.current_slot)
            .map(|m| m.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStatus;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn overrunning_match_stays_live() {
        let mut early = Match::new(day(), at(9, 0), "platz-1", "Minis", "A", "B");
        early.status = MatchStatus::Running;
        let done = Match {
            status: MatchStatus::Finished,
            ..Match::new(day(), at(9, 0), "kleinfeld", "Minis", "C", "D")
        };
        let current = Match::new(day(), at(9, 15), "platz-2", "C-Jugend weiblich", "E", "F");
        let next = Match::new(day(), at(9, 30), "platz-2", "C-Jugend weiblich", "G", "H");
        let day_matches = vec![early.clone(), done, current.clone(), next.clone()];

        let board = LiveBoard::build(day(), &day_matches, at(9, 10));

        assert_eq!(board.current_slot, Some(at(9, 15)));
        assert_eq!(board.next_slot, Some(at(9, 30)));
        assert_eq!(board.live, [early, current.clone()]);
        assert_eq!(board.upcoming, [next]);
        assert_eq!(board.current_ids(), [current.id]);
    }

    #[test]
    fn empty_day() {
        let board = LiveBoard::build(day(), &Vec::<Match>::new(), at(9, 0));
        assert_eq!(board.current_slot, None);
        assert!(board.live.is_empty() && board.upcoming.is_empty());
    }
}
