use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{apply, evaluate, ClockCache, ClockState, TimeSource, Transition},
    db::MatchStore,
    fields::FieldRegistry,
    live::LiveBoard,
    models::{FieldTiming, Match, MatchStatus, Score},
    registry::MatchRegistry,
    settings::TournamentSettings,
};

use super::{ClockView, LiveEvent, StatusWriter};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    StartedFirstHalf,
    StartedSecondHalf,
    /// Already running or finished; nothing was touched.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("unknown match '{0}'")]
    UnknownMatch(String),

    #[error("failed to record clock for match '{match_id}': {reason}")]
    ClockCache { match_id: String, reason: String },
}

/// Result of one start request. A batch yields one report per id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub match_id: String,
    pub result: Result<StartOutcome, ControlError>,
}

#[derive(Default)]
struct LiveState {
    date: Option<NaiveDate>,
    registry: MatchRegistry,
    fields: FieldRegistry,
    clocks: HashMap<String, ClockState>,
    board: LiveBoard,
    /// Unknown field ids already warned about.
    unknown_fields: HashSet<String>,
    /// Bumped on every local change to a match.
    revisions: HashMap<String, u64>,
    /// Day the poller reloads; today when unset.
    pinned_date: Option<NaiveDate>,
}

impl LiveState {
    fn touch(&mut self, match_id: &str) {
        *self.revisions.entry(match_id.to_string()).or_default() += 1;
    }
}

struct RunningTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Drives the clocks of one tournament day.
///
/// Local state is authoritative for everything this controller changed;
/// storage is written through [`StatusWriter`] and never awaited by the
/// tick loop. Only one controller should drive a given day.
#[derive(Clone)]
pub struct LiveController<S: MatchStore> {
    state: Arc<Mutex<LiveState>>,
    store: S,
    writer: StatusWriter,
    cache: Arc<ClockCache>,
    time: Arc<dyn TimeSource>,
    events: broadcast::Sender<LiveEvent>,
    tasks: Arc<Mutex<Option<RunningTasks>>>,
    tick_interval: Duration,
    poll_interval: Duration,
    heartbeat_every_ticks: u32,
    fallback_match_minutes: u32,
}

impl<S: MatchStore> LiveController<S> {
    /// Must be called inside a tokio runtime.
    pub fn new(
        store: S,
        cache: Arc<ClockCache>,
        time: Arc<dyn TimeSource>,
        settings: &TournamentSettings,
    ) -> Self {
        let debug_mode = std::env::var("MATCHDAY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(LiveState::default())),
            writer: StatusWriter::spawn(store.clone(), settings.retry),
            store,
            cache,
            time,
            events,
            tasks: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            poll_interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
            heartbeat_every_ticks: if debug_mode {
                1
            } else {
                settings.heartbeat_every_ticks.max(1)
            },
            fallback_match_minutes: settings.fallback_match_minutes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    pub fn writer(&self) -> &StatusWriter {
        &self.writer
    }

    /// Loads (or reloads) one day from storage and rebuilds the board.
    ///
    /// A match keeps its local status and score when it changed locally
    /// while storage was being read, or when a status write for it is
    /// still in flight. Live matches without a local clock pick theirs up
    /// from the clock cache.
    pub async fn load_day(&self, date: NaiveDate) -> Result<LiveBoard> {
        let (seen_revisions, pending_before) = {
            let state = self.state.lock().await;
            let pending: HashSet<String> = state
                .registry
                .iter()
                .filter(|m| self.writer.is_pending(&m.id))
                .map(|m| m.id.clone())
                .collect();
            (state.revisions.clone(), pending)
        };

        let stored_fields = self
            .store
            .load_field_configs()
            .await
            .context("failed to load field configuration")?;
        let loaded = self
            .store
            .load_matches_for_date(date)
            .await
            .with_context(|| format!("failed to load matches for {date}"))?;
        let now = self.time.local_now().time();

        let board = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            state.fields = if stored_fields.is_empty() {
                if state.fields.is_empty() {
                    warn!("No field configuration stored; using built-in defaults");
                }
                FieldRegistry::defaults()
            } else {
                FieldRegistry::new(stored_fields)
            };

            if state.date != Some(date) {
                state.registry = MatchRegistry::new();
                state.clocks.clear();
                state.revisions.clear();
                state.date = Some(date);
            }

            let merged: Vec<Match> = loaded
                .into_iter()
                .map(|mut record| {
                    let keep_local = pending_before.contains(&record.id)
                        || self.writer.is_pending(&record.id)
                        || state.revisions.get(&record.id) != seen_revisions.get(&record.id);
                    if keep_local {
                        if let Some(local) = state.registry.get(&record.id) {
                            record.status = local.status;
                            record.score = local.score;
                        }
                    }
                    record
                })
                .collect();
            state.registry.replace_date(date, merged);

            self.restore_clocks(state, date);
            state.board = LiveBoard::build(date, state.registry.for_date(date), now);
            state.board.clone()
        };

        let _ = self.events.send(LiveEvent::BoardRefreshed {
            board: board.clone(),
        });
        Ok(board)
    }

    fn restore_clocks(&self, state: &mut LiveState, date: NaiveDate) {
        let live: Vec<String> = state
            .registry
            .for_date(date)
            .into_iter()
            .filter(|m| m.status.is_live())
            .map(|m| m.id.clone())
            .collect();

        state.clocks.retain(|id, _| live.contains(id));
        for id in live {
            if state.clocks.contains_key(&id) {
                continue;
            }
            match self.cache.get(&id) {
                Some(clock) => {
                    info!("Resumed clock for match {id} from cache");
                    state.clocks.insert(id, clock);
                }
                None => warn!("Match {id} is live but has no recorded clock"),
            }
        }
    }

    /// One evaluation pass over every live match. Returns the views of
    /// matches that changed status.
    pub async fn tick(&self) -> Vec<ClockView> {
        let now = self.time.now();
        let mut changed = Vec::new();

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let live: Vec<Match> = state
                .registry
                .iter()
                .filter(|m| m.status.is_live())
                .cloned()
                .collect();

            for record in live {
                let timing = self.timing(state, &record.field_id);
                let evaluation = evaluate(record.status, state.clocks.get(&record.id), &timing, now);
                let Some(transition) = evaluation.transition else {
                    continue;
                };
                self.apply_transition(state, &record.id, transition, now);
                if let Some(view) = self.view_of(state, &record.id, now) {
                    changed.push((view, transition));
                }
            }

            if !changed.is_empty() {
                self.rebuild_board(state);
            }
        }

        if !changed.is_empty() {
            self.flush_cache_in_background();
        }

        changed
            .into_iter()
            .map(|(view, transition)| {
                let _ = self.events.send(LiveEvent::MatchStateChanged {
                    view: view.clone(),
                    transition: Some(transition),
                });
                view
            })
            .collect()
    }

    /// Starts every id that is scheduled or in halftime. Ids that are
    /// already running or finished are left alone, so repeating a request
    /// is harmless. Each id gets its own report.
    pub async fn start_eligible(&self, match_ids: &[String]) -> Vec<StartReport> {
        let now = self.time.now();
        let mut reports = Vec::with_capacity(match_ids.len());
        let mut started = Vec::new();

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            for match_id in match_ids {
                let result = self.start_one(state, match_id, now);
                if matches!(result, Ok(outcome) if outcome != StartOutcome::Unchanged) {
                    if let Some(view) = self.view_of(state, match_id, now) {
                        started.push(view);
                    }
                }
                reports.push(StartReport {
                    match_id: match_id.clone(),
                    result,
                });
            }

            if !started.is_empty() {
                self.rebuild_board(state);
            }
        }

        for view in started {
            let _ = self.events.send(LiveEvent::MatchStateChanged {
                view,
                transition: None,
            });
        }
        reports
    }

    /// Starts every match of `slot` on the loaded day.
    pub async fn start_slot(&self, slot: NaiveTime) -> Vec<StartReport> {
        let ids: Vec<String> = {
            let state = self.state.lock().await;
            match state.date {
                Some(date) => state
                    .registry
                    .for_date(date)
                    .into_iter()
                    .filter(|m| m.slot == slot)
                    .map(|m| m.id.clone())
                    .collect(),
                None => Vec::new(),
            }
        };
        self.start_eligible(&ids).await
    }

    /// Moves a match one step forward by hand: starts it, ends the current
    /// half early, or leaves a finished match alone.
    pub async fn advance(&self, match_id: &str) -> Result<MatchStatus, ControlError> {
        let now = self.time.now();
        let view = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let status = state
                .registry
                .get(match_id)
                .map(|m| (m.status, m.field_id.clone()))
                .ok_or_else(|| ControlError::UnknownMatch(match_id.to_string()));
            let (status, field_id) = status?;

            let transition = match status {
                MatchStatus::Finished => return Ok(MatchStatus::Finished),
                MatchStatus::Scheduled | MatchStatus::Halftime => {
                    self.start_one(state, match_id, now)?;
                    None
                }
                MatchStatus::Running => {
                    let timing = self.timing(state, &field_id);
                    let second_half = state
                        .clocks
                        .get(match_id)
                        .map(|clock| clock.second_half)
                        .unwrap_or(false);
                    let transition = if timing.two_halves && !second_half {
                        Transition::ToHalftime
                    } else {
                        Transition::ToFinished
                    };
                    self.apply_transition(state, match_id, transition, now);
                    self.flush_cache_in_background();
                    Some(transition)
                }
            };

            self.rebuild_board(state);
            self.view_of(state, match_id, now).map(|view| (view, transition))
        };

        match view {
            Some((view, transition)) => {
                let status = view.status;
                let _ = self.events.send(LiveEvent::MatchStateChanged { view, transition });
                Ok(status)
            }
            None => Err(ControlError::UnknownMatch(match_id.to_string())),
        }
    }

    /// Finishes a match immediately, optionally recording the final score.
    pub async fn end_match(&self, match_id: &str, score: Option<Score>) -> Result<(), ControlError> {
        let now = self.time.now();
        let view = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            if state.registry.get(match_id).is_none() {
                return Err(ControlError::UnknownMatch(match_id.to_string()));
            }
            if score.is_some() {
                state.registry.set_score(match_id, score);
            }
            let became_finished = state.registry.set_status(match_id, MatchStatus::Finished) == Some(true);
            if self.drop_clock(state, match_id) {
                self.flush_cache_in_background();
            }

            if became_finished || score.is_some() {
                state.touch(match_id);
                self.writer.enqueue(match_id, MatchStatus::Finished, score);
            }
            if became_finished {
                info!("Match {match_id} ended by hand");
            }

            self.rebuild_board(state);
            self.view_of(state, match_id, now)
        };

        if let Some(view) = view {
            let _ = self.events.send(LiveEvent::MatchStateChanged {
                view,
                transition: None,
            });
        }
        Ok(())
    }

    pub async fn record_score(&self, match_id: &str, score: Score) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        let status = state
            .registry
            .get(match_id)
            .map(|m| m.status)
            .ok_or_else(|| ControlError::UnknownMatch(match_id.to_string()))?;

        if state.registry.set_score(match_id, Some(score)) == Some(true) {
            state.touch(match_id);
            self.writer.enqueue(match_id, status, Some(score));
        }
        Ok(())
    }

    pub async fn board(&self) -> LiveBoard {
        self.state.lock().await.board.clone()
    }

    pub async fn view(&self, match_id: &str) -> Option<ClockView> {
        let now = self.time.now();
        let state = self.state.lock().await;
        self.view_of(&state, match_id, now)
    }

    /// Views of everything on the live board.
    pub async fn views(&self) -> Vec<ClockView> {
        let now = self.time.now();
        let state = self.state.lock().await;
        state
            .board
            .live
            .iter()
            .filter_map(|m| self.view_of(&state, &m.id, now))
            .collect()
    }

    /// Keeps the poller on `date` instead of following the calendar. `None`
    /// goes back to following today.
    pub async fn pin_date(&self, date: Option<NaiveDate>) {
        self.state.lock().await.pinned_date = date;
    }

    /// Starts the tick loop and the storage poller. The poller reloads the
    /// pinned day, or the current calendar day when none is pinned.
    /// Restarting replaces the running loops; clocks are not touched.
    pub async fn spawn(&self) {
        let mut tasks = self.tasks.lock().await;
        if let Some(running) = tasks.take() {
            running.cancel.cancel();
            for handle in running.handles {
                handle.abort();
            }
        }

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(self.clone().run_ticker(cancel.clone()));
        let poller = tokio::spawn(self.clone().run_poller(cancel.clone()));

        *tasks = Some(RunningTasks {
            cancel,
            handles: vec![ticker, poller],
        });
    }

    /// Stops both loops and flushes the write queue. Clock state stays in
    /// the cache, so a later start resumes where this one left off.
    pub async fn shutdown(&self) {
        if let Some(running) = self.tasks.lock().await.take() {
            running.cancel.cancel();
            for handle in running.handles {
                if let Err(err) = handle.await {
                    error!("Live loop task failed to join: {err}");
                }
            }
        }
        self.writer.shutdown().await;

        let cache = self.cache.clone();
        match tokio::task::spawn_blocking(move || cache.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("Failed to persist clock cache at shutdown: {err:#}"),
            Err(err) => error!("Clock cache flush task failed: {err}"),
        }
    }

    async fn run_ticker(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u32 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => {
                    info!("Clock ticker shutting down");
                    break;
                }
            }

            self.tick().await;

            ticks = ticks.wrapping_add(1);
            if ticks % self.heartbeat_every_ticks == 0 {
                let views = self.views().await;
                if !views.is_empty() {
                    let _ = self.events.send(LiveEvent::Heartbeat { views });
                }
            }
        }
    }

    async fn run_poller(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => {
                    info!("Schedule poller shutting down");
                    break;
                }
            }

            let pinned = self.state.lock().await.pinned_date;
            let date = pinned.unwrap_or_else(|| self.time.local_now().date());
            if let Err(err) = self.load_day(date).await {
                warn!("Failed to refresh matches for {date}: {err:#}");
            }
        }
    }

    fn timing(&self, state: &mut LiveState, field_id: &str) -> FieldTiming {
        if state.fields.get(field_id).is_none() && state.unknown_fields.insert(field_id.to_string()) {
            warn!(
                "Unknown field '{}'; timing matches there as one half of {} minutes",
                field_id, self.fallback_match_minutes
            );
        }
        state.fields.timing_for(field_id, self.fallback_match_minutes)
    }

    fn start_one(
        &self,
        state: &mut LiveState,
        match_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome, ControlError> {
        let status = state
            .registry
            .get(match_id)
            .map(|m| m.status)
            .ok_or_else(|| ControlError::UnknownMatch(match_id.to_string()))?;

        let (clock, outcome) = match status {
            MatchStatus::Scheduled => (
                ClockState::first_half(match_id, now),
                StartOutcome::StartedFirstHalf,
            ),
            MatchStatus::Halftime => (
                ClockState::second_half(match_id, now),
                StartOutcome::StartedSecondHalf,
            ),
            MatchStatus::Running | MatchStatus::Finished => return Ok(StartOutcome::Unchanged),
        };

        self.cache
            .put(clock.clone())
            .map_err(|err| ControlError::ClockCache {
                match_id: match_id.to_string(),
                reason: format!("{err:#}"),
            })?;
        state.clocks.insert(match_id.to_string(), clock);
        state.registry.set_status(match_id, MatchStatus::Running);
        state.touch(match_id);
        self.writer.enqueue(match_id, MatchStatus::Running, None);

        info!("Match {match_id} started ({outcome:?})");
        Ok(outcome)
    }

    /// Updates the cache in memory only; callers flush it once the state
    /// lock is released.
    fn apply_transition(
        &self,
        state: &mut LiveState,
        match_id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) {
        let status = transition.target();
        state.registry.set_status(match_id, status);
        state.touch(match_id);

        match apply(transition, match_id, now) {
            Some(clock) => {
                self.cache.set(clock.clone());
                state.clocks.insert(match_id.to_string(), clock);
            }
            None => {
                self.drop_clock(state, match_id);
            }
        }

        let score = state.registry.get(match_id).and_then(|m| m.score);
        self.writer.enqueue(match_id, status, score);
        info!("Match {match_id} -> {status}");
    }

    /// Returns whether the cache held a clock for the match.
    fn drop_clock(&self, state: &mut LiveState, match_id: &str) -> bool {
        state.clocks.remove(match_id);
        self.cache.discard(match_id)
    }

    fn flush_cache_in_background(&self) {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = cache.flush() {
                error!("Failed to persist clock cache: {err:#}");
            }
        });
    }

    fn rebuild_board(&self, state: &mut LiveState) {
        if let Some(date) = state.date {
            let now = self.time.local_now().time();
            state.board = LiveBoard::build(date, state.registry.for_date(date), now);
        }
    }

    fn view_of(&self, state: &LiveState, match_id: &str, now: DateTime<Utc>) -> Option<ClockView> {
        let record = state.registry.get(match_id)?;
        let timing = state
            .fields
            .timing_for(&record.field_id, self.fallback_match_minutes);
        let evaluation = evaluate(record.status, state.clocks.get(match_id), &timing, now);
        Some(ClockView {
            match_id: record.id.clone(),
            status: record.status,
            reading: evaluation.reading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::{ClockReading, ManualClock},
        db::store::testing::MemoryStore,
        models::FieldConfig,
        settings::RetryPolicy,
    };
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 9, 0, 0).unwrap()
    }

    fn day() -> NaiveDate {
        t0().date_naive()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn settings() -> TournamentSettings {
        TournamentSettings {
            tick_interval_ms: 10,
            retry: RetryPolicy {
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
                jitter_ms: 0,
            },
            ..TournamentSettings::default()
        }
    }

    fn single_field() -> FieldConfig {
        FieldConfig {
            two_halves: false,
            ..FieldConfig::new("klein", "Kleinfeld", 10)
        }
    }

    fn halves_field() -> FieldConfig {
        FieldConfig {
            two_halves: true,
            halftime_minutes: 5,
            ..FieldConfig::new("gross", "Großfeld", 20)
        }
    }

    fn fixture(field_id: &str) -> Match {
        Match::new(day(), nine(), field_id, "Minis", "A", "B")
    }

    struct Harness {
        controller: LiveController<MemoryStore>,
        store: MemoryStore,
        clock: Arc<ManualClock>,
        cache: Arc<ClockCache>,
    }

    async fn harness(matches: Vec<Match>, cache: Arc<ClockCache>, start: DateTime<Utc>) -> Harness {
        let store = MemoryStore::with(matches, vec![single_field(), halves_field()]);
        let clock = Arc::new(ManualClock::new(start));
        let controller = LiveController::new(store.clone(), cache.clone(), clock.clone(), &settings());
        controller.load_day(day()).await.unwrap();
        Harness {
            controller,
            store,
            clock,
            cache,
        }
    }

    async fn wait_for_status(store: &MemoryStore, match_id: &str, status: MatchStatus) {
        for _ in 0..200 {
            if store.status_of(match_id) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store never reached {status} for {match_id}");
    }

    async fn status(controller: &LiveController<MemoryStore>, match_id: &str) -> MatchStatus {
        controller.view(match_id).await.unwrap().status
    }

    #[tokio::test]
    async fn single_half_finishes_at_configured_duration() {
        let record = fixture("klein");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;

        let reports = h.controller.start_eligible(&[record.id.clone()]).await;
        assert_eq!(reports[0].result, Ok(StartOutcome::StartedFirstHalf));
        assert!(h.cache.get(&record.id).is_some());

        h.clock.advance(ChronoDuration::seconds(599));
        assert!(h.controller.tick().await.is_empty());
        assert_eq!(status(&h.controller, &record.id).await, MatchStatus::Running);

        h.clock.advance(ChronoDuration::seconds(1));
        let changed = h.controller.tick().await;
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].status, MatchStatus::Finished);
        assert_eq!(h.cache.get(&record.id), None);

        wait_for_status(&h.store, &record.id, MatchStatus::Finished).await;
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn two_halves_wait_for_manual_second_half() {
        let record = fixture("gross");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;
        h.controller.start_eligible(&[record.id.clone()]).await;

        h.clock.advance(ChronoDuration::seconds(600));
        let changed = h.controller.tick().await;
        assert_eq!(changed[0].status, MatchStatus::Halftime);

        // Well past the configured break: still halftime.
        h.clock.advance(ChronoDuration::seconds(900));
        assert!(h.controller.tick().await.is_empty());
        assert_eq!(status(&h.controller, &record.id).await, MatchStatus::Halftime);

        let reports = h.controller.start_eligible(&[record.id.clone()]).await;
        assert_eq!(reports[0].result, Ok(StartOutcome::StartedSecondHalf));
        let view = h.controller.view(&record.id).await.unwrap();
        assert_eq!(
            view.reading,
            ClockReading::Playing {
                second_half: true,
                elapsed_secs: 0,
                remaining_secs: 600
            }
        );

        h.clock.advance(ChronoDuration::seconds(599));
        assert!(h.controller.tick().await.is_empty());
        h.clock.advance(ChronoDuration::seconds(1));
        assert_eq!(h.controller.tick().await[0].status, MatchStatus::Finished);
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_start_is_harmless() {
        let record = fixture("klein");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;

        h.controller.start_eligible(&[record.id.clone()]).await;
        h.clock.advance(ChronoDuration::seconds(30));
        let again = h.controller.start_eligible(&[record.id.clone()]).await;
        assert_eq!(again[0].result, Ok(StartOutcome::Unchanged));

        // The clock kept its original start.
        let view = h.controller.view(&record.id).await.unwrap();
        assert!(matches!(
            view.reading,
            ClockReading::Playing { elapsed_secs: 30, .. }
        ));

        wait_for_status(&h.store, &record.id, MatchStatus::Running).await;
        h.controller.shutdown().await;
        assert_eq!(h.store.writes().len(), 1);
    }

    #[tokio::test]
    async fn batch_start_reports_each_id() {
        let first = fixture("klein");
        let second = Match::new(day(), nine(), "gross", "Minis", "C", "D");
        let h = harness(
            vec![first.clone(), second.clone()],
            Arc::new(ClockCache::in_memory()),
            t0(),
        )
        .await;

        let ids = vec![first.id.clone(), "missing".to_string(), second.id.clone()];
        let reports = h.controller.start_eligible(&ids).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].result, Ok(StartOutcome::StartedFirstHalf));
        assert_eq!(
            reports[1].result,
            Err(ControlError::UnknownMatch("missing".into()))
        );
        assert_eq!(reports[2].result, Ok(StartOutcome::StartedFirstHalf));
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn restarted_console_resumes_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock-cache.json");
        let record = fixture("gross");

        {
            let cache = Arc::new(ClockCache::new(path.clone()).unwrap());
            let h = harness(vec![record.clone()], cache, t0()).await;
            h.controller.start_eligible(&[record.id.clone()]).await;
            wait_for_status(&h.store, &record.id, MatchStatus::Running).await;
            h.controller.shutdown().await;
        }

        let mut running = record.clone();
        running.status = MatchStatus::Running;
        let cache = Arc::new(ClockCache::new(path).unwrap());
        let h = harness(vec![running], cache, t0() + ChronoDuration::seconds(200)).await;

        let view = h.controller.view(&record.id).await.unwrap();
        assert_eq!(
            view.reading,
            ClockReading::Playing {
                second_half: false,
                elapsed_secs: 200,
                remaining_secs: 400
            }
        );
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn live_match_without_clock_is_left_alone() {
        let mut record = fixture("klein");
        record.status = MatchStatus::Running;
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;

        h.clock.advance(ChronoDuration::hours(2));
        assert!(h.controller.tick().await.is_empty());
        let view = h.controller.view(&record.id).await.unwrap();
        assert_eq!(view.reading, ClockReading::Anomaly);
        assert_eq!(view.status, MatchStatus::Running);
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_field_uses_fallback_duration() {
        let record = fixture("nowhere");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;
        h.controller.start_eligible(&[record.id.clone()]).await;

        let fallback = i64::from(settings().fallback_match_minutes) * 60;
        h.clock.advance(ChronoDuration::seconds(fallback - 1));
        assert!(h.controller.tick().await.is_empty());
        h.clock.advance(ChronoDuration::seconds(1));
        assert_eq!(h.controller.tick().await[0].status, MatchStatus::Finished);
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn pending_write_survives_refresh() {
        let record = fixture("klein");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;
        h.store.fail_next_writes(usize::MAX);

        h.controller.start_eligible(&[record.id.clone()]).await;
        let board = h.controller.load_day(day()).await.unwrap();

        let on_board = board.live.iter().find(|m| m.id == record.id).unwrap();
        assert_eq!(on_board.status, MatchStatus::Running);
        assert_eq!(h.store.status_of(&record.id), Some(MatchStatus::Scheduled));

        h.store.fail_next_writes(0);
        wait_for_status(&h.store, &record.id, MatchStatus::Running).await;
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn manual_controls() {
        let record = fixture("gross");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;

        assert_eq!(h.controller.advance(&record.id).await, Ok(MatchStatus::Running));
        assert_eq!(h.controller.advance(&record.id).await, Ok(MatchStatus::Halftime));

        let score = Score { home: 3, away: 2 };
        h.controller.end_match(&record.id, Some(score)).await.unwrap();
        assert_eq!(status(&h.controller, &record.id).await, MatchStatus::Finished);
        assert_eq!(h.controller.advance(&record.id).await, Ok(MatchStatus::Finished));
        assert!(h.controller.end_match("missing", None).await.is_err());

        wait_for_status(&h.store, &record.id, MatchStatus::Finished).await;
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn start_slot_starts_the_whole_slot() {
        let early = fixture("klein");
        let other = Match::new(day(), nine(), "gross", "Minis", "C", "D");
        let later = Match::new(
            day(),
            NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            "klein",
            "Minis",
            "E",
            "F",
        );
        let h = harness(
            vec![early.clone(), other.clone(), later.clone()],
            Arc::new(ClockCache::in_memory()),
            t0(),
        )
        .await;

        let board = h.controller.board().await;
        assert_eq!(board.current_slot, Some(nine()));

        let reports = h.controller.start_slot(nine()).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result == Ok(StartOutcome::StartedFirstHalf)));
        assert_eq!(status(&h.controller, &later.id).await, MatchStatus::Scheduled);
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn spawned_loop_emits_transitions() {
        let record = fixture("klein");
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;
        let mut events = h.controller.subscribe();

        h.controller.start_eligible(&[record.id.clone()]).await;
        h.controller.spawn().await;
        h.clock.advance(ChronoDuration::minutes(10));

        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(LiveEvent::MatchStateChanged {
                        view,
                        transition: Some(Transition::ToFinished),
                    }) => break view,
                    Ok(_) => continue,
                    Err(err) => panic!("event stream closed: {err}"),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(finished.match_id, record.id);
        h.controller.shutdown().await;
    }

    async fn eventually(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn next_board(events: &mut broadcast::Receiver<LiveEvent>) -> LiveBoard {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(LiveEvent::BoardRefreshed { board }) = events.recv().await {
                    return board;
                }
            }
        })
        .await
        .unwrap()
    }

    /// Starts a match, then lets its first phase run out while a reload is
    /// between reading storage and merging. The transition's write lands
    /// before the merge, so only the revision tells the reload apart.
    async fn transition_during_reload(field_id: &str) -> (Harness, Match) {
        let record = fixture(field_id);
        let h = harness(vec![record.clone()], Arc::new(ClockCache::in_memory()), t0()).await;
        h.controller.start_eligible(&[record.id.clone()]).await;
        wait_for_status(&h.store, &record.id, MatchStatus::Running).await;
        eventually(|| !h.controller.writer().is_pending(&record.id)).await;

        let hold = h.store.hold_reads().await;
        let reload = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.load_day(day()).await })
        };
        eventually(|| h.store.parked_reads() == 1).await;

        h.clock.advance(ChronoDuration::minutes(10));
        let changed = h.controller.tick().await;
        assert_eq!(changed.len(), 1);
        let applied = changed[0].status;
        wait_for_status(&h.store, &record.id, applied).await;
        eventually(|| !h.controller.writer().is_pending(&record.id)).await;

        drop(hold);
        reload.await.unwrap().unwrap();
        (h, record)
    }

    #[tokio::test]
    async fn reload_keeps_finish_applied_during_read() {
        let (h, record) = transition_during_reload("klein").await;

        let view = h.controller.view(&record.id).await.unwrap();
        assert_eq!(view.status, MatchStatus::Finished);
        assert_eq!(view.reading, ClockReading::Idle);
        assert!(h.controller.tick().await.is_empty());
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn reload_keeps_halftime_applied_during_read() {
        let (h, record) = transition_during_reload("gross").await;

        assert_eq!(status(&h.controller, &record.id).await, MatchStatus::Halftime);
        let reports = h.controller.start_eligible(&[record.id.clone()]).await;
        assert_eq!(reports[0].result, Ok(StartOutcome::StartedSecondHalf));
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn cache_failure_fails_only_that_match() {
        let failing = fixture("klein");
        let other = Match::new(day(), nine(), "gross", "Minis", "C", "D");
        let h = harness(
            vec![failing.clone(), other.clone()],
            Arc::new(ClockCache::in_memory()),
            t0(),
        )
        .await;

        h.cache.fail_next_flushes(1);
        let reports = h
            .controller
            .start_eligible(&[failing.id.clone(), other.id.clone()])
            .await;

        assert!(matches!(
            &reports[0].result,
            Err(ControlError::ClockCache { match_id, .. }) if *match_id == failing.id
        ));
        assert_eq!(reports[1].result, Ok(StartOutcome::StartedFirstHalf));

        assert_eq!(status(&h.controller, &failing.id).await, MatchStatus::Scheduled);
        assert!(!h.controller.writer().is_pending(&failing.id));
        assert!(!h.controller.state.lock().await.clocks.contains_key(&failing.id));
        assert_eq!(h.cache.get(&failing.id), None);

        wait_for_status(&h.store, &other.id, MatchStatus::Running).await;
        h.controller.shutdown().await;
        assert!(h.store.writes().iter().all(|(id, _)| *id != failing.id));
        assert_eq!(h.store.status_of(&failing.id), Some(MatchStatus::Scheduled));
    }

    #[tokio::test]
    async fn poller_follows_calendar_unless_pinned() {
        let next_day = day().succ_opt().unwrap();

        let following = harness(vec![fixture("klein")], Arc::new(ClockCache::in_memory()), t0()).await;
        following.clock.advance(ChronoDuration::days(1));
        let mut events = following.controller.subscribe();
        following.controller.spawn().await;
        assert_eq!(next_board(&mut events).await.date, Some(next_day));
        following.controller.shutdown().await;

        let pinned = harness(vec![fixture("klein")], Arc::new(ClockCache::in_memory()), t0()).await;
        pinned.controller.pin_date(Some(day())).await;
        pinned.clock.advance(ChronoDuration::days(1));
        let mut events = pinned.controller.subscribe();
        pinned.controller.spawn().await;
        assert_eq!(next_board(&mut events).await.date, Some(day()));
        pinned.controller.shutdown().await;
    }

    #[tokio::test]
    async fn halftime_clock_reaches_disk_after_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock-cache.json");
        let record = fixture("gross");
        let cache = Arc::new(ClockCache::new(path.clone()).unwrap());
        let h = harness(vec![record.clone()], cache, t0()).await;

        h.controller.start_eligible(&[record.id.clone()]).await;
        h.clock.advance(ChronoDuration::minutes(10));
        assert_eq!(h.controller.tick().await[0].status, MatchStatus::Halftime);
        assert!(h.cache.get(&record.id).unwrap().in_halftime());

        eventually(|| {
            ClockCache::new(path.clone())
                .ok()
                .and_then(|on_disk| on_disk.get(&record.id))
                .is_some_and(|clock| clock.in_halftime())
        })
        .await;
        h.controller.shutdown().await;
    }
}
