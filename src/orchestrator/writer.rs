//! Status write queue between the live loop and storage.
//!
//! The tick loop never waits on storage: it hands each status change to
//! this queue and carries on with its local state. Writes are delivered at
//! least once, in order per match, and a newer write for a match replaces
//! an older one that has not been delivered yet. Failed writes are retried
//! with exponential backoff until they land or the queue is shut down.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::Rng;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    db::MatchStore,
    models::{MatchStatus, Score},
    settings::RetryPolicy,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone)]
struct PendingWrite {
    match_id: String,
    status: MatchStatus,
    score: Option<Score>,
}

/// Undelivered write count per match.
type PendingCounts = Arc<Mutex<HashMap<String, usize>>>;

#[derive(Clone)]
pub struct StatusWriter {
    tx: mpsc::UnboundedSender<PendingWrite>,
    pending: PendingCounts,
    cancel: CancellationToken,
    handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl StatusWriter {
    /// Starts the delivery task. Must be called inside a tokio runtime.
    pub fn spawn<S: MatchStore>(store: S, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: PendingCounts = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_loop(store, rx, pending.clone(), policy, cancel.clone()));

        Self {
            tx,
            pending,
            cancel,
            handle: Arc::new(tokio::sync::Mutex::new(Some(handle))),
        }
    }

    pub fn enqueue(&self, match_id: &str, status: MatchStatus, score: Option<Score>) {
        *self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(match_id.to_string())
            .or_default() += 1;

        let write = PendingWrite {
            match_id: match_id.to_string(),
            status,
            score,
        };
        if let Err(err) = self.tx.send(write) {
            log_error!(
                "status write for match {} not queued, writer is stopped: {:?}",
                match_id,
                err.0.status
            );
            settle(&self.pending, match_id);
        }
    }

    /// Whether a write for `match_id` has not reached storage yet.
    pub fn is_pending(&self, match_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(match_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Stops retrying. Queued writes get one last attempt; whatever still
    /// fails is logged.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                log_error!("status writer task failed to join: {err}");
            }
        }
    }
}

fn settle(pending: &PendingCounts, match_id: &str) {
    let mut guard = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(count) = guard.get_mut(match_id) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            guard.remove(match_id);
        }
    }
}

/// Last write wins per match; a score carried by the superseded write is
/// kept unless the newer write brings its own.
fn coalesce(queue: &mut VecDeque<PendingWrite>, pending: &PendingCounts, mut write: PendingWrite) {
    match queue.iter_mut().find(|queued| queued.match_id == write.match_id) {
        Some(queued) => {
            write.score = write.score.or(queued.score);
            *queued = write;
            settle(pending, &queued.match_id);
        }
        None => queue.push_back(write),
    }
}

fn backoff_delay(backoff: Duration, policy: &RetryPolicy) -> Duration {
    let jitter = if policy.jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=policy.jitter_ms)
    };
    backoff + Duration::from_millis(jitter)
}

async fn write_loop<S: MatchStore>(
    store: S,
    mut rx: mpsc::UnboundedReceiver<PendingWrite>,
    pending: PendingCounts,
    policy: RetryPolicy,
    cancel: CancellationToken,
) {
    let initial = Duration::from_millis(policy.initial_backoff_ms.max(1));
    let max = Duration::from_millis(policy.max_backoff_ms.max(policy.initial_backoff_ms));
    let mut backoff = initial;
    let mut queue: VecDeque<PendingWrite> = VecDeque::new();

    loop {
        while let Ok(write) = rx.try_recv() {
            coalesce(&mut queue, &pending, write);
        }

        let Some(head) = queue.front().cloned() else {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(write) => {
                        coalesce(&mut queue, &pending, write);
                        continue;
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        };

        match store
            .save_match_status(&head.match_id, head.status, head.score)
            .await
        {
            Ok(()) => {
                queue.pop_front();
                settle(&pending, &head.match_id);
                backoff = initial;
            }
            Err(err) => {
                log_warn!(
                    "saving status {} for match {} failed, retrying in {:?}: {err:#}",
                    head.status,
                    head.match_id,
                    backoff
                );
                let delay = backoff_delay(backoff, &policy);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => break,
                }
                backoff = (backoff * 2).min(max);
            }
        }
    }

    // Final attempt for everything still queued.
    while let Ok(write) = rx.try_recv() {
        coalesce(&mut queue, &pending, write);
    }
    let mut undelivered = 0usize;
    for write in queue {
        match store
            .save_match_status(&write.match_id, write.status, write.score)
            .await
        {
            Ok(()) => settle(&pending, &write.match_id),
            Err(err) => {
                undelivered += 1;
                log_error!(
                    "status {} for match {} not saved at shutdown: {err:#}",
                    write.status,
                    write.match_id
                );
            }
        }
    }
    log_info!("status writer stopped ({} writes undelivered)", undelivered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::store::testing::MemoryStore, models::Match};
    use chrono::{NaiveDate, NaiveTime};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            jitter_ms: 0,
        }
    }

    fn scheduled() -> Match {
        Match::new(
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            "platz-1",
            "Minis",
            "A",
            "B",
        )
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn failed_writes_are_retried_until_delivered() {
        let record = scheduled();
        let store = MemoryStore::with(vec![record.clone()], Vec::new());
        store.fail_next_writes(3);

        let writer = StatusWriter::spawn(store.clone(), fast_policy());
        writer.enqueue(&record.id, MatchStatus::Running, None);
        assert!(writer.is_pending(&record.id));

        wait_until(|| store.status_of(&record.id) == Some(MatchStatus::Running)).await;
        wait_until(|| !writer.is_pending(&record.id)).await;
        assert_eq!(writer.pending_count(), 0);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn newer_write_supersedes_undelivered_one() {
        let record = scheduled();
        let store = MemoryStore::with(vec![record.clone()], Vec::new());
        store.fail_next_writes(2);

        let writer = StatusWriter::spawn(store.clone(), fast_policy());
        writer.enqueue(&record.id, MatchStatus::Running, None);
        writer.enqueue(&record.id, MatchStatus::Finished, Some(Score { home: 2, away: 1 }));

        wait_until(|| store.status_of(&record.id) == Some(MatchStatus::Finished)).await;
        wait_until(|| writer.pending_count() == 0).await;

        // Never regresses to Running after Finished landed.
        let writes = store.writes();
        assert_eq!(writes.last().map(|w| w.1), Some(MatchStatus::Finished));
        writer.shutdown().await;
    }

    #[test]
    fn coalesce_keeps_earlier_score() {
        let pending: PendingCounts = Arc::new(Mutex::new(HashMap::from([("m".to_string(), 2)])));
        let mut queue = VecDeque::new();
        coalesce(
            &mut queue,
            &pending,
            PendingWrite {
                match_id: "m".into(),
                status: MatchStatus::Running,
                score: Some(Score { home: 1, away: 0 }),
            },
        );
        coalesce(
            &mut queue,
            &pending,
            PendingWrite {
                match_id: "m".into(),
                status: MatchStatus::Finished,
                score: None,
            },
        );

        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, MatchStatus::Finished);
        assert_eq!(queue[0].score, Some(Score { home: 1, away: 0 }));
        assert_eq!(pending.lock().unwrap().get("m"), Some(&1));
    }
}
