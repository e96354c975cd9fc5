//! Observer-local store of the last known clock per match, so a restarted
//! console resumes a running clock without waiting for the server.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Mutex, PoisonError, RwLock},
};

use anyhow::{Context, Result};
use log::warn;

use super::ClockState;

pub struct ClockCache {
    path: Option<PathBuf>,
    data: RwLock<HashMap<String, ClockState>>,
    /// Serializes flushes so an older snapshot never lands after a newer one.
    flush_lock: Mutex<()>,
    #[cfg(test)]
    failing_flushes: std::sync::atomic::AtomicUsize,
}

impl ClockCache {
    /// Opens the cache file, starting empty when it is missing or
    /// unreadable.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read clock cache from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Discarding unreadable clock cache {}: {err}", path.display());
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self::with_data(Some(path), data))
    }

    /// Cache that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_data(None, HashMap::new())
    }

    fn with_data(path: Option<PathBuf>, data: HashMap<String, ClockState>) -> Self {
        Self {
            path,
            data: RwLock::new(data),
            flush_lock: Mutex::new(()),
            #[cfg(test)]
            failing_flushes: Default::default(),
        }
    }

    pub fn get(&self, match_id: &str) -> Option<ClockState> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(match_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<ClockState> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Records `state` and writes the cache through. On a failed write the
    /// previous entry is restored, so memory never runs ahead of disk.
    pub fn put(&self, state: ClockState) -> Result<()> {
        let match_id = state.match_id.clone();
        let previous = self.set(state);
        if let Err(err) = self.flush() {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            match previous {
                Some(previous) => guard.insert(match_id, previous),
                None => guard.remove(&match_id),
            };
            return Err(err);
        }
        Ok(())
    }

    pub fn remove(&self, match_id: &str) -> Result<()> {
        if self.discard(match_id) {
            self.flush()?;
        }
        Ok(())
    }

    /// Updates memory only; pair with [`Self::flush`]. Returns the entry
    /// it replaced.
    pub fn set(&self, state: ClockState) -> Option<ClockState> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.match_id.clone(), state)
    }

    /// Drops an entry from memory only. Returns whether it existed.
    pub fn discard(&self, match_id: &str) -> bool {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(match_id)
            .is_some()
    }

    /// Writes the current contents to disk. Blocking.
    pub fn flush(&self) -> Result<()> {
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let failing = self
                .failing_flushes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                anyhow::bail!("injected clock cache failure");
            }
        }

        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = {
            let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*guard)?
        };
        // A crash mid-write leaves the previous snapshot in place.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serialized)
            .with_context(|| format!("Failed to write clock cache to {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace clock cache {}", path.display()))
    }

    /// The next `n` flushes fail.
    #[cfg(test)]
    pub(crate) fn fail_next_flushes(&self, n: usize) {
        self.failing_flushes
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }
}
