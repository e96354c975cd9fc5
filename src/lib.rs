pub mod clock;
pub mod db;
pub mod eligibility;
pub mod fields;
pub mod live;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod schedule;
pub mod settings;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{info, warn};

use clock::{ClockCache, SystemClock};
use db::{Database, MatchStore};
use fields::FieldRegistry;
use orchestrator::LiveController;
use settings::SettingsStore;

const DATABASE_FILE: &str = "matchday.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const CLOCK_CACHE_FILE: &str = "clock-cache.json";

/// Everything one console needs, opened from a single data directory.
pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub clock_cache: Arc<ClockCache>,
    data_dir: PathBuf,
}

impl AppState {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let clock_cache = ClockCache::new(data_dir.join(CLOCK_CACHE_FILE))?;

        // Clocks left behind by a console that stopped mid-match.
        let recovered = clock_cache.all();
        if !recovered.is_empty() {
            info!(
                "Recovered {} match clock(s) from the previous session",
                recovered.len()
            );
        }

        Ok(Self {
            db,
            settings,
            clock_cache: Arc::new(clock_cache),
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Stored field configuration, or the built-in set when nothing is
    /// stored yet.
    pub async fn field_registry(&self) -> Result<FieldRegistry> {
        let stored = self.db.load_field_configs().await?;
        if stored.is_empty() {
            warn!("No field configuration stored; using built-in defaults");
            return Ok(FieldRegistry::defaults());
        }
        Ok(FieldRegistry::new(stored))
    }

    /// Live controller on the system clock. Must be called inside a tokio
    /// runtime.
    pub fn controller(&self) -> LiveController<Database> {
        LiveController::new(
            self.db.clone(),
            self.clock_cache.clone(),
            Arc::new(SystemClock),
            &self.settings.get(),
        )
    }
}

/// Reads `RUST_LOG`, with everything at info and above shown by default.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
