use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::poll::{PollOrchestrator, PollState};
use crate::settings::order::MoveDirection;
use crate::settings::store::SettingsStore;
use crate::settings::{Settings, SettingsDraft, SettingsError, RECOMMENDED_POLL_INTERVAL_MS};
use crate::variables::VariableRegistry;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Invalid(#[from] SettingsError),
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

pub struct Monitor {
    store: SettingsStore,
    orchestrator: PollOrchestrator,
    current: RwLock<Arc<Settings>>,
    record: Mutex<SavedRecord>,
}

// Updates hold this lock from reading the record until polling restarts.
struct SavedRecord {
    settings: Settings,
    base_url_override: Option<String>,
}

impl SavedRecord {
    fn running(&self) -> Settings {
        match &self.base_url_override {
            Some(url) => self.settings.clone().with_base_url(url),
            None => self.settings.clone(),
        }
    }
}

impl Monitor {
    pub fn new(store: SettingsStore, orchestrator: PollOrchestrator, settings: Settings) -> Self {
        Self {
            store,
            orchestrator,
            current: RwLock::new(Arc::new(settings.clone())),
            record: Mutex::new(SavedRecord {
                settings,
                base_url_override: None,
            }),
        }
    }

    /// Polls `base_url` instead of the saved one until a save names a new URL.
    /// The override itself is never written to the settings record.
    pub fn with_base_url_override(self, base_url: Option<String>) -> Self {
        {
            let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
            record.base_url_override = base_url;
            let running = Arc::new(record.running());
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = running;
        }
        self
    }

    pub fn settings(&self) -> Arc<Settings> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    pub fn registry(&self) -> &VariableRegistry {
        self.store.registry()
    }

    pub fn state(&self) -> PollState {
        self.orchestrator.state()
    }

    pub fn start(&self) {
        self.orchestrator.start(self.settings());
    }

    pub fn apply(&self, draft: SettingsDraft) -> Result<Arc<Settings>, ApplyError> {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        let names_base_url = draft.base_url.is_some();
        let next = draft.apply(&record.settings, self.registry())?;
        if names_base_url {
            record.base_url_override = None;
        }
        self.install(&mut record, next)
    }

    pub fn move_variable(
        &self,
        variable_id: &str,
        direction: MoveDirection,
    ) -> Result<Option<Arc<Settings>>, ApplyError> {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = record.settings.clone();
        if !next.move_variable(variable_id, direction) {
            return Ok(None);
        }
        self.install(&mut record, next).map(Some)
    }

    fn install(
        &self,
        record: &mut SavedRecord,
        settings: Settings,
    ) -> Result<Arc<Settings>, ApplyError> {
        record.settings = self.store.save(settings)?;
        info!("settings saved to {}", self.store.path().display());
        let running = Arc::new(record.running());
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&running);
        }
        if !running.poll_interval_is_recommended() {
            warn!(
                "poll interval {} ms differs from the recommended {RECOMMENDED_POLL_INTERVAL_MS} ms",
                running.poll_interval_ms
            );
        }
        self.orchestrator.start(Arc::clone(&running));
        Ok(running)
    }
}
