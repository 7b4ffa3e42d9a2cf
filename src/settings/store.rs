use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::settings::Settings;
use crate::variables::VariableRegistry;

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    registry: Arc<VariableRegistry>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, registry: Arc<VariableRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Never fails: a missing or unreadable record yields defaults, a partially
    /// valid one keeps every field that checks out.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            debug!("no settings record at {}, using defaults", self.path.display());
            return Settings::defaults(&self.registry);
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!("failed reading settings {}: {error}", self.path.display());
                return Settings::defaults(&self.registry);
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Settings::from_json_value(&value, &self.registry),
            Err(error) => {
                warn!("settings record {} is not valid JSON: {error}", self.path.display());
                Settings::defaults(&self.registry)
            }
        }
    }

    pub fn save(&self, settings: Settings) -> Result<Settings> {
        let settings = settings.prepared_for_save(&self.registry);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed creating settings directory: {}", parent.display())
                })?;
            }
        }
        let body = serde_json::to_string_pretty(&settings)?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed writing settings: {}", self.path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::settings::store::SettingsStore;
    use crate::settings::Settings;
    use crate::variables::VariableRegistry;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(
            dir.path().join("nested").join("settings.json"),
            Arc::new(VariableRegistry::with_defaults()),
        )
    }

    #[test]
    fn missing_record_loads_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        assert_eq!(store.load(), Settings::defaults(store.registry()));
    }

    #[test]
    fn garbage_record_loads_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(store.path(), "{ not json").expect("write");
        assert_eq!(store.load(), Settings::defaults(store.registry()));
    }

    #[test]
    fn save_then_load_returns_normalized_settings() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut settings = Settings::defaults(store.registry());
        settings.base_url = "http://show-pc:8000/".to_string();
        settings.poll_interval_ms = 10;
        settings.source_labels = vec!["main".to_string(), "backup".to_string()];

        let saved = store.save(settings).expect("save");
        assert_eq!(saved.base_url, "http://show-pc:8000");
        assert_eq!(saved.poll_interval_ms, 250);
        assert_eq!(store.load(), saved);

        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("\"pollIntervalMs\": 250"));
        assert!(raw.contains("\"variableDisplayOrder\""));
    }

    #[test]
    fn partially_corrupted_record_keeps_good_fields() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(
            store.path(),
            r#"{"baseUrl": 12, "pollIntervalMs": 750, "sourceLabels": ["a", "b"]}"#,
        )
        .expect("write");
        let loaded = store.load();
        assert_eq!(loaded.base_url, Settings::defaults(store.registry()).base_url);
        assert_eq!(loaded.poll_interval_ms, 750);
        assert_eq!(loaded.source_labels, vec!["a", "b"]);
    }
}
