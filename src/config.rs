use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::alert::rules::AlertRules;
use crate::fetch::http::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::variables::{TrackedVariable, VariableRegistry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsFileConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub version: VersionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub variables: Vec<TrackedVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsFileConfig {
    #[serde(default = "default_settings_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// CSV release ledger. Empty disables the check.
    #[serde(default)]
    pub ledger_url: String,
    /// Optional JSON file whose `version` field overrides the build version.
    #[serde(default)]
    pub descriptor_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_true")]
    pub enable_log: bool,
    #[serde(default)]
    pub webhook: String,
    #[serde(default)]
    pub rules: AlertRules,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub settings_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/qlab-sync-monitor/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.settings_path {
            self.settings.path = path.to_string_lossy().to_string();
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_settings_path(&self) -> PathBuf {
        expand_tilde(&self.settings.path)
    }

    pub fn resolved_descriptor_path(&self) -> Option<PathBuf> {
        let raw = self.version.descriptor_path.trim();
        (!raw.is_empty()).then(|| expand_tilde(raw))
    }

    pub fn http_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.http.timeout_secs.max(1)),
            Duration::from_secs(self.http.connect_timeout_secs.max(1)),
        )
    }

    pub fn registry(&self) -> VariableRegistry {
        VariableRegistry::with_defaults().extended(self.variables.clone())
    }

    pub fn default_template() -> String {
        let template = r#"[settings]
path = "~/.config/qlab-sync-monitor/settings.json"

[http]
timeout_secs = 10
connect_timeout_secs = 5

[version]
enabled = true
app_name = "qlab-sync-monitor"
ledger_url = ""
descriptor_path = ""

[server]
host = "127.0.0.1"
port = 8787

[alerts]
enable_log = true
webhook = ""

[alerts.rules]
sync_lost = true
drift_detected = true
sync_restored = true

# Extra variables to compare, appended after the built-in catalog.
# [[variables]]
# id = "n_notes"
# display_prefix = "Notes:"
# setting_label = "Cue notes (`n_notes`)"
# rule = "string_equality"
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for SettingsFileConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: default_app_name(),
            ledger_url: String::new(),
            descriptor_path: String::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enable_log: true,
            webhook: String::new(),
            rules: AlertRules::default(),
        }
    }
}

fn default_settings_path() -> String {
    "~/.config/qlab-sync-monitor/settings.json".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_app_name() -> String {
    "qlab-sync-monitor".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::config::{Config, ConfigOverrides};
    use crate::variables::ComparisonRule;

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_template()).expect("template");
        let defaults = Config::default();
        assert_eq!(parsed.settings.path, defaults.settings.path);
        assert_eq!(parsed.server.port, 8787);
        assert!(parsed.alerts.rules.sync_lost);
        assert!(parsed.variables.is_empty());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = Config::load(Some(&dir.path().join("absent.toml"))).expect("load");
        assert_eq!(config.http.timeout_secs, 10);
        assert!(config.resolved_descriptor_path().is_none());
    }

    #[test]
    fn extra_variables_extend_the_catalog() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[alerts.rules]
sync_restored = false

[[variables]]
id = "n_notes"
display_prefix = "Notes:"
setting_label = "Cue notes"
rule = "string_equality"

[[variables]]
id = "e_time"
display_prefix = "ignored"
setting_label = "ignored"
rule = "string_equality"
"#,
        )
        .expect("write");

        let config = Config::load(Some(&path)).expect("load");
        assert!(!config.alerts.rules.sync_restored);
        assert!(config.alerts.rules.drift_detected);

        let registry = config.registry();
        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.by_id("e_time").expect("e_time").rule,
            ComparisonRule::NumericTolerance
        );
        assert_eq!(
            registry.ids().last().map(String::as_str),
            Some("n_notes")
        );
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            settings_path: Some("/tmp/monitor.json".into()),
            host: None,
            port: Some(9000),
        });
        assert_eq!(
            config.resolved_settings_path(),
            std::path::PathBuf::from("/tmp/monitor.json")
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
