pub mod order;
pub mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::settings::order::{move_variable, normalize_variable_order, MoveDirection};
use crate::variables::VariableRegistry;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const RECOMMENDED_POLL_INTERVAL_MS: u64 = 1000;
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.3;
pub const DEFAULT_SOURCE_LABELS: [&str; 2] = ["qlabfb", "qlabfb-backup"];
pub const DEFAULT_SELECTED_VARIABLES: [&str; 3] = ["e_time", "r_name", "r_left"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub tolerance_seconds: f64,
    pub source_labels: Vec<String>,
    pub selected_variable_ids: Vec<String>,
    pub variable_display_order: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("please provide at least two source labels (got {0})")]
    TooFewSources(usize),
    #[error("please select at least one variable to compare")]
    NoVariablesSelected,
    #[error("unknown variable id: {0}")]
    UnknownVariable(String),
}

impl Settings {
    pub fn defaults(registry: &VariableRegistry) -> Self {
        let selected = default_selection(registry);
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            source_labels: DEFAULT_SOURCE_LABELS.iter().map(|s| s.to_string()).collect(),
            variable_display_order: normalize_variable_order::<&str>(registry, &[]),
            selected_variable_ids: selected,
        }
    }

    /// Reads a persisted record field by field. A bad field falls back to its own
    /// default and never invalidates its neighbours.
    pub fn from_json_value(value: &Value, registry: &VariableRegistry) -> Self {
        let defaults = Self::defaults(registry);
        let Some(object) = value.as_object() else {
            return defaults;
        };

        let base_url = field(object, "baseUrl", "companionUrl")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(defaults.base_url);

        let poll_interval_ms = finite_number(object.get("pollIntervalMs"))
            .map(|ms| ms.max(0.0).round() as u64)
            .unwrap_or(defaults.poll_interval_ms);

        let tolerance_seconds =
            finite_number(field(object, "toleranceSeconds", "eTimeToleranceSeconds"))
                .filter(|tolerance| *tolerance >= 0.0)
                .unwrap_or(defaults.tolerance_seconds);

        let source_labels = parse_source_labels(field(object, "sourceLabels", "connectionLabels"))
            .unwrap_or(defaults.source_labels);

        let selected_variable_ids = parse_selected(
            field(object, "selectedVariableIds", "selectedVariables"),
            registry,
        )
        .unwrap_or(defaults.selected_variable_ids);

        let variable_display_order = match field(object, "variableDisplayOrder", "variableOrder")
            .and_then(Value::as_array)
            .filter(|entries| !entries.is_empty())
        {
            Some(entries) => {
                let raw = entries.iter().filter_map(scalar_to_string).collect::<Vec<_>>();
                normalize_variable_order(registry, &raw)
            }
            None => normalize_variable_order(registry, &selected_variable_ids),
        };

        Self {
            base_url,
            poll_interval_ms,
            tolerance_seconds,
            source_labels,
            selected_variable_ids,
            variable_display_order,
        }
    }

    pub fn prepared_for_save(mut self, registry: &VariableRegistry) -> Self {
        self.base_url = strip_trailing_slash(self.base_url.trim());
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        if !self.tolerance_seconds.is_finite() || self.tolerance_seconds < 0.0 {
            self.tolerance_seconds = 0.0;
        }
        self.variable_display_order =
            normalize_variable_order(registry, &self.variable_display_order);
        let mut selected: Vec<String> = Vec::with_capacity(self.selected_variable_ids.len());
        for id in &self.selected_variable_ids {
            if registry.contains(id) && !selected.contains(id) {
                selected.push(id.clone());
            }
        }
        self.selected_variable_ids = if selected.is_empty() {
            default_selection(registry)
        } else {
            selected
        };
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn poll_interval_is_recommended(&self) -> bool {
        self.poll_interval_ms == RECOMMENDED_POLL_INTERVAL_MS
    }

    /// True when `next` moves to a non-recommended interval. A value that only
    /// differs because the save floor raised it does not count as a change.
    pub fn introduces_unrecommended_interval(&self, next: &Settings) -> bool {
        let current = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        next.poll_interval_ms != current && !next.poll_interval_is_recommended()
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = strip_trailing_slash(base_url.trim());
        self
    }

    pub fn move_variable(&mut self, variable_id: &str, direction: MoveDirection) -> bool {
        if !move_variable(&mut self.variable_display_order, variable_id, direction) {
            return false;
        }
        let order = &self.variable_display_order;
        self.selected_variable_ids
            .sort_by_key(|id| order.iter().position(|o| o == id));
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDraft {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<f64>,
    #[serde(default)]
    pub tolerance_seconds: Option<f64>,
    #[serde(default)]
    pub source_labels: Option<Vec<String>>,
    #[serde(default)]
    pub selected_variable_ids: Option<Vec<String>>,
    #[serde(default)]
    pub variable_display_order: Option<Vec<String>>,
}

impl SettingsDraft {
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.poll_interval_ms.is_none()
            && self.tolerance_seconds.is_none()
            && self.source_labels.is_none()
            && self.selected_variable_ids.is_none()
            && self.variable_display_order.is_none()
    }

    pub fn apply(
        self,
        current: &Settings,
        registry: &VariableRegistry,
    ) -> Result<Settings, SettingsError> {
        let source_labels = match self.source_labels {
            Some(raw) => {
                let labels = raw
                    .iter()
                    .map(|label| label.trim())
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                if labels.len() < 2 {
                    return Err(SettingsError::TooFewSources(labels.len()));
                }
                labels
            }
            None => current.source_labels.clone(),
        };

        let variable_display_order = normalize_variable_order(
            registry,
            self.variable_display_order
                .as_deref()
                .unwrap_or(current.variable_display_order.as_slice()),
        );

        let requested = match self.selected_variable_ids {
            Some(raw) => {
                let mut ids = Vec::with_capacity(raw.len());
                for id in raw {
                    let variable = registry
                        .resolve(&id)
                        .map_err(|_| SettingsError::UnknownVariable(id.clone()))?;
                    ids.push(variable.id.clone());
                }
                ids
            }
            None => current.selected_variable_ids.clone(),
        };
        let selected_variable_ids = variable_display_order
            .iter()
            .filter(|id| requested.contains(id))
            .cloned()
            .collect::<Vec<_>>();
        if selected_variable_ids.is_empty() {
            return Err(SettingsError::NoVariablesSelected);
        }

        let poll_interval_ms = match self.poll_interval_ms {
            // Negative values land on the floor; only 0 and non-finite input reset.
            Some(ms) if ms.is_finite() && ms != 0.0 => ms.max(0.0).round() as u64,
            Some(_) => DEFAULT_POLL_INTERVAL_MS,
            None => current.poll_interval_ms,
        }
        .max(MIN_POLL_INTERVAL_MS);

        let tolerance_seconds = match self.tolerance_seconds {
            Some(tolerance) if tolerance.is_finite() => tolerance.max(0.0),
            Some(_) => 0.0,
            None => current.tolerance_seconds,
        };

        let base_url = match self.base_url {
            Some(url) => strip_trailing_slash(url.trim()),
            None => current.base_url.clone(),
        };

        Ok(Settings {
            base_url,
            poll_interval_ms,
            tolerance_seconds,
            source_labels,
            selected_variable_ids,
            variable_display_order,
        })
    }
}

fn default_selection(registry: &VariableRegistry) -> Vec<String> {
    let selected = DEFAULT_SELECTED_VARIABLES
        .iter()
        .filter(|id| registry.contains(id))
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    if selected.is_empty() {
        registry.ids().into_iter().take(1).collect()
    } else {
        selected
    }
}

fn strip_trailing_slash(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

fn field<'a>(object: &'a Map<String, Value>, key: &str, legacy_key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| object.get(legacy_key))
}

fn finite_number(value: Option<&Value>) -> Option<f64> {
    value?.as_f64().filter(|v| v.is_finite())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_source_labels(value: Option<&Value>) -> Option<Vec<String>> {
    let entries = value?.as_array()?;
    if entries.len() < 2 {
        return None;
    }
    entries.iter().map(scalar_to_string).collect()
}

fn parse_selected(value: Option<&Value>, registry: &VariableRegistry) -> Option<Vec<String>> {
    let entries = value?.as_array()?;
    let mut out: Vec<String> = Vec::new();
    for id in entries.iter().filter_map(Value::as_str) {
        if registry.contains(id) && !out.iter().any(|existing| existing == id) {
            out.push(id.to_string());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::settings::{
        Settings, SettingsDraft, SettingsError, DEFAULT_POLL_INTERVAL_MS,
        DEFAULT_TOLERANCE_SECONDS,
    };
    use crate::variables::VariableRegistry;

    #[test]
    fn non_object_record_yields_defaults() {
        let registry = VariableRegistry::with_defaults();
        let settings = Settings::from_json_value(&json!([1, 2, 3]), &registry);
        assert_eq!(settings, Settings::defaults(&registry));
    }

    #[test]
    fn corrupted_field_falls_back_alone() {
        let registry = VariableRegistry::with_defaults();
        let record = json!({
            "baseUrl": "http://10.0.0.5:8000/",
            "pollIntervalMs": "fast",
            "toleranceSeconds": 0.5,
            "sourceLabels": ["main", "backup", "spare"],
            "selectedVariableIds": ["n_name", "e_time"],
            "variableDisplayOrder": ["n_name", "e_time"]
        });
        let settings = Settings::from_json_value(&record, &registry);
        assert_eq!(settings.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(settings.base_url, "http://10.0.0.5:8000/");
        assert_eq!(settings.tolerance_seconds, 0.5);
        assert_eq!(settings.source_labels, vec!["main", "backup", "spare"]);
        assert_eq!(settings.selected_variable_ids, vec!["n_name", "e_time"]);
        assert_eq!(
            settings.variable_display_order,
            vec!["n_name", "e_time", "r_name", "r_left"]
        );
    }

    #[test]
    fn poll_interval_is_not_floored_on_load() {
        let registry = VariableRegistry::with_defaults();
        let settings = Settings::from_json_value(&json!({ "pollIntervalMs": 100 }), &registry);
        assert_eq!(settings.poll_interval_ms, 100);
        let saved = settings.prepared_for_save(&registry);
        assert_eq!(saved.poll_interval_ms, 250);
    }

    #[test]
    fn invalid_labels_tolerance_and_selection_use_defaults() {
        let registry = VariableRegistry::with_defaults();
        let record = json!({
            "toleranceSeconds": -1.0,
            "sourceLabels": ["only-one"],
            "selectedVariableIds": ["nope", 42],
        });
        let settings = Settings::from_json_value(&record, &registry);
        let defaults = Settings::defaults(&registry);
        assert_eq!(settings.tolerance_seconds, DEFAULT_TOLERANCE_SECONDS);
        assert_eq!(settings.source_labels, defaults.source_labels);
        assert_eq!(settings.selected_variable_ids, defaults.selected_variable_ids);
    }

    #[test]
    fn scalar_labels_are_stringified_and_nested_values_rejected() {
        let registry = VariableRegistry::with_defaults();
        let settings =
            Settings::from_json_value(&json!({ "sourceLabels": [1, true, "c"] }), &registry);
        assert_eq!(settings.source_labels, vec!["1", "true", "c"]);

        let nested =
            Settings::from_json_value(&json!({ "sourceLabels": ["a", ["b"]] }), &registry);
        assert_eq!(nested.source_labels, Settings::defaults(&registry).source_labels);
    }

    #[test]
    fn legacy_keys_are_accepted() {
        let registry = VariableRegistry::with_defaults();
        let record = json!({
            "companionUrl": "http://192.168.1.20:8000",
            "eTimeToleranceSeconds": 0.2,
            "connectionLabels": ["qlab-a", "qlab-b"],
            "selectedVariables": ["r_left"],
            "variableOrder": ["r_left", "n_name"]
        });
        let settings = Settings::from_json_value(&record, &registry);
        assert_eq!(settings.base_url, "http://192.168.1.20:8000");
        assert_eq!(settings.tolerance_seconds, 0.2);
        assert_eq!(settings.source_labels, vec!["qlab-a", "qlab-b"]);
        assert_eq!(settings.selected_variable_ids, vec!["r_left"]);
        assert_eq!(settings.variable_display_order[..2], ["r_left", "n_name"]);
    }

    #[test]
    fn missing_display_order_follows_selection() {
        let registry = VariableRegistry::with_defaults();
        let settings = Settings::from_json_value(
            &json!({ "selectedVariableIds": ["r_left", "r_name"] }),
            &registry,
        );
        assert_eq!(
            settings.variable_display_order,
            vec!["r_left", "r_name", "e_time", "n_name"]
        );
    }

    #[test]
    fn save_preparation_strips_slash_and_keeps_selection_subset() {
        let registry = VariableRegistry::with_defaults();
        let mut settings = Settings::defaults(&registry);
        settings.base_url = "http://host:8000/ ".to_string();
        settings.selected_variable_ids = vec!["bogus".to_string()];
        let saved = settings.prepared_for_save(&registry);
        assert_eq!(saved.base_url, "http://host:8000");
        assert_eq!(saved.selected_variable_ids, vec!["e_time", "r_name", "r_left"]);
        assert!(saved
            .selected_variable_ids
            .iter()
            .all(|id| saved.variable_display_order.contains(id)));
    }

    #[test]
    fn draft_validates_like_the_settings_form() {
        let registry = VariableRegistry::with_defaults();
        let current = Settings::defaults(&registry);

        let too_few = SettingsDraft {
            source_labels: Some(vec!["a".to_string(), "  ".to_string()]),
            ..SettingsDraft::default()
        };
        assert_eq!(
            too_few.apply(&current, &registry),
            Err(SettingsError::TooFewSources(1))
        );

        let none_selected = SettingsDraft {
            selected_variable_ids: Some(Vec::new()),
            ..SettingsDraft::default()
        };
        assert_eq!(
            none_selected.apply(&current, &registry),
            Err(SettingsError::NoVariablesSelected)
        );

        let unknown = SettingsDraft {
            selected_variable_ids: Some(vec!["q_number".to_string()]),
            ..SettingsDraft::default()
        };
        assert_eq!(
            unknown.apply(&current, &registry),
            Err(SettingsError::UnknownVariable("q_number".to_string()))
        );
    }

    #[test]
    fn draft_normalizes_values_and_orders_selection_by_display_order() {
        let registry = VariableRegistry::with_defaults();
        let current = Settings::defaults(&registry);
        let draft = SettingsDraft {
            base_url: Some(" http://10.1.1.1:8000/ ".to_string()),
            poll_interval_ms: Some(100.0),
            tolerance_seconds: Some(-2.0),
            source_labels: Some(vec![" a ".to_string(), "b".to_string(), String::new()]),
            selected_variable_ids: Some(vec!["e_time".to_string(), "n_name".to_string()]),
            variable_display_order: Some(vec!["n_name".to_string()]),
        };
        let settings = draft.apply(&current, &registry).expect("draft should apply");
        assert_eq!(settings.base_url, "http://10.1.1.1:8000");
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.tolerance_seconds, 0.0);
        assert_eq!(settings.source_labels, vec!["a", "b"]);
        assert_eq!(settings.selected_variable_ids, vec!["n_name", "e_time"]);

        let zero_interval = SettingsDraft {
            poll_interval_ms: Some(0.0),
            ..SettingsDraft::default()
        };
        let settings = zero_interval.apply(&current, &registry).expect("draft should apply");
        assert_eq!(settings.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn floored_hand_edited_interval_is_not_a_change() {
        let registry = VariableRegistry::with_defaults();
        let current = Settings::from_json_value(&json!({ "pollIntervalMs": 100 }), &registry);
        let tolerance_only = SettingsDraft {
            tolerance_seconds: Some(0.2),
            ..SettingsDraft::default()
        }
        .apply(&current, &registry)
        .expect("draft should apply");
        assert_eq!(tolerance_only.poll_interval_ms, 250);
        assert!(!current.introduces_unrecommended_interval(&tolerance_only));

        let slower = SettingsDraft {
            poll_interval_ms: Some(2000.0),
            ..SettingsDraft::default()
        }
        .apply(&current, &registry)
        .expect("draft should apply");
        assert!(current.introduces_unrecommended_interval(&slower));

        let recommended = SettingsDraft {
            poll_interval_ms: Some(1000.0),
            ..SettingsDraft::default()
        }
        .apply(&current, &registry)
        .expect("draft should apply");
        assert!(!current.introduces_unrecommended_interval(&recommended));
    }

    #[test]
    fn negative_poll_interval_clamps_to_floor() {
        let registry = VariableRegistry::with_defaults();
        let current = Settings::defaults(&registry);
        for (raw, expected) in [(-500.0, 250), (f64::NAN, DEFAULT_POLL_INTERVAL_MS), (400.0, 400)] {
            let draft = SettingsDraft {
                poll_interval_ms: Some(raw),
                ..SettingsDraft::default()
            };
            let settings = draft.apply(&current, &registry).expect("draft should apply");
            assert_eq!(settings.poll_interval_ms, expected, "input {raw}");
        }
    }

    #[test]
    fn empty_draft_reproduces_current_settings() {
        let registry = VariableRegistry::with_defaults();
        let current = Settings::defaults(&registry);
        let draft = SettingsDraft::default();
        assert!(draft.is_empty());
        assert_eq!(draft.apply(&current, &registry), Ok(current));
    }
}
