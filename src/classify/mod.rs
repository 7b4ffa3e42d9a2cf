pub mod rules;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::rules::values_in_sync;
use crate::fetch::FetchResult;
use crate::settings::Settings;
use crate::variables::{TrackedVariable, VariableRegistry};

pub const NO_VALUE: &str = "—";
pub const LOST_MARKER: &str = "lost";
pub const DETAIL_SEPARATOR: &str = "  |  ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    InSync,
    Drifting,
    Lost,
}

impl SyncState {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::InSync => "sync",
            Self::Drifting => "drift",
            Self::Lost => "lost",
        }
    }
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::InSync => "In sync",
            Self::Drifting => "Out of sync",
            Self::Lost => "Connection lost",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDetail {
    pub source_label: String,
    pub primary: bool,
    pub value: Option<String>,
}

impl Display for SourceDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = self.value.as_deref().unwrap_or(LOST_MARKER);
        write!(f, "{}: {value}", self.source_label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableStatus {
    pub variable_id: String,
    pub display_prefix: String,
    pub state: SyncState,
    pub representative_value: String,
    pub sources: Vec<SourceDetail>,
}

impl VariableStatus {
    pub fn title(&self) -> String {
        format!("{} {}", self.display_prefix, self.representative_value)
    }

    pub fn detail_line(&self) -> String {
        self.sources
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(DETAIL_SEPARATOR)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStatus {
    pub state: SyncState,
    pub in_sync: usize,
    pub drifting: usize,
    pub lost: usize,
}

impl SystemStatus {
    pub fn from_variables(variables: &[VariableStatus]) -> Self {
        let mut status = Self {
            state: SyncState::InSync,
            in_sync: 0,
            drifting: 0,
            lost: 0,
        };
        for variable in variables {
            match variable.state {
                SyncState::InSync => status.in_sync += 1,
                SyncState::Drifting => status.drifting += 1,
                SyncState::Lost => status.lost += 1,
            }
            status.state = status.state.max(variable.state);
        }
        status
    }

    pub fn headline(&self) -> String {
        self.state.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub polled_at: DateTime<Utc>,
    pub sources: Vec<String>,
    pub system: SystemStatus,
    pub variables: Vec<VariableStatus>,
}

impl TickReport {
    pub fn variable(&self, variable_id: &str) -> Option<&VariableStatus> {
        self.variables.iter().find(|v| v.variable_id == variable_id)
    }
}

pub fn classify(
    variable: &TrackedVariable,
    results: &[FetchResult],
    sources: &[String],
    tolerance: f64,
) -> VariableStatus {
    // Duplicate labels each claim their own result, in fetch order.
    let mut claimed = vec![false; results.len()];
    let details = sources
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let matched = results
                .iter()
                .enumerate()
                .find(|(pos, r)| !claimed[*pos] && &r.source_label == label);
            let value = matched.and_then(|(pos, r)| {
                claimed[pos] = true;
                r.value_str().map(str::to_string)
            });
            SourceDetail {
                source_label: label.clone(),
                primary: idx == 0,
                value,
            }
        })
        .collect::<Vec<_>>();

    let representative_value = details
        .first()
        .and_then(|d| d.value.clone())
        .unwrap_or_else(|| NO_VALUE.to_string());

    let any_failed = results.iter().any(|r| !r.is_ok());
    let any_missing = details.iter().any(|d| d.value.is_none());
    let state = if any_failed || any_missing {
        SyncState::Lost
    } else {
        let values = results.iter().filter_map(|r| r.value_str()).collect::<Vec<_>>();
        if values_in_sync(variable.rule, &values, tolerance) {
            SyncState::InSync
        } else {
            SyncState::Drifting
        }
    };

    VariableStatus {
        variable_id: variable.id.clone(),
        display_prefix: variable.display_prefix.clone(),
        state,
        representative_value,
        sources: details,
    }
}

pub fn group_by_variable(results: Vec<FetchResult>) -> HashMap<String, Vec<FetchResult>> {
    let mut grouped: HashMap<String, Vec<FetchResult>> = HashMap::new();
    for result in results {
        grouped
            .entry(result.variable_id.clone())
            .or_default()
            .push(result);
    }
    grouped
}

pub fn classify_tick(
    registry: &VariableRegistry,
    settings: &Settings,
    mut grouped: HashMap<String, Vec<FetchResult>>,
) -> TickReport {
    let mut variables = Vec::with_capacity(settings.selected_variable_ids.len());
    for variable_id in &settings.selected_variable_ids {
        let Some(variable) = registry.by_id(variable_id) else {
            continue;
        };
        let results = grouped.remove(variable_id).unwrap_or_default();
        variables.push(classify(
            &variable,
            &results,
            &settings.source_labels,
            settings.tolerance_seconds,
        ));
    }
    TickReport {
        polled_at: Utc::now(),
        sources: settings.source_labels.clone(),
        system: SystemStatus::from_variables(&variables),
        variables,
    }
}

#[cfg(test)]
mod tests {
    use crate::classify::{
        classify, classify_tick, group_by_variable, SyncState, SystemStatus, VariableStatus,
        NO_VALUE,
    };
    use crate::fetch::FetchResult;
    use crate::settings::Settings;
    use crate::variables::{ComparisonRule, TrackedVariable, VariableRegistry};

    fn sources() -> Vec<String> {
        vec!["main".to_string(), "backup".to_string()]
    }

    fn e_time() -> TrackedVariable {
        TrackedVariable::new("e_time", "Time elapsed:", "", ComparisonRule::NumericTolerance)
    }

    fn status_with(state: SyncState) -> VariableStatus {
        VariableStatus {
            variable_id: "x".to_string(),
            display_prefix: "X:".to_string(),
            state,
            representative_value: NO_VALUE.to_string(),
            sources: Vec::new(),
        }
    }

    #[test]
    fn tolerance_decides_sync_for_e_time() {
        let results = vec![
            FetchResult::value("main", "e_time", "10.0"),
            FetchResult::value("backup", "e_time", "10.2"),
        ];
        assert_eq!(classify(&e_time(), &results, &sources(), 0.3).state, SyncState::InSync);
        assert_eq!(classify(&e_time(), &results, &sources(), 0.1).state, SyncState::Drifting);
    }

    #[test]
    fn any_failure_marks_variable_lost() {
        let results = vec![
            FetchResult::value("main", "e_time", "10.0"),
            FetchResult::failed("backup", "e_time", "HTTP 500"),
        ];
        let status = classify(&e_time(), &results, &sources(), 100.0);
        assert_eq!(status.state, SyncState::Lost);
        assert_eq!(status.representative_value, "10.0");
        assert_eq!(status.detail_line(), "main: 10.0  |  backup: lost");
    }

    #[test]
    fn lost_primary_hides_representative_value() {
        let results = vec![
            FetchResult::failed("main", "e_time", "connection refused"),
            FetchResult::value("backup", "e_time", "10.0"),
        ];
        let status = classify(&e_time(), &results, &sources(), 0.3);
        assert_eq!(status.state, SyncState::Lost);
        assert_eq!(status.representative_value, NO_VALUE);
        assert_eq!(status.title(), "Time elapsed: —");
        assert!(status.sources[0].primary);
        assert!(!status.sources[1].primary);
    }

    #[test]
    fn missing_source_result_counts_as_lost() {
        let results = vec![FetchResult::value("main", "e_time", "10.0")];
        let status = classify(&e_time(), &results, &sources(), 0.3);
        assert_eq!(status.state, SyncState::Lost);
    }

    #[test]
    fn duplicate_labels_keep_their_own_results() {
        let twins = vec!["a".to_string(), "a".to_string()];
        let results = vec![
            FetchResult::value("a", "e_time", "1.0"),
            FetchResult::failed("a", "e_time", "timed out"),
        ];
        let status = classify(&e_time(), &results, &twins, 0.3);
        assert_eq!(status.state, SyncState::Lost);
        assert_eq!(status.detail_line(), "a: 1.0  |  a: lost");
        assert_eq!(status.representative_value, "1.0");
    }

    #[test]
    fn single_source_is_trivially_in_sync() {
        let only = vec!["main".to_string()];
        let results = vec![FetchResult::value("main", "e_time", "anything")];
        assert_eq!(classify(&e_time(), &results, &only, 0.0).state, SyncState::InSync);
    }

    #[test]
    fn system_reduction_prefers_lost_then_drifting() {
        let drifting = [status_with(SyncState::InSync), status_with(SyncState::Drifting)];
        assert_eq!(SystemStatus::from_variables(&drifting).state, SyncState::Drifting);

        let lost = [status_with(SyncState::InSync), status_with(SyncState::Lost)];
        assert_eq!(SystemStatus::from_variables(&lost).state, SyncState::Lost);

        let fine = [status_with(SyncState::InSync), status_with(SyncState::InSync)];
        let system = SystemStatus::from_variables(&fine);
        assert_eq!(system.state, SyncState::InSync);
        assert_eq!(system.in_sync, 2);
        assert_eq!(system.headline(), "In sync");
    }

    #[test]
    fn tick_follows_selection_order_and_rules() {
        let registry = VariableRegistry::with_defaults();
        let mut settings = Settings::defaults(&registry);
        settings.source_labels = sources();
        settings.selected_variable_ids = vec!["r_left".to_string(), "r_name".to_string()];

        let results = vec![
            FetchResult::value("main", "r_name", "Cue 4"),
            FetchResult::value("main", "r_left", "5"),
            FetchResult::value("backup", "r_name", "Cue 4"),
            FetchResult::value("backup", "r_left", "5.0001"),
        ];
        let report = classify_tick(&registry, &settings, group_by_variable(results));
        let ids = report
            .variables
            .iter()
            .map(|v| v.variable_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["r_left", "r_name"]);
        assert_eq!(report.variables[0].state, SyncState::Drifting);
        assert_eq!(report.variables[1].state, SyncState::InSync);
        assert_eq!(report.system.state, SyncState::Drifting);
        assert_eq!(report.sources, sources());
    }
}
