use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::rules::AlertEventKind;
use crate::classify::{SyncState, TickReport, VariableStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub variable_id: String,
    pub title: String,
    pub body: String,
    pub at: DateTime<Utc>,
}

/// Compares two consecutive ticks variable by variable. Variables absent from
/// `previous` (or the whole first tick) are compared against an in-sync baseline.
pub fn evaluate_transitions(previous: Option<&TickReport>, current: &TickReport) -> Vec<AlertEvent> {
    let mut events = Vec::new();
    for variable in &current.variables {
        let before = previous
            .and_then(|report| report.variable(&variable.variable_id))
            .map(|status| status.state)
            .unwrap_or(SyncState::InSync);
        if before == variable.state {
            continue;
        }
        let kind = match variable.state {
            SyncState::Lost => AlertEventKind::SyncLost,
            SyncState::Drifting => AlertEventKind::DriftDetected,
            SyncState::InSync => AlertEventKind::SyncRestored,
        };
        events.push(AlertEvent {
            kind,
            variable_id: variable.variable_id.clone(),
            title: format!("{kind}: {}", variable.variable_id),
            body: describe(variable),
            at: current.polled_at,
        });
    }
    events
}

fn describe(variable: &VariableStatus) -> String {
    format!("{} ({})", variable.title(), variable.detail_line())
}
