pub mod engine;
pub mod rules;
pub mod sink;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::alert::engine::evaluate_transitions;
use crate::alert::rules::AlertRules;
use crate::alert::sink::AlertSink;
use crate::classify::TickReport;
use crate::poll::sink::StatusSink;

pub struct TransitionAlerter {
    rules: AlertRules,
    sinks: Vec<Arc<dyn AlertSink>>,
    previous: Mutex<Option<TickReport>>,
}

impl TransitionAlerter {
    pub fn new(rules: AlertRules, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self {
            rules,
            sinks,
            previous: Mutex::new(None),
        }
    }
}

impl StatusSink for TransitionAlerter {
    fn on_tick(&self, report: &TickReport) {
        let events = {
            let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
            let events = evaluate_transitions(previous.as_ref(), report);
            *previous = Some(report.clone());
            events
        };
        for event in events.into_iter().filter(|e| self.rules.allows(e.kind)) {
            for sink in &self.sinks {
                let sink = Arc::clone(sink);
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(error) = sink.send(&event).await {
                        warn!("alert delivery failed: {error:#}");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::alert::engine::AlertEvent;
    use crate::alert::rules::{AlertEventKind, AlertRules};
    use crate::alert::sink::AlertSink;
    use crate::alert::TransitionAlerter;
    use crate::classify::{classify_tick, group_by_variable, TickReport};
    use crate::fetch::FetchResult;
    use crate::poll::sink::StatusSink;
    use crate::settings::Settings;
    use crate::variables::VariableRegistry;

    #[derive(Default)]
    struct Collect {
        kinds: Mutex<Vec<AlertEventKind>>,
    }

    #[async_trait]
    impl AlertSink for Collect {
        async fn send(&self, event: &AlertEvent) -> Result<()> {
            self.kinds.lock().expect("lock").push(event.kind);
            Ok(())
        }
    }

    fn tick(backup: &str) -> TickReport {
        let registry = VariableRegistry::with_defaults();
        let mut settings = Settings::defaults(&registry);
        settings.selected_variable_ids = vec!["r_name".to_string()];
        let results = vec![
            FetchResult::value("qlabfb", "r_name", "Cue 1"),
            FetchResult::value("qlabfb-backup", "r_name", backup),
        ];
        classify_tick(&registry, &settings, group_by_variable(results))
    }

    #[tokio::test]
    async fn disabled_rules_are_filtered() {
        let collect = Arc::new(Collect::default());
        let rules = AlertRules {
            sync_restored: false,
            ..AlertRules::default()
        };
        let alerter = TransitionAlerter::new(rules, vec![collect.clone() as Arc<dyn AlertSink>]);

        alerter.on_tick(&tick("Cue 1"));
        alerter.on_tick(&tick("Cue 2"));
        alerter.on_tick(&tick("Cue 1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let kinds = collect.kinds.lock().expect("lock").clone();
        assert_eq!(kinds, vec![AlertEventKind::DriftDetected]);
    }
}
