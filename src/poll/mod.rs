pub mod sink;

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::classify::{classify_tick, group_by_variable, TickReport};
use crate::fetch::{FetchResult, SourceFetcher};
use crate::poll::sink::StatusSink;
use crate::settings::Settings;
use crate::variables::VariableRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
}

pub struct PollOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    registry: Arc<VariableRegistry>,
    sink: Arc<dyn StatusSink>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PollOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        registry: Arc<VariableRegistry>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            sink,
            timer: Mutex::new(None),
        }
    }

    /// Cancels any running timer, polls once right away, then keeps polling at
    /// the settings' interval. Must be called from within a Tokio runtime.
    pub fn start(&self, settings: Arc<Settings>) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
            debug!("previous poll timer cancelled");
        }
        info!(
            sources = settings.source_labels.len(),
            variables = settings.selected_variable_ids.len(),
            interval_ms = settings.poll_interval_ms,
            "polling {}",
            settings.base_url
        );
        *timer = Some(tokio::spawn(poll_loop(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            settings,
        )));
    }

    pub fn state(&self) -> PollState {
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        match timer.as_ref() {
            Some(handle) if !handle.is_finished() => PollState::Polling,
            _ => PollState::Idle,
        }
    }
}

impl Drop for PollOrchestrator {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}

async fn poll_loop(
    fetcher: Arc<dyn SourceFetcher>,
    registry: Arc<VariableRegistry>,
    sink: Arc<dyn StatusSink>,
    settings: Arc<Settings>,
) {
    let mut ticker = tokio::time::interval(settings.poll_interval());
    // A cycle still in flight when the timer fires swallows that tick.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let report = run_cycle(fetcher.as_ref(), &registry, &settings).await;
        sink.on_tick(&report);
    }
}

pub async fn fetch_all(fetcher: &dyn SourceFetcher, settings: &Settings) -> Vec<FetchResult> {
    let base_url = settings.base_url.as_str();
    let variable_ids = &settings.selected_variable_ids;
    let requests = settings.source_labels.iter().flat_map(|label| {
        variable_ids
            .iter()
            .map(move |variable_id| fetcher.fetch(base_url, label, variable_id))
    });
    join_all(requests).await
}

pub async fn run_cycle(
    fetcher: &dyn SourceFetcher,
    registry: &VariableRegistry,
    settings: &Settings,
) -> TickReport {
    let results = fetch_all(fetcher, settings).await;
    for result in &results {
        if let Some(reason) = result.failure_reason() {
            debug!(
                source = %result.source_label,
                variable = %result.variable_id,
                "lookup failed: {reason}"
            );
        }
    }
    let report = classify_tick(registry, settings, group_by_variable(results));
    debug!("cycle classified as {}", report.system.state.as_slug());
    report
}
