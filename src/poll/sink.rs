use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::classify::TickReport;
use crate::output::csv::tick_to_csv;
use crate::output::json::render_json_line;
use crate::output::table::render_tick_table;
use crate::output::OutputFormat;

/// Receives every classified tick. Implementations must return quickly; the
/// poll loop calls them inline.
pub trait StatusSink: Send + Sync {
    fn on_tick(&self, report: &TickReport);
}

pub struct PrintSink {
    format: OutputFormat,
    header_written: AtomicBool,
}

impl PrintSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            header_written: AtomicBool::new(false),
        }
    }
}

impl StatusSink for PrintSink {
    fn on_tick(&self, report: &TickReport) {
        let rendered = match self.format {
            OutputFormat::Table => Ok(render_tick_table(report)),
            OutputFormat::Json => render_json_line(report),
            OutputFormat::Csv => {
                let with_header = !self.header_written.swap(true, Ordering::SeqCst);
                tick_to_csv(report, with_header).map(|rows| rows.trim_end().to_string())
            }
        };
        match rendered {
            Ok(text) => println!("{text}"),
            Err(error) => warn!("failed rendering tick: {error:#}"),
        }
    }
}

pub struct WatchSink {
    sender: watch::Sender<Option<TickReport>>,
}

impl WatchSink {
    pub fn channel() -> (Self, watch::Receiver<Option<TickReport>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl StatusSink for WatchSink {
    fn on_tick(&self, report: &TickReport) {
        self.sender.send_replace(Some(report.clone()));
    }
}

#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl StatusSink for FanoutSink {
    fn on_tick(&self, report: &TickReport) {
        for sink in &self.sinks {
            sink.on_tick(report);
        }
    }
}
