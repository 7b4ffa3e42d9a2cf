use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::classify::{SyncState, TickReport};
use crate::settings::Settings;
use crate::variables::VariableRegistry;
use crate::version::VersionAdvisory;

fn state_cell(state: SyncState) -> Cell {
    let color = match state {
        SyncState::InSync => Color::Green,
        SyncState::Drifting => Color::Yellow,
        SyncState::Lost => Color::Red,
    };
    Cell::new(state.to_string()).fg(color)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_tick_table(report: &TickReport) -> String {
    let mut table = new_table();
    table.set_header(vec!["Variable", "Value", "Status", "Sources"]);
    for variable in &report.variables {
        table.add_row(Row::from(vec![
            Cell::new(&variable.display_prefix),
            Cell::new(&variable.representative_value),
            state_cell(variable.state),
            Cell::new(variable.detail_line()),
        ]));
    }

    let system = &report.system;
    format!(
        "{} ({} in sync, {} drifting, {} lost) at {}\n{table}",
        system.headline(),
        system.in_sync,
        system.drifting,
        system.lost,
        report.polled_at.format("%H:%M:%S%.3f"),
    )
}

pub fn render_variables_table(registry: &VariableRegistry, settings: &Settings) -> String {
    let mut table = new_table();
    table.set_header(vec!["#", "Id", "Setting", "Rule", "Selected"]);
    for (idx, id) in settings.variable_display_order.iter().enumerate() {
        let Some(variable) = registry.by_id(id) else {
            continue;
        };
        let selected = settings.selected_variable_ids.contains(id);
        table.add_row(Row::from(vec![
            Cell::new(idx + 1),
            Cell::new(&variable.id),
            Cell::new(&variable.setting_label),
            Cell::new(variable.rule.to_string()),
            if selected {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no")
            },
        ]));
    }
    table.to_string()
}

pub fn render_settings_table(settings: &Settings) -> String {
    let mut table = new_table();
    table.set_header(vec!["Setting", "Value"]);
    let interval = if settings.poll_interval_is_recommended() {
        format!("{} ms", settings.poll_interval_ms)
    } else {
        format!("{} ms (not recommended)", settings.poll_interval_ms)
    };
    table.add_row(vec!["Base URL".to_string(), settings.base_url.clone()]);
    table.add_row(vec!["Poll interval".to_string(), interval]);
    table.add_row(vec![
        "Tolerance".to_string(),
        format!("{} s", settings.tolerance_seconds),
    ]);
    table.add_row(vec![
        "Sources".to_string(),
        settings.source_labels.join(", "),
    ]);
    table.add_row(vec![
        "Selected".to_string(),
        settings.selected_variable_ids.join(", "),
    ]);
    table.add_row(vec![
        "Display order".to_string(),
        settings.variable_display_order.join(", "),
    ]);
    table.to_string()
}

pub fn render_version_table(advisory: &VersionAdvisory) -> String {
    let mut table = new_table();
    table.set_header(vec!["Running", "Published", "Status", "Download"]);
    match advisory {
        VersionAdvisory::NoUpdate { current } => {
            table.add_row(vec![current.as_str(), "-", "up to date", "-"]);
        }
        VersionAdvisory::UpdateAvailable {
            current,
            latest,
            url,
        } => {
            table.add_row(Row::from(vec![
                Cell::new(current),
                Cell::new(latest),
                Cell::new("update available").fg(Color::Yellow),
                Cell::new(url.as_deref().unwrap_or("-")),
            ]));
        }
        VersionAdvisory::Error { current } => {
            table.add_row(vec![current.as_str(), "-", "check failed", "-"]);
        }
    }
    table.to_string()
}
