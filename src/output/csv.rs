use anyhow::Result;

use crate::classify::TickReport;
use crate::settings::Settings;
use crate::variables::VariableRegistry;

const TICK_HEADER: [&str; 6] = [
    "polled_at",
    "variable",
    "state",
    "value",
    "system_state",
    "sources",
];

pub fn tick_to_csv(report: &TickReport, with_header: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    if with_header {
        writer.write_record(TICK_HEADER)?;
    }
    let polled_at = report.polled_at.to_rfc3339();
    for variable in &report.variables {
        writer.write_record([
            polled_at.clone(),
            variable.variable_id.clone(),
            variable.state.as_slug().to_string(),
            variable.representative_value.clone(),
            report.system.state.as_slug().to_string(),
            variable.detail_line(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn variables_to_csv(registry: &VariableRegistry, settings: &Settings) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["position", "id", "label", "rule", "selected"])?;
    for (idx, id) in settings.variable_display_order.iter().enumerate() {
        let Some(variable) = registry.by_id(id) else {
            continue;
        };
        writer.write_record([
            (idx + 1).to_string(),
            variable.id.clone(),
            variable.setting_label.clone(),
            variable.rule.to_string(),
            settings.selected_variable_ids.contains(id).to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
