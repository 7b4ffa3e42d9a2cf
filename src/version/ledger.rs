use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub app_name: String,
    pub version: String,
    pub update_url: Option<String>,
}

/// Parses the release ledger. Quoted cells may contain commas, doubled quotes
/// and line breaks; rows may end in LF or CRLF and have any number of cells.
pub fn parse_ledger(body: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed release ledger row")?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

pub fn find_release(body: &str, app_name: &str) -> Result<Option<LedgerEntry>> {
    let wanted = app_name.trim();
    let entry = parse_ledger(body)?
        .into_iter()
        .find(|row| row.first().map(|name| name.trim()) == Some(wanted))
        .map(|row| LedgerEntry {
            app_name: wanted.to_string(),
            version: row.get(1).map(|v| v.trim().to_string()).unwrap_or_default(),
            update_url: row.get(2).and_then(|url| sanitize_update_url(url)),
        });
    Ok(entry)
}

pub fn sanitize_update_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed.to_string()),
        _ => None,
    }
}
