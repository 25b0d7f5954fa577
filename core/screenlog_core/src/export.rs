//! Stateless reductions over a user's log collection.

use serde::Deserialize;

use crate::error::ExportError;
use crate::model::{AggregateTotals, LogEntry};

const CSV_HEADER: &str = "Screen,Duration (s),Timestamp\n";

/// Optional exact-match criteria, ANDed. Empty strings count as omitted.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub screen: Option<String>,
    /// `YYYY-MM-DD`, compared against the entry's UTC date.
    #[serde(default)]
    pub date: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let screen_ok = match self.screen.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => entry.screen == s,
            None => true,
        };
        let date_ok = match self.date.as_deref().filter(|d| !d.is_empty()) {
            Some(d) => entry.date().as_deref() == Some(d),
            None => true,
        };
        screen_ok && date_ok
    }
}

pub fn filter_logs(logs: &[LogEntry], filter: &LogFilter) -> Vec<LogEntry> {
    logs.iter().filter(|e| filter.matches(e)).cloned().collect()
}

pub fn aggregate_screen_time(logs: &[LogEntry]) -> AggregateTotals {
    let mut totals = AggregateTotals::new();
    for log in logs {
        let total = totals.entry(log.screen.clone()).or_insert(0);
        *total = total.saturating_add(log.duration);
    }
    totals
}

/// Screen names are route identifiers, so fields are written unquoted.
pub fn export_logs_as_csv(logs: &[LogEntry]) -> String {
    let rows: Vec<String> = logs
        .iter()
        .map(|log| format!("{},{},{}", log.screen, log.duration, log.timestamp))
        .collect();
    format!("{CSV_HEADER}{}", rows.join("\n"))
}

pub fn export_logs_as_json(logs: &[LogEntry]) -> String {
    serde_json::to_string_pretty(logs).unwrap_or_else(|_| "[]".to_string())
}

pub fn logs_from_json(raw: &str) -> Result<Vec<LogEntry>, ExportError> {
    Ok(serde_json::from_str(raw)?)
}

/// `Survey: 1.25 mins` per screen, in screen order.
pub fn format_totals_minutes(totals: &AggregateTotals) -> Vec<String> {
    totals
        .iter()
        .map(|(screen, secs)| format!("{screen}: {:.2} mins", *secs as f64 / 60.0))
        .collect()
}
