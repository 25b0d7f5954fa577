use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds spent on one screen before the user navigated away.
///
/// `timestamp` marks the moment the entry was recorded, i.e. the next
/// transition, not the moment `screen` became active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub screen: String,
    pub duration: u64,
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(screen: impl Into<String>, duration: u64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            screen: screen.into(),
            duration,
            timestamp: iso_timestamp(recorded_at),
        }
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// UTC calendar date of `timestamp` as `YYYY-MM-DD`.
    pub fn date(&self) -> Option<String> {
        self.recorded_at()
            .map(|t| t.format("%Y-%m-%d").to_string())
    }
}

/// Per-screen cumulative seconds, keyed by screen name.
pub type AggregateTotals = BTreeMap<String, u64>;

/// `2026-02-15T08:30:05.123Z`
pub fn iso_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Whole seconds between two instants, rounded half up. A clock that moved
/// backwards yields 0.
pub fn dwell_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let ms = (to - from).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    ((ms + 500) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dwell_rounds_half_up_and_never_goes_negative() {
        let t0 = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let at = |ms: i64| t0 + chrono::Duration::milliseconds(ms);

        assert_eq!(dwell_seconds(t0, at(0)), 0);
        assert_eq!(dwell_seconds(t0, at(499)), 0);
        assert_eq!(dwell_seconds(t0, at(500)), 1);
        assert_eq!(dwell_seconds(t0, at(5_000)), 5);
        assert_eq!(dwell_seconds(t0, at(7_499)), 7);
        assert_eq!(dwell_seconds(t0, at(-3_000)), 0);
    }

    #[test]
    fn timestamp_is_utc_millis() {
        let t = Utc.with_ymd_and_hms(2026, 2, 15, 8, 30, 5).unwrap();
        let e = LogEntry::new("Survey", 3, t);
        assert_eq!(e.timestamp, "2026-02-15T08:30:05.000Z");
        assert_eq!(e.recorded_at(), Some(t));
        assert_eq!(e.date().as_deref(), Some("2026-02-15"));
    }

    #[test]
    fn date_uses_utc_even_for_offset_timestamps() {
        let e = LogEntry {
            screen: "Dashboard".to_string(),
            duration: 1,
            timestamp: "2026-02-15T01:00:00+08:00".to_string(),
        };
        assert_eq!(e.date().as_deref(), Some("2026-02-14"));

        let bad = LogEntry {
            timestamp: "yesterday".to_string(),
            ..e
        };
        assert_eq!(bad.date(), None);
    }

    #[test]
    fn serialized_field_order_is_screen_duration_timestamp() {
        let t = Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap();
        let json = serde_json::to_string(&LogEntry::new("Login", 5, t)).unwrap();
        assert_eq!(
            json,
            r#"{"screen":"Login","duration":5,"timestamp":"2026-02-15T00:00:00.000Z"}"#
        );
    }
}
