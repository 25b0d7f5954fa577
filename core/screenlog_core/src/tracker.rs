//! Turns navigation transitions into dwell-time entries.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::live::{format_live_line, LiveLog};
use crate::model::{dwell_seconds, LogEntry};
use crate::navigation::NavigationState;
use crate::sink::{BestEffort, LogSink};
use crate::store::LogStore;

/// Last-seen screen and when it became active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerCursor {
    last_screen: Option<String>,
    last_transition: Option<DateTime<Utc>>,
}

impl TrackerCursor {
    pub fn last_screen(&self) -> Option<&str> {
        self.last_screen.as_deref()
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.last_transition
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    /// No user identity; nothing changed.
    Skipped,
    /// Cursor was empty, so there was no previous screen to measure.
    Started,
    Recorded {
        entry: LogEntry,
        stored: BestEffort,
        mirrored: BestEffort,
    },
}

impl TrackOutcome {
    pub fn entry(&self) -> Option<&LogEntry> {
        match self {
            TrackOutcome::Recorded { entry, .. } => Some(entry),
            _ => None,
        }
    }
}

/// One tracking session. The navigation wiring owns it and feeds it every
/// transition in emission order.
pub struct ScreenTimeTracker<S, K> {
    store: S,
    sink: K,
    live: LiveLog,
    cursor: TrackerCursor,
}

impl<S: LogStore, K: LogSink> ScreenTimeTracker<S, K> {
    pub fn new(store: S, sink: K) -> Self {
        Self::with_live_log(store, sink, LiveLog::new())
    }

    pub fn with_live_log(store: S, sink: K, live: LiveLog) -> Self {
        Self {
            store,
            sink,
            live,
            cursor: TrackerCursor::default(),
        }
    }

    pub fn cursor(&self) -> &TrackerCursor {
        &self.cursor
    }

    pub fn live_log(&self) -> &LiveLog {
        &self.live
    }

    /// Forget the last screen, e.g. after logout.
    pub fn reset(&mut self) {
        self.cursor = TrackerCursor::default();
    }

    pub async fn observe(
        &mut self,
        state: &NavigationState,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        match state.current_route() {
            Some(screen) => self.log_screen_time(screen, user_id, now).await,
            None => {
                debug!("navigation state has no focused route; ignored");
                TrackOutcome::Skipped
            }
        }
    }

    /// Records the dwell time of the screen being left, then moves the
    /// cursor to `screen`. Storage and network failures end up in the
    /// returned outcome, never as an error.
    pub async fn log_screen_time(
        &mut self,
        screen: &str,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        let Some(user_id) = user_id else {
            return TrackOutcome::Skipped;
        };

        let line = format_live_line(user_id, screen, now);
        info!("{line}");
        self.live.publish(line);

        let outcome = match (&self.cursor.last_screen, self.cursor.last_transition) {
            (Some(last_screen), Some(last_time)) => {
                let entry = LogEntry::new(last_screen.clone(), dwell_seconds(last_time, now), now);

                let stored = match self.store.append(user_id, &entry) {
                    Ok(()) => BestEffort::Delivered,
                    Err(err) => {
                        warn!("local log store failed for user {user_id}: {err}");
                        BestEffort::Dropped(err.to_string())
                    }
                };
                let mirrored = self.sink.send(user_id, &entry).await;

                TrackOutcome::Recorded {
                    entry,
                    stored,
                    mirrored,
                }
            }
            _ => TrackOutcome::Started,
        };

        self.cursor.last_screen = Some(screen.to_string());
        self.cursor.last_transition = Some(now);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::export::{aggregate_screen_time, export_logs_as_csv};
    use crate::store::SqliteLogStore;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, LogEntry)>>,
        fail: bool,
    }

    impl LogSink for Arc<RecordingSink> {
        async fn send(&self, user_id: &str, entry: &LogEntry) -> BestEffort {
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), entry.clone()));
            if self.fail {
                BestEffort::Dropped("connection refused".to_string())
            } else {
                BestEffort::Delivered
            }
        }
    }

    struct FailingStore;

    impl LogStore for FailingStore {
        fn append(&self, _user_id: &str, _entry: &LogEntry) -> Result<(), StoreError> {
            Err(StoreError::LockPoisoned)
        }

        fn read_all(&self, _user_id: &str) -> Vec<LogEntry> {
            Vec::new()
        }
    }

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_771_113_600_000 + ms).unwrap()
    }

    fn tracker() -> (
        ScreenTimeTracker<Arc<SqliteLogStore>, Arc<RecordingSink>>,
        Arc<SqliteLogStore>,
        Arc<RecordingSink>,
    ) {
        let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        (
            ScreenTimeTracker::new(store.clone(), sink.clone()),
            store,
            sink,
        )
    }

    #[tokio::test]
    async fn first_transition_records_nothing() {
        let (mut tr, store, sink) = tracker();
        let out = tr.log_screen_time("Login", Some("42"), t(0)).await;

        assert_eq!(out, TrackOutcome::Started);
        assert!(store.read_all("42").is_empty());
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(tr.cursor().last_screen(), Some("Login"));
        assert_eq!(tr.cursor().last_transition(), Some(t(0)));
    }

    #[tokio::test]
    async fn leaving_a_screen_records_its_dwell_time() {
        let (mut tr, store, sink) = tracker();
        tr.log_screen_time("A", Some("42"), t(0)).await;
        let out = tr.log_screen_time("B", Some("42"), t(3_600)).await;

        let expected = LogEntry {
            screen: "A".to_string(),
            duration: 4,
            timestamp: "2026-02-15T00:00:03.600Z".to_string(),
        };
        assert_eq!(out.entry(), Some(&expected));
        assert_eq!(store.read_all("42"), vec![expected.clone()]);
        assert_eq!(
            sink.sent.lock().unwrap().clone(),
            vec![("42".to_string(), expected)]
        );
        assert_eq!(tr.cursor().last_screen(), Some("B"));
    }

    #[tokio::test]
    async fn missing_user_changes_nothing() {
        let (mut tr, store, _sink) = tracker();
        tr.log_screen_time("Login", Some("42"), t(0)).await;

        let out = tr.log_screen_time("Register", None, t(2_000)).await;
        assert_eq!(out, TrackOutcome::Skipped);
        assert_eq!(tr.cursor().last_screen(), Some("Login"));
        assert_eq!(tr.cursor().last_transition(), Some(t(0)));
        assert!(store.read_all("42").is_empty());
        assert!(tr.live_log().get_latest().unwrap().contains("Login"));
    }

    #[tokio::test]
    async fn repeated_screen_is_not_deduplicated() {
        let (mut tr, store, _sink) = tracker();
        tr.log_screen_time("Survey", Some("1"), t(0)).await;
        tr.log_screen_time("Survey", Some("1"), t(2_000)).await;
        tr.log_screen_time("Survey", Some("1"), t(3_000)).await;

        let durations: Vec<_> = store.read_all("1").iter().map(|e| e.duration).collect();
        assert_eq!(durations, vec![2, 1]);
    }

    #[tokio::test]
    async fn login_survey_dashboard_session() {
        let (mut tr, store, _sink) = tracker();
        tr.log_screen_time("Login", Some("42"), t(0)).await;
        tr.log_screen_time("Survey", Some("42"), t(5_000)).await;
        tr.log_screen_time("SurveyDashboard", Some("42"), t(12_000)).await;

        let logs = store.read_all("42");
        assert_eq!(logs.len(), 2);
        assert_eq!((logs[0].screen.as_str(), logs[0].duration), ("Login", 5));
        assert_eq!((logs[1].screen.as_str(), logs[1].duration), ("Survey", 7));

        let totals = aggregate_screen_time(&logs);
        assert_eq!(totals.get("Login"), Some(&5));
        assert_eq!(totals.get("Survey"), Some(&7));
        assert_eq!(totals.len(), 2);

        assert_eq!(
            export_logs_as_csv(&logs),
            "Screen,Duration (s),Timestamp\n\
             Login,5,2026-02-15T00:00:05.000Z\n\
             Survey,7,2026-02-15T00:00:12.000Z"
        );
        assert_eq!(
            tr.live_log().get_latest().as_deref(),
            Some("User 42 viewed screen: SurveyDashboard at 2026-02-15T00:00:12.000Z")
        );
    }

    #[tokio::test]
    async fn store_failure_still_mirrors_and_advances() {
        let sink = Arc::new(RecordingSink::default());
        let mut tr = ScreenTimeTracker::new(FailingStore, sink.clone());
        tr.log_screen_time("Login", Some("42"), t(0)).await;
        let out = tr.log_screen_time("Survey", Some("42"), t(5_000)).await;

        match out {
            TrackOutcome::Recorded {
                stored, mirrored, ..
            } => {
                assert!(!stored.is_delivered());
                assert!(mirrored.is_delivered());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert_eq!(tr.cursor().last_screen(), Some("Survey"));
    }

    #[tokio::test]
    async fn sink_failure_keeps_local_entry() {
        let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut tr = ScreenTimeTracker::new(store.clone(), sink);
        tr.log_screen_time("Login", Some("42"), t(0)).await;
        let out = tr.log_screen_time("Survey", Some("42"), t(1_000)).await;

        assert!(matches!(
            out,
            TrackOutcome::Recorded { mirrored: BestEffort::Dropped(_), .. }
        ));
        assert_eq!(store.read_all("42").len(), 1);
        assert_eq!(tr.cursor().last_screen(), Some("Survey"));
    }

    #[tokio::test]
    async fn observe_resolves_focused_route() {
        let (mut tr, store, _sink) = tracker();
        let login: NavigationState =
            serde_json::from_str(r#"{"index":0,"routes":[{"name":"Login"}]}"#).unwrap();
        let survey: NavigationState = serde_json::from_str(
            r#"{"index":1,"routes":[{"name":"Login"},{"name":"Survey"}]}"#,
        )
        .unwrap();
        let broken: NavigationState =
            serde_json::from_str(r#"{"index":5,"routes":[{"name":"Login"}]}"#).unwrap();

        tr.observe(&login, Some("9"), t(0)).await;
        assert_eq!(tr.observe(&broken, Some("9"), t(1_000)).await, TrackOutcome::Skipped);
        tr.observe(&survey, Some("9"), t(2_000)).await;

        assert_eq!(store.read_all("9")[0].screen, "Login");
        assert_eq!(store.read_all("9")[0].duration, 2);
    }

    #[tokio::test]
    async fn blank_route_name_leaves_cursor_alone() {
        let (mut tr, store, sink) = tracker();
        let blank: NavigationState =
            serde_json::from_str(r#"{"index":0,"routes":[{"name":""}]}"#).unwrap();

        tr.log_screen_time("Survey", Some("9"), t(0)).await;
        assert_eq!(tr.observe(&blank, Some("9"), t(1_000)).await, TrackOutcome::Skipped);
        assert_eq!(tr.cursor().last_screen(), Some("Survey"));
        assert_eq!(tr.cursor().last_transition(), Some(t(0)));
        assert!(store.read_all("9").is_empty());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_session() {
        let (mut tr, store, _sink) = tracker();
        tr.log_screen_time("Dashboard", Some("1"), t(0)).await;
        tr.reset();
        assert_eq!(tr.cursor(), &TrackerCursor::default());

        let out = tr.log_screen_time("Login", Some("2"), t(9_000)).await;
        assert_eq!(out, TrackOutcome::Started);
        assert!(store.read_all("1").is_empty());
        assert!(store.read_all("2").is_empty());
    }
}
