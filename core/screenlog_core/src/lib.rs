//! Screen-time telemetry: dwell tracking per navigation transition, per-user
//! durable logs, a best-effort remote mirror, and aggregation/export helpers
//! for dashboards.

pub mod error;
pub mod export;
pub mod live;
pub mod model;
pub mod navigation;
pub mod server;
pub mod sink;
pub mod store;
pub mod tracker;

pub use error::{ExportError, SinkError, StoreError};
pub use export::{
    aggregate_screen_time, export_logs_as_csv, export_logs_as_json, filter_logs,
    format_totals_minutes, logs_from_json, LogFilter,
};
pub use live::LiveLog;
pub use model::{AggregateTotals, LogEntry};
pub use navigation::NavigationState;
pub use sink::{BestEffort, HttpLogSink, LogSink};
pub use store::{LogStore, SqliteLogStore};
pub use tracker::{ScreenTimeTracker, TrackOutcome, TrackerCursor};
