use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

use crate::model::iso_timestamp;

/// How often diagnostic views re-read the latest line.
pub const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const NO_ACTIVITY_TEXT: &str = "No screen activity yet.";

/// Most recent human-readable tracker line.
///
/// Readers may poll [`LiveLog::get_latest`] or hold a receiver from
/// [`LiveLog::subscribe`] to be woken on each publish. Clones share the
/// same slot.
#[derive(Clone, Debug)]
pub struct LiveLog {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for LiveLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveLog {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, line: String) {
        self.tx.send_replace(Some(line));
    }

    pub fn get_latest(&self) -> Option<String> {
        (*self.tx.borrow()).clone()
    }

    pub fn display_text(&self) -> String {
        self.get_latest()
            .unwrap_or_else(|| NO_ACTIVITY_TEXT.to_string())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

pub fn format_live_line(user_id: &str, screen: &str, at: DateTime<Utc>) -> String {
    format!(
        "User {user_id} viewed screen: {screen} at {}",
        iso_timestamp(at)
    )
}
