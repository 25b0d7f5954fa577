//! Best-effort mirror of log entries to the remote per-user collection.

use crate::error::SinkError;
use crate::model::LogEntry;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Outcome of an operation whose failure is expected and non-fatal.
///
/// Callers may ignore it; it exists so the contract is visible where the
/// call is made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BestEffort {
    Delivered,
    Dropped(String),
}

impl BestEffort {
    pub fn is_delivered(&self) -> bool {
        matches!(self, BestEffort::Delivered)
    }
}

#[allow(async_fn_in_trait)]
pub trait LogSink {
    /// One attempt, no retry, no queueing.
    async fn send(&self, user_id: &str, entry: &LogEntry) -> BestEffort;
}

/// `None` means remote mirroring is switched off.
impl<K: LogSink> LogSink for Option<K> {
    async fn send(&self, user_id: &str, entry: &LogEntry) -> BestEffort {
        match self {
            Some(sink) => sink.send(user_id, entry).await,
            None => BestEffort::Dropped("sink disabled".to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SinkBody<'a> {
    screen_name: &'a str,
    timestamp: &'a str,
    duration: u64,
}

#[derive(Clone, Debug)]
pub struct HttpLogSink {
    client: Client,
    base_url: String,
}

impl HttpLogSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `timeout` of `None` leaves requests unbounded.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, SinkError> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The user id is pushed as a single percent-encoded path segment, so
    /// ids containing `/`, `#` or `?` still address their own collection.
    pub fn collection_url(&self, user_id: &str) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SinkError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "screen-logs", user_id]);
        Ok(url)
    }

    async fn post(&self, user_id: &str, entry: &LogEntry) -> Result<(), SinkError> {
        let body = SinkBody {
            screen_name: &entry.screen,
            timestamp: &entry.timestamp,
            duration: entry.duration,
        };
        let resp = self
            .client
            .post(self.collection_url(user_id)?)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SinkError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Reads the user's whole collection back from the backing store.
    pub async fn fetch_logs(&self, user_id: &str) -> Result<Vec<LogEntry>, SinkError> {
        let resp = self.client.get(self.collection_url(user_id)?).send().await?;
        if !resp.status().is_success() {
            return Err(SinkError::Status(resp.status().as_u16()));
        }
        let data: Value = resp.json().await?;
        if !data.is_array() {
            return Err(SinkError::InvalidFormat);
        }
        serde_json::from_value(data).map_err(|_| SinkError::InvalidFormat)
    }
}

impl LogSink for HttpLogSink {
    async fn send(&self, user_id: &str, entry: &LogEntry) -> BestEffort {
        match self.post(user_id, entry).await {
            Ok(()) => BestEffort::Delivered,
            Err(err) => {
                warn!("backend logging failed for user {user_id}: {err}");
                BestEffort::Dropped(err.to_string())
            }
        }
    }
}
