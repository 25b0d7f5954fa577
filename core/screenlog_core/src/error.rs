use thiserror::Error;

/// Local persistence failures. The tracker logs these and keeps going.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode log collection: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("log store lock poisoned")]
    LockPoisoned,

    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote collection endpoint failures.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid core url: {0}")]
    InvalidUrl(String),

    #[error("backend returned invalid log format")]
    InvalidFormat,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid log json: {0}")]
    Json(#[from] serde_json::Error),
}
