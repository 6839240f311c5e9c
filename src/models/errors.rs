use crate::models::{DedupeReport, RecordId};
use std::fmt;

#[derive(Debug)]
pub struct AppError(pub String);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("HTTP error: {status} ({body})")]
    HttpStatus { status: u16, body: String },
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed store response: {0}")]
    Malformed(String),
    #[error("unknown storage type: {0}")]
    UnknownType(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    #[error("backing store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error(
        "bulk delete removed {deleted} of {requested} records ({} known missing)",
        .missing.len()
    )]
    PartialDeleteFailure {
        requested: usize,
        deleted: usize,
        missing: Vec<RecordId>,
        report: Box<DedupeReport>,
    },
    #[error("deadline passed during {stage}, nothing deleted")]
    DeadlineExceeded { stage: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send notification: {0}")]
    SendFailed(#[from] reqwest::Error),
    #[error("webhook rejected notification: status {0}")]
    Rejected(u16),
}
