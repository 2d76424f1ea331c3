//! Error types for the Athlehub client

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while constructing a [`Client`](crate::Client)
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP client construction failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures of the local key-value storage backing the token store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// The error arm of every data and auth operation
///
/// Backend rejections carry the response body verbatim; interpreting
/// backend-specific codes is left to the caller.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Response with status {status} is not valid JSON: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request body could not be encoded: {0}")]
    Encode(serde_json::Error),

    #[error("Backend rejected request with status {status}: {payload}")]
    Backend { status: u16, payload: Value },

    #[error("Expected a row array, got: {0}")]
    UnexpectedShape(Value),

    #[error("Request deadline of {0:?} elapsed")]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Backend error code (e.g. `PGRST116` for "no rows"), if the backend sent one
    pub fn code(&self) -> Option<&str> {
        self.payload()?.get("code")?.as_str()
    }

    /// Human-readable message from the backend payload, if any
    pub fn message(&self) -> Option<&str> {
        let payload = self.payload()?;
        ["message", "msg", "error_description", "error"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
    }

    /// HTTP status attached to the error, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Backend { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn payload(&self) -> Option<&Value> {
        match self {
            ApiError::Backend { payload, .. } | ApiError::UnexpectedShape(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Uniform outcome of every data operation: rows on success, [`ApiError`] otherwise
pub type ApiResult<T> = std::result::Result<T, ApiError>;
