//! Error types for the orchestrator and the remote collection service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Non-2xx answer or network failure talking to the collection service
    #[error("Transport failure ({}): {message}", .status.map_or_else(|| "network".to_string(), |s| s.to_string()))]
    Transport { status: Option<u16>, message: String },

    /// Credential rejected; surfaced to the caller, never retried here
    #[error("Authentication expired")]
    AuthExpired,

    #[error("Unexpected response body: {0}")]
    InvalidResponse(String),

    #[error("Product {0} is not in the local cache")]
    NotCached(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Orchestrator channel closed")]
    ChannelClosed,
}

impl SyncError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport { status, message: message.into() }
    }

    /// Remote-call failures release the identifier from the dedup set so a
    /// later extraction may send it again.
    pub const fn releases_dedup(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::AuthExpired | Self::InvalidResponse(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
