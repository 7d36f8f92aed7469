//! Error types for page inspection and extraction
//!
//! Every failure on the page side is folded into one of these variants before
//! it crosses the page/orchestrator channel.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Required field '{field}' not found in HTML")]
    RequiredFieldMissing { field: String, tried_strategies: Vec<String> },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid regex pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Page snapshot failed for {url}: {message}")]
    SnapshotFailed { url: String, message: String },

    #[error("HTTP request failed: {status} - {url}")]
    HttpRequestFailed { status: u16, url: String },

    #[error("Page did not answer within {timeout_ms}ms: {url}")]
    PageTimeout { url: String, timeout_ms: u64 },

    #[error("Page channel closed: {url}")]
    PageClosed { url: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &str, tried_strategies: &[&str]) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            tried_strategies: tried_strategies.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn snapshot_failed(url: &str, message: impl Into<String>) -> Self {
        Self::SnapshotFailed { url: url.to_string(), message: message.into() }
    }

    /// Whether re-reading the page later might succeed
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::RequiredFieldMissing { .. } | Self::SnapshotFailed { .. } => true,
            Self::HttpRequestFailed { status, .. } => *status >= 500,
            Self::InvalidSelector { .. } | Self::InvalidPattern { .. } | Self::PageTimeout { .. } | Self::PageClosed { .. } => false,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
