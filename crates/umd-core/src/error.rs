use thiserror::Error;

use crate::models::ExtractorKind;

/// Application-wide error types for umd.
#[derive(Error, Debug)]
pub enum AppError {
    /// The host is supported but the URL shape is not.
    #[error("{extractor} does not support URL: {url}")]
    UnsupportedSource {
        url: String,
        extractor: ExtractorKind,
    },

    /// No registered extractor accepts the URL's host.
    #[error("No extractor found for URL: {url}")]
    NoExtractorFound { url: String },

    /// Non-success HTTP response (after retries, for 429).
    #[error("HTTP {status}: {body}")]
    Fetch { status: u16, body: String },

    /// A page or API payload could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The URL could not be parsed or is not absolute.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// Local file I/O failed while downloading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if the host answered with HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Fetch { status: 429, .. })
    }

    /// Returns true for errors that end a query instead of being contained
    /// at page or post level.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedSource { .. } | AppError::NoExtractorFound { .. }
        )
    }
}
