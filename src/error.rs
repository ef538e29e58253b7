use thiserror::Error;

use crate::session::ProtectionState;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no images found in report {url}")]
    ExtractionEmpty { url: String },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("decode failed for {url}: {reason}")]
    DecodeFailed { url: String, reason: String },

    /// Informational only; the report is still extracted.
    #[error("page protection detected: {0}")]
    ProtectionDetected(ProtectionState),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
