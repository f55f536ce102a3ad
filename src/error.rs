use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The backend binary or script could not be found or spawned.
    /// This is a packaging problem; nothing in the crate retries it.
    #[error("Backend launch failed for {program:?}: {reason}")]
    LaunchFailure { program: PathBuf, reason: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("Video is age restricted")]
    AgeRestricted,

    #[error("Unexpected HTTP status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    /// Well-formed JSON that still cannot be used, e.g. an empty stream URL.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PlaybackError {
    /// True for failures of the request itself (connection, timeout, bad status).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PlaybackError::RequestFailed(_) | PlaybackError::UnexpectedStatus { .. }
        )
    }

    /// True when a response arrived but its body could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            PlaybackError::ParseFailed(_) | PlaybackError::InvalidResponse(_)
        )
    }

    /// Outcomes that must never be retried by any caller.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackError::AgeRestricted | PlaybackError::LaunchFailure { .. }
        )
    }
}
