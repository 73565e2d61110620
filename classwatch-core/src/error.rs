use classwatch_model::ModelError;
use thiserror::Error;

pub type TrackingResult<T> = Result<T, TrackingError>;

/// Failures talking to the watch-tracking backend.
///
/// The tracker swallows all of these after logging; they are only returned
/// directly by [`crate::api::WatchApi`] implementations and by lookups such as
/// [`crate::WatchTracker::view_count`].
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized - token missing or expired")]
    Unauthorized,

    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("empty response from server")]
    EmptyResponse,

    #[error("server reported an error: {0}")]
    Server(String),

    #[error("invalid video: {0}")]
    InvalidVideo(#[from] ModelError),

    #[error("tracking is not configured for this player")]
    NotTracked,

    #[error("transport failure: {0}")]
    Transport(String),
}
