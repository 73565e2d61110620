//! Request/response shapes and routes of the watch-tracking backend.

pub mod response;
pub mod routes;
pub mod watch;

pub use response::ApiResponse;

/// Frequently used contract types for tracking clients.
pub mod prelude {
    pub use super::response::ApiResponse;
    pub use super::routes::video_watch;
    pub use super::watch::{
        EndWatchingRequest, ResetProgressRequest, StartWatchingRequest,
        StartWatchingResponse, UpdateProgressRequest, UpdateProgressResponse,
        ViewCountResponse,
    };
}
