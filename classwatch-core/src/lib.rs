//! # Classwatch Core
//!
//! Watch-session tracking for video playback embedded in classroom posts.
//!
//! A [`WatchTracker`] is attached to one player instance. It opens a session
//! with the watch-tracking backend when the player mounts, keeps the backend's
//! notion of progress close to real time while the video plays, closes the
//! session on completion or teardown, and hands a final report to the
//! [`UnloadReporter`] when the host is going away.
//!
//! Tracking is strictly best-effort: backend failures are logged and never
//! surface to playback.
//!
//! ## Modules
//!
//! - [`api`]: backend traits, the HTTP client and an in-memory backend
//! - [`tracking`]: the tracker state machine, progress ticker, completion and
//!   unload handling
//! - [`error`]: error types shared by the above

pub mod api;
pub mod error;
pub mod tracking;

pub use api::{
    BeaconTransport, DeliveryMode, WatchApi, client::WatchApiClient,
    memory::InMemoryWatchApi,
};
pub use error::{TrackingError, TrackingResult};
pub use tracking::{
    PlaybackPhase, PlayerControl, ProgressSample, SessionStatus,
    TrackerEvent, TrackerSettings, TrackingContext, WatchTracker,
    WatchTrackerBuilder, unload::{BeaconPayload, UnloadReporter},
};
