//! Watch-session tracking for a single player instance.
//!
//! ```text
//!            mount / replay                    on_ended / unmount
//!  NoSession ──────────────► Active ─────────► Ending ──────► NoSession
//!                              ▲                  │ failure
//!                              └──────────────────┘
//! ```
//!
//! Player callbacks update a shared snapshot synchronously. Network calls run
//! on spawned tasks or in the awaiting caller and read the snapshot when they
//! fire, so a report always carries the latest position.

pub mod completion;
pub mod events;
pub mod reporter;
pub mod session;
pub(crate) mod state;
pub mod tracker;
pub mod unload;

use classwatch_model::{ClassroomId, StreamItemId, VideoDescriptor};
use std::time::Duration;

pub use events::{PlayerControl, TrackerEvent};
pub use session::{ProgressSample, SessionStatus};
pub use state::PlaybackPhase;
pub use tracker::{WatchTracker, WatchTrackerBuilder};

/// Period of progress reports while playing.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(15);
/// Quiet time after a seek release before it is reported.
pub const DEFAULT_SEEK_SETTLE: Duration = Duration::from_millis(300);
/// Wait after session start before seeking to the stored position.
pub const DEFAULT_RESUME_DELAY: Duration = Duration::from_millis(500);

/// Timings for one tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Master switch; when off the tracker never talks to the backend
    pub enabled: bool,
    /// Period of progress reports while playing
    pub progress_interval: Duration,
    /// Quiet time after a seek before its position is reported
    pub seek_settle: Duration,
    /// Wait between session start and the resume seek
    pub resume_delay: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            seek_settle: DEFAULT_SEEK_SETTLE,
            resume_delay: DEFAULT_RESUME_DELAY,
        }
    }
}

/// Where the player is embedded. Without one the player runs untracked.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingContext {
    /// Classroom the post belongs to
    pub classroom_id: ClassroomId,
    /// Post carrying the video
    pub stream_item_id: StreamItemId,
    /// Video being played
    pub video: VideoDescriptor,
}
