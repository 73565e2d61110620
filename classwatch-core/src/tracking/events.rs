use classwatch_model::WatchId;

/// Notifications published by a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// The backend opened a session
    SessionStarted { watch_id: WatchId },
    /// The player was moved to the stored position
    Resumed { position: f64 },
    /// The backend counted this session as a view; fires once per session
    ViewCounted { watch_id: WatchId },
    /// Playback reached the end
    Completed,
    /// The backend acknowledged the end of a session
    SessionEnded { watch_id: WatchId },
}

/// Commands the tracker issues back to the player.
#[cfg_attr(test, mockall::automock)]
pub trait PlayerControl: Send + Sync {
    /// Move the playhead to `position` seconds.
    fn seek_to(&self, position: f64);
    /// Resume playback.
    fn play(&self);
}
