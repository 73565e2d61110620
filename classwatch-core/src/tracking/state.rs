use classwatch_model::WatchId;

use super::session::{ProgressSample, SessionState};

/// What the player is doing, as far as the tracker knows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Playing,
    Paused,
    /// Reached the end; only a replay leaves this phase
    Completed,
}

/// Snapshot shared by player callbacks, the ticker and network tasks.
///
/// Guarded by a `parking_lot::Mutex` that is never held across an await.
#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub session: SessionState,
    /// A start call is in flight
    pub starting: bool,
    pub phase: PlaybackPhase,
    /// Last reported played fraction in `[0, 1]`
    pub played: f64,
    /// Known once, then fixed for the player's lifetime
    pub duration: Option<f64>,
    pub seeking: bool,
    /// Bumped on every seek release so only the latest one reports
    pub seek_epoch: u64,
    pub view_counted: bool,
    pub mounted: bool,
    pub unload_hook_registered: bool,
}

impl TrackerState {
    /// Progress numbers for the active session, if one is open and the
    /// duration is known.
    pub fn progress_sample(&self) -> Option<(WatchId, ProgressSample)> {
        let session = self.session.active()?;
        let duration = self.duration?;
        Some((
            session.watch_id.clone(),
            ProgressSample::compute(self.played, duration, session.elapsed()),
        ))
    }

    /// Closing numbers; an unknown duration reports zero.
    pub fn closing_sample(&self, elapsed: std::time::Duration) -> ProgressSample {
        ProgressSample::compute(self.played, self.duration.unwrap_or(0.0), elapsed)
    }

    /// The ticker should run only while playing with an open session.
    pub fn ticker_target(&self) -> Option<WatchId> {
        if self.mounted && self.phase == PlaybackPhase::Playing {
            self.session.active().map(|s| s.watch_id.clone())
        } else {
            None
        }
    }
}
