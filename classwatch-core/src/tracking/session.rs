use chrono::{DateTime, Utc};
use classwatch_model::WatchId;
use std::time::Duration;
use tokio::time::Instant;

/// An open backend session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub watch_id: WatchId,
    /// Monotonic start, basis of watched-time accounting
    pub started_at: Instant,
    /// Wall-clock start, for logs
    pub opened_at: DateTime<Utc>,
}

impl ActiveSession {
    /// Start the clocks for a session the backend just opened.
    pub fn open(watch_id: WatchId) -> Self {
        Self {
            watch_id,
            started_at: Instant::now(),
            opened_at: Utc::now(),
        }
    }

    /// Wall time since the session opened.
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.started_at)
    }
}

/// Session lifecycle. `Ending` suppresses a second end and progress reports
/// while the end call is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    NoSession,
    Active(ActiveSession),
    Ending(ActiveSession),
}

impl SessionState {
    /// Id of the open session, including one whose end call is in flight.
    pub fn watch_id(&self) -> Option<&WatchId> {
        self.current().map(|session| &session.watch_id)
    }

    /// The open session, whether or not it is being ended.
    pub fn current(&self) -> Option<&ActiveSession> {
        match self {
            SessionState::NoSession => None,
            SessionState::Active(session) | SessionState::Ending(session) => {
                Some(session)
            }
        }
    }

    /// The open session, unless an end call is in flight.
    pub fn active(&self) -> Option<&ActiveSession> {
        match self {
            SessionState::Active(session) => Some(session),
            _ => None,
        }
    }

    /// Move `Active` to `Ending`, returning the session being closed.
    pub fn begin_ending(&mut self) -> Option<ActiveSession> {
        match std::mem::take(self) {
            SessionState::Active(session) => {
                *self = SessionState::Ending(session.clone());
                Some(session)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Close the session if it is still the one being ended.
    pub fn finish_ending(&mut self, watch_id: &WatchId) -> bool {
        let closing = matches!(
            self,
            SessionState::Ending(session) if &session.watch_id == watch_id
        );
        if closing {
            *self = SessionState::NoSession;
        }
        closing
    }

    /// Return to `Active` after a failed end so it can be retried.
    pub fn abort_ending(&mut self, watch_id: &WatchId) -> bool {
        match std::mem::take(self) {
            SessionState::Ending(session) if &session.watch_id == watch_id => {
                *self = SessionState::Active(session);
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Snapshot for callers outside the tracker.
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::NoSession => SessionStatus::NoSession,
            SessionState::Active(s) => SessionStatus::Active(s.watch_id.clone()),
            SessionState::Ending(s) => SessionStatus::Ending(s.watch_id.clone()),
        }
    }
}

/// Public view of [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    NoSession,
    Active(WatchId),
    /// An end call for this session is in flight
    Ending(WatchId),
}

impl SessionStatus {
    /// Id of the open session, if any.
    pub fn watch_id(&self) -> Option<&WatchId> {
        match self {
            SessionStatus::NoSession => None,
            SessionStatus::Active(id) | SessionStatus::Ending(id) => Some(id),
        }
    }
}

/// Numbers sent in a progress or end report, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Playhead position
    pub position: f64,
    /// Time spent watching in this session, never above `position`
    pub watched: f64,
}

impl ProgressSample {
    /// `position` is the played fraction of `duration`, clamped to it.
    /// Watched time is wall time since session start, capped at `position`.
    pub fn compute(played: f64, duration: f64, elapsed: Duration) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let played = if played.is_finite() { played.clamp(0.0, 1.0) } else { 0.0 };
        let position = (played * duration).clamp(0.0, duration);
        let watched = elapsed.as_secs_f64().min(position);
        Self { position, watched }
    }
}
