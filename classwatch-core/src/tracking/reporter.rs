//! Progress reporting and the periodic ticker.

use classwatch_contracts::prelude::UpdateProgressRequest;
use classwatch_model::WatchId;
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    events::TrackerEvent,
    tracker::{Inner, Ticker},
};

/// Why a progress report was sent; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTrigger {
    Interval,
    Pause,
    Seek,
    Completion,
}

impl ProgressTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressTrigger::Interval => "interval",
            ProgressTrigger::Pause => "pause",
            ProgressTrigger::Seek => "seek",
            ProgressTrigger::Completion => "completion",
        }
    }
}

impl Inner {
    /// Send the current position for the active session.
    ///
    /// Skipped while seeking, while the session is ending and before the
    /// duration is known. Failures are logged and dropped.
    pub(crate) async fn report_progress(&self, trigger: ProgressTrigger) {
        let sample = {
            let state = self.state.lock();
            if state.seeking {
                debug!(trigger = trigger.as_str(), "seeking; progress report skipped");
                return;
            }
            state.progress_sample()
        };
        let Some((watch_id, sample)) = sample else {
            return;
        };

        let request = UpdateProgressRequest {
            current_position: sample.position,
            session_watched_seconds: sample.watched,
        };
        match self.api.update_progress(&watch_id, &request).await {
            Ok(response) => {
                debug!(
                    watch_id = %watch_id,
                    trigger = trigger.as_str(),
                    position = sample.position,
                    watched = sample.watched,
                    "progress reported"
                );
                if response.view_counted {
                    self.note_view_counted(&watch_id);
                }
            }
            Err(err) => warn!(
                error = %err,
                watch_id = %watch_id,
                trigger = trigger.as_str(),
                "failed to report progress"
            ),
        }
    }

    /// Flip the per-session view flag once, for the session still open.
    fn note_view_counted(&self, watch_id: &WatchId) {
        {
            let mut state = self.state.lock();
            if state.view_counted || state.session.watch_id() != Some(watch_id) {
                return;
            }
            state.view_counted = true;
        }
        info!(watch_id = %watch_id, "view counted");
        self.emit(TrackerEvent::ViewCounted {
            watch_id: watch_id.clone(),
        });
    }

    /// Arm the ticker while playing with an active session, disarm otherwise.
    pub(crate) fn sync_ticker(self: &Arc<Self>) {
        let wanted = self.state.lock().ticker_target();
        let mut ticker = self.ticker.lock();

        let armed_for_wanted = matches!(
            (ticker.as_ref(), wanted.as_ref()),
            (Some(current), Some(id)) if &current.watch_id == id
        );
        if armed_for_wanted {
            return;
        }

        if let Some(old) = ticker.take() {
            old.handle.abort();
        }
        if let Some(watch_id) = wanted {
            debug!(watch_id = %watch_id, "progress ticker armed");
            *ticker = Some(Ticker {
                handle: self.spawn_ticker(),
                watch_id,
            });
        }
    }

    fn spawn_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.settings.progress_interval;
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.report_progress(ProgressTrigger::Interval).await;
            }
        })
    }
}
