//! End-of-video handling and replay.

use classwatch_contracts::prelude::ResetProgressRequest;
use tracing::{debug, info, warn};

use super::{
    PlaybackPhase, events::TrackerEvent, reporter::ProgressTrigger,
    tracker::WatchTracker,
};

impl WatchTracker {
    /// The player reached the end.
    ///
    /// Sends one final progress report at the full duration, then closes the
    /// session. Repeated end events are ignored until a replay.
    pub async fn on_ended(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.phase == PlaybackPhase::Completed {
                debug!("already completed");
                return;
            }
            state.phase = PlaybackPhase::Completed;
            state.played = 1.0;
            state.seeking = false;
        }
        inner.sync_ticker();

        inner.report_progress(ProgressTrigger::Completion).await;
        self.end_session().await;

        info!("video completed");
        inner.emit(TrackerEvent::Completed);
    }

    /// Start over from the beginning in a fresh session.
    ///
    /// Clears the stored resume position so the new session starts at zero,
    /// closes anything still open and resumes playback. Reset failures are
    /// logged and do not stop the replay.
    pub async fn replay(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.phase = PlaybackPhase::Idle;
            state.played = 0.0;
            state.seeking = false;
        }
        inner.sync_ticker();
        inner.player.seek_to(0.0);

        if let Some(context) = inner.context.as_ref()
            && inner.tracking_enabled()
        {
            let request = ResetProgressRequest {
                video_id: context.video.id.clone(),
                classroom_id: context.classroom_id.clone(),
                stream_item_id: context.stream_item_id.clone(),
            };
            if let Err(err) = inner.api.reset_progress(&request).await {
                warn!(
                    error = %err,
                    video_id = %context.video.id,
                    "failed to reset stored position; replaying anyway"
                );
            }

            self.end_session().await;
            self.start_session(true).await;
        }

        inner.state.lock().phase = PlaybackPhase::Playing;
        inner.player.play();
        inner.sync_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::memory::InMemoryWatchApi,
        tracking::{SessionStatus, TrackingContext, events::MockPlayerControl},
    };
    use classwatch_model::{
        ClassroomId, StreamItemId, VideoDescriptor, VideoId, VideoKind,
    };
    use mockall::predicate::eq;
    use std::sync::Arc;

    fn context() -> TrackingContext {
        TrackingContext {
            classroom_id: ClassroomId::parse("c1").unwrap(),
            stream_item_id: StreamItemId::parse("s1").unwrap(),
            video: VideoDescriptor {
                id: VideoId::parse("v1").unwrap(),
                title: "Intro".into(),
                url: None,
                duration_secs: Some(100),
                kind: VideoKind::Video,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replay_seeks_to_zero_and_restarts_playback() {
        let api = InMemoryWatchApi::new();
        let mut player = MockPlayerControl::new();
        // Immediate rewind plus the skip-resume seek of the new session.
        player.expect_seek_to().with(eq(0.0)).times(2).return_const(());
        player.expect_play().times(1).return_const(());

        let tracker = WatchTracker::builder(Arc::new(api.clone()), Arc::new(player))
            .context(context())
            .build();
        assert!(tracker.mount().await);
        tracker.on_play();
        tracker.on_ended().await;
        assert_eq!(tracker.phase(), PlaybackPhase::Completed);
        assert_eq!(tracker.session_status(), SessionStatus::NoSession);

        tracker.replay().await;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        assert_eq!(tracker.phase(), PlaybackPhase::Playing);
        assert_eq!(tracker.played(), 0.0);
        assert_eq!(api.resets().len(), 1);
        assert_eq!(api.starts().len(), 2);
        assert_eq!(
            tracker.session_status().watch_id().map(|id| id.as_str()),
            Some("watch-2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replay_survives_reset_failure() {
        let api = InMemoryWatchApi::new();
        api.fail_reset(true);
        let mut player = MockPlayerControl::new();
        player.expect_seek_to().return_const(());
        player.expect_play().times(1).return_const(());

        let tracker = WatchTracker::builder(Arc::new(api.clone()), Arc::new(player))
            .context(context())
            .build();
        tracker.mount().await;
        tracker.on_ended().await;
        tracker.replay().await;

        assert_eq!(api.starts().len(), 2);
        assert!(matches!(tracker.session_status(), SessionStatus::Active(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_replay_only_drives_player() {
        let api = InMemoryWatchApi::new();
        let mut player = MockPlayerControl::new();
        player.expect_seek_to().with(eq(0.0)).times(1).return_const(());
        player.expect_play().times(1).return_const(());

        let tracker =
            WatchTracker::builder(Arc::new(api.clone()), Arc::new(player)).build();
        assert!(!tracker.mount().await);
        tracker.replay().await;

        assert!(api.calls().is_empty());
        assert_eq!(tracker.phase(), PlaybackPhase::Playing);
    }
}
