use classwatch_contracts::prelude::{EndWatchingRequest, StartWatchingRequest};
use classwatch_model::WatchId;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    PlaybackPhase, TrackerSettings, TrackingContext,
    events::{PlayerControl, TrackerEvent},
    reporter::ProgressTrigger,
    session::{ActiveSession, SessionState, SessionStatus},
    state::TrackerState,
    unload::UnloadReporter,
};
use crate::{
    api::WatchApi,
    error::{TrackingError, TrackingResult},
};

const EVENT_CAPACITY: usize = 32;

pub(crate) struct Ticker {
    pub watch_id: WatchId,
    pub handle: JoinHandle<()>,
}

pub(crate) struct Inner {
    pub api: Arc<dyn WatchApi>,
    pub player: Arc<dyn PlayerControl>,
    pub settings: TrackerSettings,
    pub context: Option<TrackingContext>,
    pub unload: Option<Arc<UnloadReporter>>,
    pub state: Mutex<TrackerState>,
    pub ticker: Mutex<Option<Ticker>>,
    /// Resume seeks and the unload hook; aborted on unmount
    pub background: Mutex<Vec<JoinHandle<()>>>,
    pub events: broadcast::Sender<TrackerEvent>,
}

impl Inner {
    pub fn tracking_enabled(&self) -> bool {
        self.settings.enabled && self.context.is_some()
    }

    pub fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn track_background(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock();
        background.retain(|task| !task.is_finished());
        background.push(handle);
    }

    fn abort_background(&self) {
        for task in self.background.lock().drain(..) {
            task.abort();
        }
    }

    /// Seek to the stored position once the player has had time to settle.
    fn schedule_resume(self: &Arc<Self>, position: f64, announce: bool) {
        let weak = Arc::downgrade(self);
        let delay = self.settings.resume_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let target = {
                let mut state = inner.state.lock();
                if !state.mounted {
                    return;
                }
                let target = match state.duration {
                    Some(duration) => position.clamp(0.0, duration),
                    None => position.max(0.0),
                };
                if let Some(duration) = state.duration.filter(|d| *d > 0.0) {
                    state.played = target / duration;
                }
                target
            };

            inner.player.seek_to(target);
            if announce {
                info!(position = target, "resuming from stored position");
                inner.emit(TrackerEvent::Resumed { position: target });
            }
        });
        self.track_background(handle);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.handle.abort();
        }
        for task in self.background.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Returns an `Ending` session to `Active` unless its end call settled, so a
/// failed or abandoned call can be retried.
struct PendingEnd<'a> {
    inner: &'a Inner,
    watch_id: &'a WatchId,
    settled: bool,
}

impl Drop for PendingEnd<'_> {
    fn drop(&mut self) {
        if !self.settled
            && self.inner.state.lock().session.abort_ending(self.watch_id)
        {
            debug!(watch_id = %self.watch_id, "end call did not complete; session stays open");
        }
    }
}

/// Tracks watch sessions for one player.
///
/// Cloning yields another handle to the same tracker. Player callbacks
/// (`on_*`) never block; methods that talk to the backend are async and never
/// fail playback.
#[derive(Clone)]
pub struct WatchTracker {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for WatchTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WatchTracker")
            .field("session", &state.session.status())
            .field("phase", &state.phase)
            .field("played", &state.played)
            .field("duration", &state.duration)
            .field("tracking", &self.inner.tracking_enabled())
            .finish()
    }
}

/// Configures a [`WatchTracker`]; obtained from [`WatchTracker::builder`].
pub struct WatchTrackerBuilder {
    api: Arc<dyn WatchApi>,
    player: Arc<dyn PlayerControl>,
    settings: TrackerSettings,
    context: Option<TrackingContext>,
    unload: Option<Arc<UnloadReporter>>,
}

impl std::fmt::Debug for WatchTrackerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchTrackerBuilder")
            .field("api", &self.api)
            .field("settings", &self.settings)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl WatchTrackerBuilder {
    /// Replace the default timings.
    pub fn settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach the classroom post being played. Without it nothing is tracked.
    pub fn context(mut self, context: TrackingContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Reporter used for the closing report when the host shuts down.
    pub fn unload_reporter(mut self, reporter: Arc<UnloadReporter>) -> Self {
        self.unload = Some(reporter);
        self
    }

    /// Finish the tracker. A positive descriptor duration is taken as known.
    pub fn build(self) -> WatchTracker {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = TrackerState {
            duration: self
                .context
                .as_ref()
                .and_then(|ctx| ctx.video.duration_secs)
                .filter(|secs| *secs > 0)
                .map(|secs| secs as f64),
            ..Default::default()
        };

        WatchTracker {
            inner: Arc::new(Inner {
                api: self.api,
                player: self.player,
                settings: self.settings,
                context: self.context,
                unload: self.unload,
                state: Mutex::new(state),
                ticker: Mutex::new(None),
                background: Mutex::new(Vec::new()),
                events,
            }),
        }
    }
}

impl WatchTracker {
    /// Start building a tracker that talks to `api` and drives `player`.
    pub fn builder(
        api: Arc<dyn WatchApi>,
        player: Arc<dyn PlayerControl>,
    ) -> WatchTrackerBuilder {
        WatchTrackerBuilder {
            api,
            player,
            settings: TrackerSettings::default(),
            context: None,
            unload: None,
        }
    }

    /// Receive events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    /// True when a context is attached and tracking is switched on.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking_enabled()
    }

    /// Current backend session, if any.
    pub fn session_status(&self) -> SessionStatus {
        self.inner.state.lock().session.status()
    }

    /// Playback phase as last reported by the player.
    pub fn phase(&self) -> PlaybackPhase {
        self.inner.state.lock().phase
    }

    /// Played fraction in `[0, 1]`.
    pub fn played(&self) -> f64 {
        self.inner.state.lock().played
    }

    /// Video length in seconds, once known.
    pub fn duration(&self) -> Option<f64> {
        self.inner.state.lock().duration
    }

    /// Whether the backend counted the current session as a view.
    pub fn view_counted(&self) -> bool {
        self.inner.state.lock().view_counted
    }

    /// The post being played, when tracking was configured.
    pub fn context(&self) -> Option<&TrackingContext> {
        self.inner.context.as_ref()
    }

    /// Attach to a newly shown player and open its first session.
    pub async fn mount(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.mounted {
                debug!("tracker already mounted");
                return false;
            }
            state.mounted = true;
        }

        if !self.inner.tracking_enabled() {
            debug!("no tracking context; playback runs untracked");
            return false;
        }
        self.start_session(false).await
    }

    /// Open a backend session.
    ///
    /// Refused while another session exists or a start is in flight. On
    /// success the player is moved to the stored position after the resume
    /// delay, or to the start when `skip_resume` is set.
    pub async fn start_session(&self, skip_resume: bool) -> bool {
        let inner = &self.inner;
        let Some(context) =
            inner.context.as_ref().filter(|_| inner.settings.enabled)
        else {
            return false;
        };

        let duration = {
            let mut state = inner.state.lock();
            if !state.mounted {
                debug!("player not mounted; not starting a session");
                return false;
            }
            if state.starting || state.session.watch_id().is_some() {
                warn!(
                    session = ?state.session.status(),
                    "watch session already open; end it before starting another"
                );
                return false;
            }
            state.starting = true;
            state.duration
        };

        let mut video = context.video.clone();
        if video.duration_secs.is_none() {
            video.duration_secs = duration.map(|d| d.round() as u64);
        }
        let request = StartWatchingRequest::new(
            &video,
            context.classroom_id.clone(),
            context.stream_item_id.clone(),
        );
        let result = inner.api.start_watching(&request).await;

        let (response, still_mounted) = {
            let mut state = inner.state.lock();
            state.starting = false;
            match result {
                Ok(response) => {
                    state.session = SessionState::Active(ActiveSession::open(
                        response.watch_id.clone(),
                    ));
                    state.view_counted = false;
                    (response, state.mounted)
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        video_id = %video.id,
                        "failed to start watch session; playback continues untracked"
                    );
                    return false;
                }
            }
        };

        info!(
            watch_id = %response.watch_id,
            video_id = %video.id,
            classroom_id = %context.classroom_id,
            resume_at = response.current_time,
            "watch session started"
        );
        inner.emit(TrackerEvent::SessionStarted {
            watch_id: response.watch_id.clone(),
        });

        if !still_mounted {
            debug!("player unmounted while starting; closing session");
            self.end_session().await;
            return false;
        }

        inner.sync_ticker();

        if skip_resume {
            inner.schedule_resume(0.0, false);
        } else if response.current_time > 0.0 {
            inner.schedule_resume(response.current_time, true);
        }
        true
    }

    /// Close the open session with its final position.
    ///
    /// Returns false without a network call when there is no active session
    /// or an end is already in flight. A failed end, or one whose future is
    /// dropped before the backend answers, leaves the session open so a later
    /// call can retry.
    pub async fn end_session(&self) -> bool {
        let inner = &self.inner;
        let (session, sample) = {
            let mut state = inner.state.lock();
            let Some(session) = state.session.begin_ending() else {
                debug!("no active session to end");
                return false;
            };
            let sample = state.closing_sample(session.elapsed());
            (session, sample)
        };
        let mut pending = PendingEnd {
            inner: inner.as_ref(),
            watch_id: &session.watch_id,
            settled: false,
        };
        inner.sync_ticker();

        let request = EndWatchingRequest {
            end_position: sample.position,
            session_watched_seconds: sample.watched,
        };
        match inner.api.end_watching(&session.watch_id, &request).await {
            Ok(()) => {
                pending.settled = true;
                drop(pending);
                inner.state.lock().session.finish_ending(&session.watch_id);
                info!(
                    watch_id = %session.watch_id,
                    position = sample.position,
                    watched = sample.watched,
                    opened_at = %session.opened_at,
                    "watch session ended"
                );
                inner.emit(TrackerEvent::SessionEnded {
                    watch_id: session.watch_id,
                });
                true
            }
            Err(err) => {
                warn!(
                    error = %err,
                    watch_id = %session.watch_id,
                    "failed to end watch session"
                );
                drop(pending);
                inner.sync_ticker();
                false
            }
        }
    }

    /// Detach from the player: stop timers, drop the unload hook and close
    /// the session.
    pub async fn unmount(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.mounted {
                return false;
            }
            state.mounted = false;
            state.unload_hook_registered = false;
        }
        self.inner.sync_ticker();
        self.inner.abort_background();
        self.end_session().await
    }

    /// Total length reported by the player. The first positive value wins.
    pub fn on_duration(&self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        let mut state = self.inner.state.lock();
        match state.duration {
            None => state.duration = Some(seconds),
            Some(known) if (known - seconds).abs() >= 1.0 => {
                debug!(known, reported = seconds, "ignoring duration change");
            }
            Some(_) => {}
        }
    }

    /// Played fraction from the player's progress callback. Ignored while the
    /// user is dragging the seek bar.
    pub fn on_progress(&self, played: f64) {
        let mut state = self.inner.state.lock();
        if !state.seeking && played.is_finite() {
            state.played = played.clamp(0.0, 1.0);
        }
    }

    /// Playback started or resumed. Ignored after completion.
    pub fn on_play(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.phase == PlaybackPhase::Completed {
                debug!("play ignored after completion; replay starts over");
                return;
            }
            state.phase = PlaybackPhase::Playing;
        }
        self.inner.sync_ticker();
    }

    /// Stop the ticker and report the paused position right away.
    pub fn on_pause(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.state.lock();
            if state.phase != PlaybackPhase::Playing {
                return None;
            }
            state.phase = PlaybackPhase::Paused;
        }
        self.inner.sync_ticker();

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            inner.report_progress(ProgressTrigger::Pause).await;
        }))
    }

    /// The user grabbed the seek bar; progress callbacks are ignored until
    /// release.
    pub fn on_seek_start(&self) {
        self.inner.state.lock().seeking = true;
    }

    /// Report the new position once seeking has been quiet for the settle
    /// delay. A newer release supersedes a pending one.
    pub fn on_seek_release(&self, played: f64) -> JoinHandle<()> {
        let epoch = {
            let mut state = self.inner.state.lock();
            state.seeking = false;
            if played.is_finite() && state.phase != PlaybackPhase::Completed {
                state.played = played.clamp(0.0, 1.0);
            }
            state.seek_epoch += 1;
            state.seek_epoch
        };

        let inner = Arc::clone(&self.inner);
        let settle = inner.settings.seek_settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if inner.state.lock().seek_epoch != epoch {
                return;
            }
            inner.report_progress(ProgressTrigger::Seek).await;
        })
    }

    /// Views recorded by the backend for this video in this classroom.
    pub async fn view_count(&self) -> TrackingResult<u64> {
        let context =
            self.inner.context.as_ref().ok_or(TrackingError::NotTracked)?;
        self.inner
            .api
            .view_count(&context.classroom_id, &context.video.id)
            .await
    }
}
