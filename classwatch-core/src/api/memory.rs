//! In-process backend that records every call.
//!
//! Drives the offline mode of the CLI and the tracker tests. Views are counted
//! once per session when a progress report crosses the view threshold of the
//! duration sent at start.

use async_trait::async_trait;
use classwatch_contracts::prelude::{
    EndWatchingRequest, ResetProgressRequest, StartWatchingRequest,
    StartWatchingResponse, UpdateProgressRequest, UpdateProgressResponse,
};
use classwatch_model::{ClassroomId, VideoId, WatchId};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::debug;

use super::{BeaconTransport, DeliveryMode, WatchApi};
use crate::error::{TrackingError, TrackingResult};

const DEFAULT_VIEW_THRESHOLD: f64 = 0.8;

/// One call observed by [`InMemoryWatchApi`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Start(StartWatchingRequest),
    Update {
        watch_id: WatchId,
        request: UpdateProgressRequest,
    },
    End {
        watch_id: WatchId,
        request: EndWatchingRequest,
    },
    Reset(ResetProgressRequest),
    ViewCount {
        classroom_id: ClassroomId,
        video_id: VideoId,
    },
    Beacon {
        watch_id: WatchId,
        request: EndWatchingRequest,
        mode: DeliveryMode,
    },
}

#[derive(Debug)]
struct OpenSession {
    key: (ClassroomId, VideoId),
    duration: Option<u64>,
    counted: bool,
}

#[derive(Debug)]
struct MemoryState {
    calls: Vec<RecordedCall>,
    next_watch: u64,
    sessions: HashMap<WatchId, OpenSession>,
    positions: HashMap<(ClassroomId, VideoId), f64>,
    views: HashMap<(ClassroomId, VideoId), u64>,
    view_threshold: f64,
    always_count: bool,
    fail_start: bool,
    fail_updates: bool,
    fail_reset: bool,
    failing_ends: usize,
    end_latency: Duration,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            next_watch: 1,
            sessions: HashMap::new(),
            positions: HashMap::new(),
            views: HashMap::new(),
            view_threshold: DEFAULT_VIEW_THRESHOLD,
            always_count: false,
            fail_start: false,
            fail_updates: false,
            fail_reset: false,
            failing_ends: 0,
            end_latency: Duration::ZERO,
        }
    }
}

/// Cheap to clone; clones share recorded state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWatchApi {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryWatchApi {
    /// Empty backend with the default view threshold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored position returned by the next `start_watching` for this video.
    pub fn with_resume_position(
        self,
        classroom_id: &ClassroomId,
        video_id: &VideoId,
        position: f64,
    ) -> Self {
        self.state
            .lock()
            .positions
            .insert((classroom_id.clone(), video_id.clone()), position);
        self
    }

    /// Fraction of the duration a report must reach to count a view.
    pub fn with_view_threshold(self, threshold: f64) -> Self {
        self.state.lock().view_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Report every progress update as counting a view.
    pub fn count_every_update(self) -> Self {
        self.state.lock().always_count = true;
        self
    }

    /// Hold every end call this long before it reaches the backend state. A
    /// call dropped while waiting leaves no trace.
    pub fn with_end_latency(self, latency: Duration) -> Self {
        self.state.lock().end_latency = latency;
        self
    }

    /// Reject start calls while set.
    pub fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Reject progress updates while set.
    pub fn fail_updates(&self, fail: bool) {
        self.state.lock().fail_updates = fail;
    }

    /// Reject reset calls while set.
    pub fn fail_reset(&self, fail: bool) {
        self.state.lock().fail_reset = fail;
    }

    /// Reject the next `count` end calls.
    pub fn fail_next_ends(&self, count: usize) {
        self.state.lock().failing_ends = count;
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn starts(&self) -> Vec<StartWatchingRequest> {
        self.filter_calls(|call| match call {
            RecordedCall::Start(request) => Some(request.clone()),
            _ => None,
        })
    }

    pub fn updates(&self) -> Vec<(WatchId, UpdateProgressRequest)> {
        self.filter_calls(|call| match call {
            RecordedCall::Update { watch_id, request } => {
                Some((watch_id.clone(), *request))
            }
            _ => None,
        })
    }

    pub fn ends(&self) -> Vec<(WatchId, EndWatchingRequest)> {
        self.filter_calls(|call| match call {
            RecordedCall::End { watch_id, request } => {
                Some((watch_id.clone(), *request))
            }
            _ => None,
        })
    }

    pub fn resets(&self) -> Vec<ResetProgressRequest> {
        self.filter_calls(|call| match call {
            RecordedCall::Reset(request) => Some(request.clone()),
            _ => None,
        })
    }

    pub fn beacons(&self) -> Vec<(WatchId, EndWatchingRequest, DeliveryMode)> {
        self.filter_calls(|call| match call {
            RecordedCall::Beacon {
                watch_id,
                request,
                mode,
            } => Some((watch_id.clone(), *request, *mode)),
            _ => None,
        })
    }

    fn filter_calls<T>(&self, pick: impl Fn(&RecordedCall) -> Option<T>) -> Vec<T> {
        self.state.lock().calls.iter().filter_map(pick).collect()
    }

    fn close(state: &mut MemoryState, watch_id: &WatchId, position: f64) {
        if let Some(session) = state.sessions.remove(watch_id) {
            state.positions.insert(session.key, position);
        }
    }
}

#[async_trait]
impl WatchApi for InMemoryWatchApi {
    async fn start_watching(
        &self,
        request: &StartWatchingRequest,
    ) -> TrackingResult<StartWatchingResponse> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall::Start(request.clone()));
        if state.fail_start {
            return Err(TrackingError::Transport("start rejected".into()));
        }

        let watch_id = WatchId::parse(format!("watch-{}", state.next_watch))?;
        state.next_watch += 1;

        let key = (request.classroom_id.clone(), request.video_id.clone());
        let current_time = state.positions.get(&key).copied().unwrap_or(0.0);
        state.sessions.insert(
            watch_id.clone(),
            OpenSession {
                key,
                duration: request.duration,
                counted: false,
            },
        );
        debug!(watch_id = %watch_id, current_time, "opened in-memory session");

        let progress_percent = request
            .duration
            .filter(|d| *d > 0)
            .map(|d| (current_time / d as f64 * 100.0).min(100.0))
            .unwrap_or(0.0);

        Ok(StartWatchingResponse {
            watch_id,
            current_time,
            progress_percent,
        })
    }

    async fn update_progress(
        &self,
        watch_id: &WatchId,
        request: &UpdateProgressRequest,
    ) -> TrackingResult<UpdateProgressResponse> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.calls.push(RecordedCall::Update {
            watch_id: watch_id.clone(),
            request: *request,
        });
        if state.fail_updates {
            return Err(TrackingError::Transport("update rejected".into()));
        }

        let Some(session) = state.sessions.get_mut(watch_id) else {
            return Err(TrackingError::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                body: format!("no open session {watch_id}"),
            });
        };

        let reached = session.duration.filter(|d| *d > 0).is_some_and(|d| {
            request.current_position / d as f64 >= state.view_threshold
        });
        if !session.counted && (reached || state.always_count) {
            session.counted = true;
            *state.views.entry(session.key.clone()).or_default() += 1;
        }
        let view_counted = session.counted;
        state
            .positions
            .insert(session.key.clone(), request.current_position);

        Ok(UpdateProgressResponse { view_counted })
    }

    async fn end_watching(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
    ) -> TrackingResult<()> {
        let latency = self.state.lock().end_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.calls.push(RecordedCall::End {
            watch_id: watch_id.clone(),
            request: *request,
        });
        if state.failing_ends > 0 {
            state.failing_ends -= 1;
            return Err(TrackingError::Transport("end rejected".into()));
        }
        Self::close(&mut state, watch_id, request.end_position);
        Ok(())
    }

    async fn reset_progress(
        &self,
        request: &ResetProgressRequest,
    ) -> TrackingResult<()> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall::Reset(request.clone()));
        if state.fail_reset {
            return Err(TrackingError::Transport("reset rejected".into()));
        }
        state
            .positions
            .remove(&(request.classroom_id.clone(), request.video_id.clone()));
        Ok(())
    }

    async fn view_count(
        &self,
        classroom_id: &ClassroomId,
        video_id: &VideoId,
    ) -> TrackingResult<u64> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall::ViewCount {
            classroom_id: classroom_id.clone(),
            video_id: video_id.clone(),
        });
        Ok(state
            .views
            .get(&(classroom_id.clone(), video_id.clone()))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl BeaconTransport for InMemoryWatchApi {
    async fn deliver_end(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
        mode: DeliveryMode,
    ) -> TrackingResult<()> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall::Beacon {
            watch_id: watch_id.clone(),
            request: *request,
            mode,
        });
        Self::close(&mut state, watch_id, request.end_position);
        Ok(())
    }
}
