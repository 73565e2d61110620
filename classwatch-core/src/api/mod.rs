//! Backend seams used by the tracker.
//!
//! [`WatchApi`] covers the request/response calls made during a session.
//! [`BeaconTransport`] covers the fire-and-forget final report sent while the
//! host is shutting down.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use classwatch_contracts::prelude::{
    EndWatchingRequest, ResetProgressRequest, StartWatchingRequest,
    StartWatchingResponse, UpdateProgressRequest, UpdateProgressResponse,
};
use classwatch_model::{ClassroomId, VideoId, WatchId};
use std::fmt::Debug;

use crate::error::TrackingResult;

/// Watch-tracking backend operations
#[async_trait]
pub trait WatchApi: Send + Sync + Debug {
    /// Open a session; the response carries the new watch id and the stored
    /// resume position.
    async fn start_watching(
        &self,
        request: &StartWatchingRequest,
    ) -> TrackingResult<StartWatchingResponse>;

    /// Report the current position; the reply says whether a view was counted.
    async fn update_progress(
        &self,
        watch_id: &WatchId,
        request: &UpdateProgressRequest,
    ) -> TrackingResult<UpdateProgressResponse>;

    /// Close a session with its final position.
    async fn end_watching(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
    ) -> TrackingResult<()>;

    /// Forget the stored resume position for a viewer and video.
    async fn reset_progress(
        &self,
        request: &ResetProgressRequest,
    ) -> TrackingResult<()>;

    /// Views recorded for a video within one classroom.
    async fn view_count(
        &self,
        classroom_id: &ClassroomId,
        video_id: &VideoId,
    ) -> TrackingResult<u64>;
}

/// How an unload report left the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Queued to the background dispatcher
    Beacon,
    /// Dispatcher unavailable; sent as a standalone request
    KeepAlive,
}

impl DeliveryMode {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Beacon => "beacon",
            DeliveryMode::KeepAlive => "keep-alive",
        }
    }
}

/// Sends the closing report for a session without the caller waiting on it.
#[async_trait]
pub trait BeaconTransport: Send + Sync + Debug {
    /// Post the closing report in the given mode.
    async fn deliver_end(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
        mode: DeliveryMode,
    ) -> TrackingResult<()>;
}
