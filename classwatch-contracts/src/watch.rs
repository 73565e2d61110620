//! Watch-session payloads.
//!
//! All bodies are camelCase JSON. Positions and watched time are seconds.

use classwatch_model::{
    ClassroomId, StreamItemId, VideoDescriptor, VideoId, VideoKind, WatchId,
};
use serde::{Deserialize, Serialize};

/// Opens a watch session for one viewer, video and classroom post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWatchingRequest {
    pub video_id: VideoId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Total length in seconds, when known up front
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(rename = "type")]
    pub video_type: VideoKind,
    pub classroom_id: ClassroomId,
    pub stream_item_id: StreamItemId,
}

impl StartWatchingRequest {
    pub fn new(
        video: &VideoDescriptor,
        classroom_id: ClassroomId,
        stream_item_id: StreamItemId,
    ) -> Self {
        Self {
            video_id: video.id.clone(),
            title: video.title.clone(),
            url: video.url.clone(),
            duration: video.duration_secs,
            video_type: video.kind,
            classroom_id,
            stream_item_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWatchingResponse {
    pub watch_id: WatchId,
    /// Last stored position for this viewer, used to resume
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub current_position: f64,
    pub session_watched_seconds: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressResponse {
    /// True once the backend has counted this session as a view
    #[serde(default)]
    pub view_counted: bool,
}

/// Final report closing a session. Also the unload beacon body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndWatchingRequest {
    pub end_position: f64,
    pub session_watched_seconds: f64,
}

/// Clears the stored resume position for a viewer and video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetProgressRequest {
    pub video_id: VideoId,
    pub classroom_id: ClassroomId,
    pub stream_item_id: StreamItemId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCountResponse {
    pub view_count: u64,
}
