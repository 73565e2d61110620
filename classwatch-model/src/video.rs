use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{self, Display, Formatter};

use crate::duration::DurationInput;
use crate::error::{ModelError, Result};
use crate::ids::VideoId;

static YOUTUBE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:youtube(?:-nocookie)?\.com/(?:watch\?(?:.*&)?v=|embed/|v/|shorts/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("static YouTube pattern compiles")
});

/// Where the video is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VideoKind {
    /// Uploaded file served by the classroom backend
    #[default]
    Video,
    /// YouTube-hosted video embedded in a post
    Youtube,
}

impl Display for VideoKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VideoKind::Video => write!(f, "video"),
            VideoKind::Youtube => write!(f, "youtube"),
        }
    }
}

/// Extract the 11 character YouTube id from a watch, embed or short URL.
pub fn extract_youtube_id(url: &str) -> Option<&str> {
    YOUTUBE_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Video data as attached to a stream post, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VideoSource {
    pub id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub embed_url: Option<String>,
    pub duration: Option<DurationInput>,
    pub kind: Option<VideoKind>,
}

/// Normalized description of a video, ready to open a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VideoDescriptor {
    pub id: VideoId,
    pub title: String,
    pub url: Option<String>,
    pub duration_secs: Option<u64>,
    pub kind: VideoKind,
}

impl VideoDescriptor {
    /// Resolve a raw post attachment.
    ///
    /// The id comes from the explicit field first, then from `url`, then from
    /// `embed_url`. A URL-derived id implies a YouTube video unless the source
    /// names its kind explicitly.
    pub fn resolve(source: &VideoSource) -> Result<Self> {
        let explicit = source
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let (raw_id, derived) = match explicit {
            Some(id) => (id.to_string(), false),
            None => {
                let from_url = [source.url.as_deref(), source.embed_url.as_deref()]
                    .into_iter()
                    .flatten()
                    .find_map(extract_youtube_id)
                    .ok_or(ModelError::MissingVideoId)?;
                (from_url.to_string(), true)
            }
        };

        let id = VideoId::parse(raw_id)?;

        let duration_secs = source
            .duration
            .as_ref()
            .map(DurationInput::to_secs)
            .transpose()?;

        let kind = source.kind.unwrap_or(if derived {
            VideoKind::Youtube
        } else {
            VideoKind::Video
        });

        let title = source
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string());

        Ok(Self {
            id,
            title,
            url: source.url.clone().or_else(|| source.embed_url.clone()),
            duration_secs,
            kind,
        })
    }
}
