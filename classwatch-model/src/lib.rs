//! Core data model definitions shared across Classwatch crates.
#![allow(missing_docs)]

pub mod duration;
pub mod error;
pub mod ids;
pub mod video;

pub use duration::{DurationInput, parse_duration_secs};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{ClassroomId, StreamItemId, VideoId, WatchId};
pub use video::{VideoDescriptor, VideoKind, VideoSource, extract_youtube_id};
