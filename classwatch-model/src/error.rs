use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Neither an explicit id nor a recognizable YouTube URL was supplied.
    MissingVideoId,
    InvalidDuration(String),
    InvalidId(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MissingVideoId => {
                write!(f, "video id missing and not derivable from url")
            }
            ModelError::InvalidDuration(raw) => {
                write!(f, "invalid duration: {raw:?}")
            }
            ModelError::InvalidId(msg) => write!(f, "invalid id: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
