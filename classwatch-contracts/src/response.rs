use serde::{Deserialize, Serialize};

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

/// Envelope wrapping every JSON payload returned by the backend.
///
/// Failures either use a non-2xx status or a `status: "error"` body without
/// `data`; `error` is preferred over `message` when describing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A successful reply carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data: Some(data),
            error: None,
            message: None,
        }
    }

    /// A failed reply with no payload.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Best available description of a failed reply.
    pub fn failure_reason(self) -> String {
        self.error.or(self.message).unwrap_or(self.status)
    }
}
