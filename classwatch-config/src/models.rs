use std::{fmt, path::PathBuf, time::Duration};

use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_SEEK_SETTLE: Duration = Duration::from_millis(300);
pub const DEFAULT_RESUME_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_UNLOAD_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_BEACON_QUEUE: usize = 8;

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub tracking: TrackingConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub url: Url,
    pub api_prefix: String,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Base URL that route templates are appended to, without a trailing slash.
    pub fn api_base(&self) -> String {
        let origin = self.url.as_str().trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            origin.to_string()
        } else {
            format!("{origin}/{prefix}")
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self.url.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("::1") | Some("[::1]")
        )
    }
}

#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Timings and switches for the watch tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub progress_interval: Duration,
    pub seek_settle: Duration,
    pub resume_delay: Duration,
    pub unload_timeout: Duration,
    pub beacon_queue: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            seek_settle: DEFAULT_SEEK_SETTLE,
            resume_delay: DEFAULT_RESUME_DELAY,
            unload_timeout: DEFAULT_UNLOAD_TIMEOUT,
            beacon_queue: DEFAULT_BEACON_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
