use std::time::Duration;

use thiserror::Error;

use super::models::Config;

const MIN_SENSIBLE_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("server URL scheme '{scheme}' is not supported (expected http or https)")]
    UnsupportedScheme { scheme: String },
    #[error("tracking.{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    let scheme = config.server.url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ConfigGuardRailError::UnsupportedScheme {
            scheme: scheme.to_string(),
        });
    }

    if config.tracking.progress_interval.is_zero() {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "progress_interval",
        });
    }
    if config.tracking.unload_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "unload_timeout",
        });
    }
    if config.tracking.beacon_queue == 0 {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "beacon_queue",
        });
    }

    if config.auth.token.is_none() {
        warnings.push_with_hint(
            "No API token configured; the tracking backend will likely reject requests",
            "Set CLASSWATCH_API_TOKEN or auth.token_file",
        );
    }

    if scheme == "http" && !config.server.is_local() {
        warnings.push_with_hint(
            "Server URL uses plain HTTP for a non-local host",
            "Bearer tokens are sent with every request; prefer https",
        );
    }

    if config.tracking.progress_interval < MIN_SENSIBLE_PROGRESS_INTERVAL {
        warnings.push(format!(
            "tracking.progress_interval of {:?} will put heavy load on the backend",
            config.tracking.progress_interval
        ));
    }

    if !config.tracking.enabled {
        warnings.push("Watch tracking is disabled; playback runs untracked");
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AuthConfig, ConfigMetadata, ServerConfig, TrackingConfig,
    };
    use url::Url;

    fn config(url: &str) -> Config {
        Config {
            server: ServerConfig {
                url: Url::parse(url).unwrap(),
                api_prefix: "/api".into(),
                request_timeout: Duration::from_secs(30),
            },
            auth: AuthConfig {
                token: Some("token".into()),
            },
            tracking: TrackingConfig::default(),
            metadata: ConfigMetadata::default(),
        }
    }

    #[test]
    fn defaults_pass_without_warnings() {
        let warnings = apply_guard_rails(&config("http://localhost:5000")).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings.items);
    }

    #[test]
    fn rejects_zero_interval() {
        let mut cfg = config("https://lms.example.edu");
        cfg.tracking.progress_interval = Duration::ZERO;
        assert!(matches!(
            apply_guard_rails(&cfg),
            Err(ConfigGuardRailError::ZeroValue {
                field: "progress_interval"
            })
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(matches!(
            apply_guard_rails(&config("ftp://lms.example.edu")),
            Err(ConfigGuardRailError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn warns_on_plain_http_and_missing_token() {
        let mut cfg = config("http://lms.example.edu");
        cfg.auth.token = None;
        let warnings = apply_guard_rails(&cfg).unwrap();
        assert_eq!(warnings.items.len(), 2);
    }
}
