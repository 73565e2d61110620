use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub tracking: FileTrackingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileTrackingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_settle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unload_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon_queue: Option<usize>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub api_prefix: Option<String>,
    pub request_timeout: Option<String>,
    pub api_token: Option<String>,
    pub api_token_file: Option<PathBuf>,
    pub tracking_enabled: Option<bool>,
    pub progress_interval: Option<String>,
    pub seek_settle: Option<String>,
    pub resume_delay: Option<String>,
    pub unload_timeout: Option<String>,
    pub beacon_queue: Option<usize>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            config_path: non_empty("CLASSWATCH_CONFIG").map(PathBuf::from),
            server_url: non_empty("CLASSWATCH_SERVER_URL"),
            api_prefix: non_empty("CLASSWATCH_API_PREFIX"),
            request_timeout: non_empty("CLASSWATCH_REQUEST_TIMEOUT"),
            api_token: non_empty("CLASSWATCH_API_TOKEN"),
            api_token_file: non_empty("CLASSWATCH_API_TOKEN_FILE")
                .map(PathBuf::from),
            tracking_enabled: non_empty("CLASSWATCH_TRACKING_ENABLED")
                .and_then(|raw| parse_bool(&raw)),
            progress_interval: non_empty("CLASSWATCH_PROGRESS_INTERVAL"),
            seek_settle: non_empty("CLASSWATCH_SEEK_SETTLE"),
            resume_delay: non_empty("CLASSWATCH_RESUME_DELAY"),
            unload_timeout: non_empty("CLASSWATCH_UNLOAD_TIMEOUT"),
            beacon_queue: non_empty("CLASSWATCH_BEACON_QUEUE")
                .and_then(|raw| raw.trim().parse().ok()),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_parses_typed_values() {
        let vars: HashMap<&str, &str> = [
            ("CLASSWATCH_SERVER_URL", "https://lms.example.edu"),
            ("CLASSWATCH_TRACKING_ENABLED", "off"),
            ("CLASSWATCH_BEACON_QUEUE", "4"),
            ("CLASSWATCH_API_TOKEN", "  "),
        ]
        .into_iter()
        .collect();

        let env = EnvConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.server_url.as_deref(), Some("https://lms.example.edu"));
        assert_eq!(env.tracking_enabled, Some(false));
        assert_eq!(env.beacon_queue, Some(4));
        assert!(env.api_token.is_none(), "blank values are ignored");
    }
}
