pub mod error;

use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;
use url::Url;

use super::{
    models::{
        AuthConfig, Config, ConfigMetadata, DEFAULT_API_PREFIX,
        DEFAULT_BEACON_QUEUE, DEFAULT_PROGRESS_INTERVAL,
        DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESUME_DELAY, DEFAULT_SEEK_SETTLE,
        DEFAULT_SERVER_URL, DEFAULT_UNLOAD_TIMEOUT, ServerConfig,
        TrackingConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigWarnings},
};
pub use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("classwatch.toml"),
        PathBuf::from("config/classwatch.toml"),
    ]
});

/// Result of a successful load: the config plus non-fatal findings.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use these values instead of reading the process environment.
    pub env_override: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env_override = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = match &self.options.env_override {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let config = compose_config(
            file_config,
            env_config,
            ConfigMetadata {
                config_path: config_path.clone(),
                env_file_loaded,
            },
        )?;

        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No classwatch.toml detected; using defaults and environment variables",
                "Pass --config or set CLASSWATCH_CONFIG to point at a config file",
            );
        }
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match result {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (&self.options.config_path, &env_config.config_path)
        {
            (Some(path), _) => (Some(path.clone()), true),
            (None, Some(path)) => (Some(path.clone()), true),
            (None, None) => (
                DEFAULT_CONFIG_LOCATIONS
                    .iter()
                    .find(|candidate| candidate.exists())
                    .cloned(),
                false,
            ),
        };

        let Some(path) = path else {
            return Ok((None, None));
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        debug!(path = %path.display(), "loading config file");
        let contents = fs::read_to_string(&path).map_err(|source| {
            ConfigLoadError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        auth: file_auth,
        tracking: file_tracking,
    } = file_config.unwrap_or_default();

    let raw_url = env
        .server_url
        .clone()
        .or(file_server.url)
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
    let url = Url::parse(&raw_url).map_err(|source| {
        ConfigLoadError::InvalidServerUrl {
            value: raw_url.clone(),
            source,
        }
    })?;

    let server = ServerConfig {
        url,
        api_prefix: env
            .api_prefix
            .clone()
            .or(file_server.api_prefix)
            .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
        request_timeout: resolve_duration(
            "server.request_timeout",
            env.request_timeout.as_deref(),
            file_server.request_timeout.as_deref(),
            DEFAULT_REQUEST_TIMEOUT,
        )?,
    };

    let token = match (env.api_token.clone(), env.api_token_file.clone()) {
        (Some(token), _) => Some(token),
        (None, Some(path)) => Some(read_secret(&path)?),
        (None, None) => match (file_auth.token, file_auth.token_file) {
            (Some(token), _) => Some(token),
            (None, Some(path)) => Some(read_secret(&path)?),
            (None, None) => None,
        },
    };
    let auth = AuthConfig { token };

    let tracking = TrackingConfig {
        enabled: env
            .tracking_enabled
            .or(file_tracking.enabled)
            .unwrap_or(true),
        progress_interval: resolve_duration(
            "tracking.progress_interval",
            env.progress_interval.as_deref(),
            file_tracking.progress_interval.as_deref(),
            DEFAULT_PROGRESS_INTERVAL,
        )?,
        seek_settle: resolve_duration(
            "tracking.seek_settle",
            env.seek_settle.as_deref(),
            file_tracking.seek_settle.as_deref(),
            DEFAULT_SEEK_SETTLE,
        )?,
        resume_delay: resolve_duration(
            "tracking.resume_delay",
            env.resume_delay.as_deref(),
            file_tracking.resume_delay.as_deref(),
            DEFAULT_RESUME_DELAY,
        )?,
        unload_timeout: resolve_duration(
            "tracking.unload_timeout",
            env.unload_timeout.as_deref(),
            file_tracking.unload_timeout.as_deref(),
            DEFAULT_UNLOAD_TIMEOUT,
        )?,
        beacon_queue: env
            .beacon_queue
            .or(file_tracking.beacon_queue)
            .unwrap_or(DEFAULT_BEACON_QUEUE),
    };

    Ok(Config {
        server,
        auth,
        tracking,
        metadata,
    })
}

fn resolve_duration(
    field: &'static str,
    env_value: Option<&str>,
    file_value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match env_value.or(file_value) {
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                field,
                value: raw.to_string(),
                source,
            }
        }),
        None => Ok(default),
    }
}

fn read_secret(path: &Path) -> Result<String, ConfigLoadError> {
    fs::read_to_string(path)
        .map(|contents| contents.trim().to_string())
        .map_err(|source| ConfigLoadError::SecretFileIo {
            path: path.to_path_buf(),
            source,
        })
}
