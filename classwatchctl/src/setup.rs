use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use classwatch_config::{
    Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions, TrackingConfig,
};
use classwatch_core::{TrackerSettings, WatchApiClient};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,classwatch_core=info,classwatchctl=info";
const VERBOSE_FILTER: &str = "info,classwatch_core=debug,classwatchctl=debug";

pub fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }.into(),
            ),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn load_config(
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
) -> Result<ConfigLoad> {
    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path,
        env_file,
        env_override: None,
    })
    .load()
    .context("failed to load configuration")?;

    if load.config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    Ok(load)
}

pub fn tracker_settings(tracking: &TrackingConfig) -> TrackerSettings {
    TrackerSettings {
        enabled: tracking.enabled,
        progress_interval: tracking.progress_interval,
        seek_settle: tracking.seek_settle,
        resume_delay: tracking.resume_delay,
    }
}

/// HTTP client for the configured server, carrying the configured token.
pub async fn api_client(config: &Config) -> Result<Arc<WatchApiClient>> {
    let client = WatchApiClient::new(
        config.server.api_base(),
        config.server.request_timeout,
    )
    .context("failed to build HTTP client")?
    .with_beacon_timeout(config.tracking.unload_timeout);
    client.set_token(config.auth.token.clone()).await;
    Ok(Arc::new(client))
}
