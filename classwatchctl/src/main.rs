//! `classwatchctl`: run simulated playback against the watch-tracking
//! backend, look up view counts and check configuration.

mod cli;
mod player;
mod setup;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use classwatch_config::Config;
use classwatch_contracts::prelude::EndWatchingRequest;
use classwatch_core::WatchApi;
use classwatch_model::{ClassroomId, VideoId, WatchId};
use tracing::info;

use cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup::init_tracing(cli.verbose);

    let load = setup::load_config(cli.config, cli.env_file)?;
    let config = load.config;

    match cli.command {
        Command::Watch(args) => watch::run(&config, args).await,
        Command::Views {
            classroom,
            video_id,
        } => show_views(&config, &classroom, &video_id).await,
        Command::End {
            watch_id,
            position,
            watched,
        } => end_session(&config, &watch_id, position, watched).await,
        Command::Config(ConfigCommand::Check) => {
            print_config(&config, load.warnings.items.len());
            Ok(())
        }
    }
}

async fn show_views(config: &Config, classroom: &str, video_id: &str) -> Result<()> {
    let client = setup::api_client(config).await?;
    let count = client
        .view_count(
            &ClassroomId::parse(classroom).context("invalid --classroom")?,
            &VideoId::parse(video_id).context("invalid --video-id")?,
        )
        .await
        .context("failed to fetch view count")?;
    println!("{count}");
    Ok(())
}

async fn end_session(
    config: &Config,
    watch_id: &str,
    position: f64,
    watched: f64,
) -> Result<()> {
    anyhow::ensure!(
        position >= 0.0 && watched >= 0.0,
        "--position and --watched must not be negative"
    );
    let watch_id = WatchId::parse(watch_id).context("invalid watch id")?;
    let client = setup::api_client(config).await?;
    client
        .end_watching(
            &watch_id,
            &EndWatchingRequest {
                end_position: position,
                session_watched_seconds: watched.min(position),
            },
        )
        .await
        .context("failed to end watch session")?;
    info!(watch_id = %watch_id, "watch session closed");
    println!("Ended {watch_id}");
    Ok(())
}

fn print_config(config: &Config, warnings: usize) {
    let tracking = &config.tracking;
    match &config.metadata.config_path {
        Some(path) => println!("config file:        {}", path.display()),
        None => println!("config file:        (none)"),
    }
    println!("api base:           {}", config.server.api_base());
    println!(
        "request timeout:    {}",
        humantime::format_duration(config.server.request_timeout)
    );
    println!(
        "token:              {}",
        if config.auth.token.is_some() { "set" } else { "missing" }
    );
    println!("tracking enabled:   {}", tracking.enabled);
    println!(
        "progress interval:  {}",
        humantime::format_duration(tracking.progress_interval)
    );
    println!(
        "seek settle:        {}",
        humantime::format_duration(tracking.seek_settle)
    );
    println!(
        "resume delay:       {}",
        humantime::format_duration(tracking.resume_delay)
    );
    println!(
        "unload timeout:     {}",
        humantime::format_duration(tracking.unload_timeout)
    );
    println!("beacon queue:       {}", tracking.beacon_queue);
    println!("warnings:           {warnings}");
}
