use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use classwatch_model::VideoKind;

#[derive(Parser, Debug)]
#[command(name = "classwatchctl")]
#[command(about = "Drive classroom video watch tracking from the command line")]
pub struct Cli {
    /// Path to classwatch.toml (overrides CLASSWATCH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Env file to load before reading CLASSWATCH_* variables
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate watching a video with tracking enabled
    Watch(WatchArgs),
    /// Show how many views the backend has counted for a video
    Views {
        #[arg(long)]
        classroom: String,
        #[arg(long)]
        video_id: String,
    },
    /// Close a watch session left open elsewhere
    End {
        watch_id: String,
        /// Final playhead position in seconds
        #[arg(long, default_value_t = 0.0)]
        position: f64,
        /// Seconds watched during the session
        #[arg(long, default_value_t = 0.0)]
        watched: f64,
    },
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Load configuration, print the resolved values and any warnings
    Check,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long)]
    pub classroom: String,

    #[arg(long)]
    pub stream_item: String,

    /// Explicit video id; derived from --url or --embed-url when absent
    #[arg(long)]
    pub video_id: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub embed_url: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    /// Length as seconds, MM:SS or HH:MM:SS
    #[arg(long)]
    pub duration: Option<String>,

    #[arg(long = "type", value_enum)]
    pub kind: Option<KindArg>,

    /// Use an in-process backend instead of the configured server
    #[arg(long)]
    pub offline: bool,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Pause once when the playhead reaches this many seconds
    #[arg(long)]
    pub pause_at: Option<f64>,

    /// How long to stay paused, e.g. "3s"
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2s")]
    pub pause_for: Duration,

    /// Replay once from the start after the video completes
    #[arg(long)]
    pub replay: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Video,
    Youtube,
}

impl From<KindArg> for VideoKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Video => VideoKind::Video,
            KindArg::Youtube => VideoKind::Youtube,
        }
    }
}
