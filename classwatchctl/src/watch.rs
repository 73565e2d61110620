use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use classwatch_config::Config;
use classwatch_core::{
    BeaconTransport, InMemoryWatchApi, PlayerControl, TrackerEvent,
    TrackingContext, UnloadReporter, WatchApi, WatchTracker,
};
use classwatch_model::{
    ClassroomId, DurationInput, StreamItemId, VideoDescriptor, VideoSource,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::{cli::WatchArgs, player::SimulatedPlayer, setup};

const FRAME: Duration = Duration::from_millis(250);
const PRINTER_GRACE: Duration = Duration::from_secs(1);

struct PlaybackScript {
    speed: f64,
    pause_at: Option<f64>,
    pause_for: Duration,
}

pub fn tracking_context(args: &WatchArgs) -> Result<TrackingContext> {
    let source = VideoSource {
        id: args.video_id.clone(),
        title: args.title.clone(),
        url: args.url.clone(),
        embed_url: args.embed_url.clone(),
        duration: args.duration.as_deref().map(DurationInput::from),
        kind: args.kind.map(Into::into),
    };
    let video =
        VideoDescriptor::resolve(&source).context("could not identify the video")?;

    Ok(TrackingContext {
        classroom_id: ClassroomId::parse(args.classroom.as_str())
            .context("invalid --classroom")?,
        stream_item_id: StreamItemId::parse(args.stream_item.as_str())
            .context("invalid --stream-item")?,
        video,
    })
}

pub async fn run(config: &Config, args: WatchArgs) -> Result<()> {
    ensure!(
        args.speed.is_finite() && args.speed > 0.0,
        "--speed must be a positive number"
    );
    let context = tracking_context(&args)?;
    let duration = context
        .video
        .duration_secs
        .filter(|secs| *secs > 0)
        .context("a duration is needed to simulate playback; pass --duration")?
        as f64;

    let (api, transport): (Arc<dyn WatchApi>, Arc<dyn BeaconTransport>) =
        if args.offline {
            let memory = Arc::new(InMemoryWatchApi::new());
            (
                memory.clone() as Arc<dyn WatchApi>,
                memory as Arc<dyn BeaconTransport>,
            )
        } else {
            let client = setup::api_client(config).await?;
            (
                client.clone() as Arc<dyn WatchApi>,
                client as Arc<dyn BeaconTransport>,
            )
        };

    let reporter = Arc::new(UnloadReporter::spawn(
        transport,
        config.tracking.beacon_queue,
        config.tracking.unload_timeout,
    ));
    let player = Arc::new(SimulatedPlayer::new(duration));
    let tracker = WatchTracker::builder(api, player.clone())
        .settings(setup::tracker_settings(&config.tracking))
        .context(context)
        .unload_reporter(Arc::clone(&reporter))
        .build();
    let printer = tokio::spawn(print_events(tracker.subscribe()));

    println!(
        "Playing \"{}\" ({})",
        tracker.context().map(|c| c.video.title.as_str()).unwrap_or("video"),
        clock(duration)
    );
    if !tracker.mount().await && tracker.is_tracking() {
        println!("Tracking unavailable; playing untracked");
    }
    tracker.on_duration(duration);
    tracker.register_unload_hook(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    let script = PlaybackScript {
        speed: args.speed,
        pause_at: args.pause_at,
        pause_for: args.pause_for,
    };
    let interrupted = tokio::select! {
        _ = play_session(&tracker, &player, &script, args.replay) => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        tracker.report_unload();
        println!("Interrupted at {}", clock(player.position()));
    } else if tracker.is_tracking() {
        match tracker.view_count().await {
            Ok(count) => println!("Views recorded for this video: {count}"),
            Err(err) => warn!(error = %err, "failed to fetch view count"),
        }
    }

    tracker.unmount().await;
    reporter.drain(config.tracking.unload_timeout).await;
    drop(tracker);
    if tokio::time::timeout(PRINTER_GRACE, printer).await.is_err() {
        debug!("event printer still running at exit");
    }
    Ok(())
}

async fn play_session(
    tracker: &WatchTracker,
    player: &SimulatedPlayer,
    script: &PlaybackScript,
    replay: bool,
) {
    play_through(tracker, player, script).await;
    if replay {
        println!("Replaying from the start");
        tracker.replay().await;
        play_through(tracker, player, script).await;
    }
}

async fn play_through(
    tracker: &WatchTracker,
    player: &SimulatedPlayer,
    script: &PlaybackScript,
) {
    let mut pause_at = script.pause_at;
    player.play();
    tracker.on_play();

    let mut frames = tokio::time::interval(FRAME);
    loop {
        frames.tick().await;
        let position = player.advance(FRAME.as_secs_f64() * script.speed);
        tracker.on_progress(player.played());

        if let Some(at) = pause_at
            && position >= at
            && position < player.duration()
        {
            pause_at = None;
            player.pause();
            if let Some(report) = tracker.on_pause() {
                let _ = report.await;
            }
            println!("Paused at {}", clock(position));
            tokio::time::sleep(script.pause_for).await;
            player.play();
            tracker.on_play();
        }

        if position >= player.duration() {
            break;
        }
    }
    tracker.on_ended().await;
}

async fn print_events(mut events: broadcast::Receiver<TrackerEvent>) {
    loop {
        match events.recv().await {
            Ok(TrackerEvent::SessionStarted { watch_id }) => {
                println!("Watch session {watch_id} started")
            }
            Ok(TrackerEvent::Resumed { position }) => {
                println!("Resumed at {}", clock(position))
            }
            Ok(TrackerEvent::ViewCounted { .. }) => println!("View counted"),
            Ok(TrackerEvent::Completed) => println!("Completed"),
            Ok(TrackerEvent::SessionEnded { watch_id }) => {
                println!("Watch session {watch_id} ended")
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "event printer fell behind")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
