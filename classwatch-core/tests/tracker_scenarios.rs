use classwatch_core::{
    DeliveryMode, InMemoryWatchApi, PlaybackPhase, PlayerControl,
    SessionStatus, TrackerEvent, TrackerSettings, TrackingContext,
    UnloadReporter, WatchTracker, api::memory::RecordedCall,
};
use classwatch_model::{
    ClassroomId, StreamItemId, VideoDescriptor, VideoId, VideoKind,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast::error::TryRecvError, time::sleep};

#[derive(Debug, Clone, PartialEq)]
enum PlayerCommand {
    Seek(f64),
    Play,
}

#[derive(Debug, Default)]
struct RecordingPlayer {
    commands: Mutex<Vec<PlayerCommand>>,
}

impl RecordingPlayer {
    fn seeks(&self) -> Vec<f64> {
        self.commands
            .lock()
            .iter()
            .filter_map(|cmd| match cmd {
                PlayerCommand::Seek(position) => Some(*position),
                PlayerCommand::Play => None,
            })
            .collect()
    }
}

impl PlayerControl for RecordingPlayer {
    fn seek_to(&self, position: f64) {
        self.commands.lock().push(PlayerCommand::Seek(position));
    }

    fn play(&self) {
        self.commands.lock().push(PlayerCommand::Play);
    }
}

fn classroom() -> ClassroomId {
    ClassroomId::parse("class-101").unwrap()
}

fn video_id() -> VideoId {
    VideoId::parse("lecture-1").unwrap()
}

fn context(duration_secs: Option<u64>) -> TrackingContext {
    TrackingContext {
        classroom_id: classroom(),
        stream_item_id: StreamItemId::parse("post-7").unwrap(),
        video: VideoDescriptor {
            id: video_id(),
            title: "Lecture 1".into(),
            url: Some("https://cdn.example.edu/lecture-1.mp4".into()),
            duration_secs,
            kind: VideoKind::Video,
        },
    }
}

struct Harness {
    api: InMemoryWatchApi,
    player: Arc<RecordingPlayer>,
    tracker: WatchTracker,
}

fn harness(api: InMemoryWatchApi, duration_secs: Option<u64>) -> Harness {
    let player = Arc::new(RecordingPlayer::default());
    let tracker = WatchTracker::builder(Arc::new(api.clone()), player.clone())
        .context(context(duration_secs))
        .build();
    Harness {
        api,
        player,
        tracker,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test(start_paused = true)]
async fn resume_then_play_to_completion() {
    let api = InMemoryWatchApi::new()
        .with_resume_position(&classroom(), &video_id(), 120.0);
    let Harness {
        api,
        player,
        tracker,
    } = harness(api, None);
    let mut events = tracker.subscribe();

    assert!(tracker.mount().await);
    tracker.on_duration(600.0);
    sleep(Duration::from_millis(600)).await;

    assert_eq!(player.seeks(), vec![120.0]);
    assert!(matches!(
        events.try_recv(),
        Ok(TrackerEvent::SessionStarted { .. })
    ));
    assert_eq!(
        events.try_recv(),
        Ok(TrackerEvent::Resumed { position: 120.0 })
    );
    assert_close(tracker.played(), 0.2);

    tracker.on_play();
    sleep(Duration::from_secs(40)).await;
    tracker.on_progress(0.95);
    tracker.on_ended().await;

    let calls = api.calls();
    let finals: Vec<_> = api
        .updates()
        .into_iter()
        .filter(|(_, req)| req.current_position == 600.0)
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(api.ends().len(), 1);
    assert_eq!(api.ends()[0].1.end_position, 600.0);

    let tail = &calls[calls.len() - 2..];
    assert!(matches!(
        &tail[0],
        RecordedCall::Update { request, .. } if request.current_position == 600.0
    ));
    assert!(matches!(&tail[1], RecordedCall::End { .. }));
    assert_eq!(tracker.phase(), PlaybackPhase::Completed);
    assert_eq!(tracker.session_status(), SessionStatus::NoSession);

    // Periodic reports ran at 15s and 30s while playing.
    assert_eq!(api.updates().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn pause_reports_position_and_elapsed() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), None);
    tracker.mount().await;
    tracker.on_duration(600.0);
    tracker.on_play();

    sleep(Duration::from_secs(10)).await;
    tracker.on_progress(45.0 / 600.0);
    tracker.on_pause().expect("was playing").await.unwrap();

    let updates = api.updates();
    assert_eq!(updates.len(), 1);
    let (watch_id, request) = &updates[0];
    assert_eq!(watch_id.as_str(), "watch-1");
    assert_close(request.current_position, 45.0);
    assert_close(request.session_watched_seconds, 10.0);
    assert_eq!(tracker.phase(), PlaybackPhase::Paused);
}

#[tokio::test(start_paused = true)]
async fn unload_after_pause_sends_one_beacon() {
    let api = InMemoryWatchApi::new();
    let player = Arc::new(RecordingPlayer::default());
    let reporter = Arc::new(UnloadReporter::spawn(
        Arc::new(api.clone()),
        4,
        Duration::from_secs(2),
    ));
    let tracker = WatchTracker::builder(Arc::new(api.clone()), player)
        .context(context(Some(400)))
        .unload_reporter(Arc::clone(&reporter))
        .build();

    tracker.mount().await;
    tracker.on_play();
    sleep(Duration::from_secs(20)).await;
    tracker.on_progress(0.2);
    tracker.on_pause().unwrap().await.unwrap();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(tracker.report_unload(), Some(DeliveryMode::Beacon));
    tracker.unmount().await;
    reporter.drain(Duration::from_secs(1)).await;

    let beacons = api.beacons();
    assert_eq!(beacons.len(), 1);
    assert_close(beacons[0].1.end_position, 80.0);
    assert!(api.ends().is_empty());
}

#[tokio::test(start_paused = true)]
async fn updates_never_exceed_duration() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(90));
    tracker.mount().await;
    tracker.on_play();

    for played in [0.3, 1.7, 0.99] {
        tracker.on_progress(played);
        sleep(Duration::from_secs(15)).await;
    }
    tracker.on_seek_start();
    tracker.on_seek_release(4.0).await.unwrap();
    tracker.on_ended().await;

    let updates = api.updates();
    assert!(!updates.is_empty());
    for (_, request) in &updates {
        assert!(request.current_position <= 90.0);
        assert!(request.session_watched_seconds <= request.current_position);
    }
    assert!(api.ends().iter().all(|(_, req)| req.end_position <= 90.0));
}

#[tokio::test(start_paused = true)]
async fn end_runs_once_across_unmount_and_repeats() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(300));
    tracker.mount().await;
    tracker.on_play();
    tracker.on_progress(0.1);

    let (a, b) = tokio::join!(tracker.end_session(), tracker.end_session());
    assert!(a ^ b, "exactly one end call wins");
    assert!(!tracker.unmount().await);
    assert!(!tracker.end_session().await);

    assert_eq!(api.ends().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_end_can_be_retried() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(300));
    tracker.mount().await;
    api.fail_next_ends(1);

    assert!(!tracker.end_session().await);
    assert!(matches!(tracker.session_status(), SessionStatus::Active(_)));
    assert!(tracker.unmount().await);

    assert_eq!(api.ends().len(), 2);
    assert_eq!(tracker.session_status(), SessionStatus::NoSession);
}

#[tokio::test(start_paused = true)]
async fn abandoned_end_is_retried_on_unmount() {
    let api = InMemoryWatchApi::new().with_end_latency(Duration::from_secs(10));
    let Harness { api, tracker, .. } = harness(api, Some(300));
    tracker.mount().await;
    tracker.on_progress(0.5);

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), tracker.end_session()).await;
    assert!(abandoned.is_err());
    assert!(matches!(tracker.session_status(), SessionStatus::Active(_)));

    assert!(tracker.unmount().await);
    assert_eq!(tracker.session_status(), SessionStatus::NoSession);
    let ends = api.ends();
    assert_eq!(ends.len(), 1);
    assert_close(ends[0].1.end_position, 150.0);
}

#[tokio::test(start_paused = true)]
async fn unload_after_abandoned_end_still_closes_session() {
    let api = InMemoryWatchApi::new().with_end_latency(Duration::from_secs(10));
    let player = Arc::new(RecordingPlayer::default());
    let reporter = Arc::new(UnloadReporter::spawn(
        Arc::new(api.clone()),
        4,
        Duration::from_secs(2),
    ));
    let tracker = WatchTracker::builder(Arc::new(api.clone()), player)
        .context(context(Some(300)))
        .unload_reporter(Arc::clone(&reporter))
        .build();
    tracker.mount().await;
    tracker.on_progress(0.5);

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), tracker.end_session()).await;
    assert!(abandoned.is_err());

    assert_eq!(tracker.report_unload(), Some(DeliveryMode::Beacon));
    assert!(!tracker.unmount().await, "unload already closed the session");
    reporter.drain(Duration::from_secs(1)).await;

    let beacons = api.beacons();
    assert_eq!(beacons.len(), 1);
    assert_eq!(beacons[0].0.as_str(), "watch-1");
    assert_close(beacons[0].1.end_position, 150.0);
    assert!(api.ends().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ticker_stops_once_session_ends() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(300));
    tracker.mount().await;
    tracker.on_play();
    sleep(Duration::from_secs(16)).await;
    assert_eq!(api.updates().len(), 1);

    assert!(tracker.end_session().await);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(api.updates().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn paused_player_sends_no_periodic_updates() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(300));
    tracker.mount().await;
    tracker.on_play();
    tracker.on_pause().unwrap().await.unwrap();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(api.updates().len(), 1, "only the pause report");

    tracker.on_play();
    sleep(Duration::from_secs(16)).await;
    assert_eq!(api.updates().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn replay_mid_session_ends_before_starting_new_one() {
    let Harness {
        api,
        player,
        tracker,
    } = harness(InMemoryWatchApi::new(), Some(300));
    tracker.mount().await;
    tracker.on_play();
    tracker.on_progress(0.5);
    let first = tracker.session_status().watch_id().cloned().unwrap();

    tracker.replay().await;
    sleep(Duration::from_secs(1)).await;

    let second = tracker.session_status().watch_id().cloned().unwrap();
    assert_ne!(first, second);

    let calls = api.calls();
    let end_at = calls
        .iter()
        .position(|c| matches!(c, RecordedCall::End { watch_id, .. } if *watch_id == first))
        .expect("first session ended");
    let second_start = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, RecordedCall::Start(_)))
        .map(|(i, _)| i)
        .nth(1)
        .expect("second start");
    assert!(end_at < second_start);
    assert_eq!(api.resets().len(), 1);
    assert!(player.seeks().iter().all(|position| *position == 0.0));
    assert_eq!(tracker.phase(), PlaybackPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn view_counted_fires_once_per_session() {
    let api = InMemoryWatchApi::new().count_every_update();
    let Harness { tracker, .. } = harness(api, Some(300));
    let mut events = tracker.subscribe();
    tracker.mount().await;
    tracker.on_play();
    tracker.on_progress(0.2);

    tracker.on_pause().unwrap().await.unwrap();
    tracker.on_play();
    tracker.on_pause().unwrap().await.unwrap();
    assert!(tracker.view_counted());

    let mut counted = 0;
    loop {
        match events.try_recv() {
            Ok(TrackerEvent::ViewCounted { .. }) => counted += 1,
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(err) => panic!("unexpected receive error: {err}"),
        }
    }
    assert_eq!(counted, 1);
    assert_eq!(tracker.view_count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn seek_reports_after_settle_and_skips_while_dragging() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(200));
    tracker.mount().await;

    tracker.on_seek_start();
    tracker.on_progress(0.9);
    assert_eq!(tracker.played(), 0.0, "progress ignored while seeking");

    let superseded = tracker.on_seek_release(0.25);
    let latest = tracker.on_seek_release(0.5);
    superseded.await.unwrap();
    latest.await.unwrap();

    let updates = api.updates();
    assert_eq!(updates.len(), 1);
    assert_close(updates[0].1.current_position, 100.0);
}

#[tokio::test(start_paused = true)]
async fn no_updates_before_duration_is_known() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), None);
    tracker.mount().await;
    tracker.on_play();
    sleep(Duration::from_secs(31)).await;
    assert!(api.updates().is_empty());

    tracker.unmount().await;
    let ends = api.ends();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].1.end_position, 0.0);
}

#[tokio::test(start_paused = true)]
async fn start_failure_leaves_playback_untracked() {
    let api = InMemoryWatchApi::new();
    api.fail_start(true);
    let Harness { api, tracker, .. } = harness(api, Some(120));

    assert!(!tracker.mount().await);
    tracker.on_play();
    sleep(Duration::from_secs(20)).await;
    tracker.on_ended().await;

    assert_eq!(tracker.session_status(), SessionStatus::NoSession);
    assert_eq!(tracker.phase(), PlaybackPhase::Completed);
    assert!(api.updates().is_empty());
    assert!(api.ends().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_refused_while_session_open() {
    let Harness { api, tracker, .. } = harness(InMemoryWatchApi::new(), Some(120));
    assert!(tracker.mount().await);
    assert!(!tracker.start_session(false).await);
    assert_eq!(api.starts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_tracking_never_calls_backend() {
    let api = InMemoryWatchApi::new();
    let tracker = WatchTracker::builder(
        Arc::new(api.clone()),
        Arc::new(RecordingPlayer::default()),
    )
    .settings(TrackerSettings {
        enabled: false,
        ..Default::default()
    })
    .context(context(Some(60)))
    .build();

    assert!(!tracker.is_tracking());
    assert!(!tracker.mount().await);
    tracker.on_play();
    tracker.on_ended().await;
    tracker.unmount().await;
    assert!(api.calls().is_empty());
}
