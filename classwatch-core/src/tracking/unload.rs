//! Final reports sent while the host is shutting down.
//!
//! Shutdown cannot wait on an ordinary request, so the closing report is
//! queued to a dispatcher task that posts it with a short timeout. When the
//! queue is full or gone the report goes out as a standalone keep-alive
//! request instead.

use classwatch_contracts::prelude::EndWatchingRequest;
use classwatch_model::WatchId;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{session::SessionState, tracker::WatchTracker};
use crate::api::{BeaconTransport, DeliveryMode};

/// Closing report for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconPayload {
    /// Session being closed
    pub watch_id: WatchId,
    pub body: EndWatchingRequest,
}

/// Delivers closing reports without making shutdown wait on the backend.
pub struct UnloadReporter {
    queue: Mutex<Option<mpsc::Sender<BeaconPayload>>>,
    transport: Arc<dyn BeaconTransport>,
    timeout: Duration,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    keepalives: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for UnloadReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnloadReporter")
            .field("transport", &self.transport)
            .field("timeout", &self.timeout)
            .field("open", &self.queue.lock().is_some())
            .finish()
    }
}

impl UnloadReporter {
    /// Start the dispatcher. Must be called inside a Tokio runtime.
    pub fn spawn(
        transport: Arc<dyn BeaconTransport>,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatcher =
            tokio::spawn(dispatch(rx, Arc::clone(&transport), timeout));
        Self {
            queue: Mutex::new(Some(tx)),
            transport,
            timeout,
            dispatcher: Mutex::new(Some(dispatcher)),
            keepalives: Mutex::new(Vec::new()),
        }
    }

    /// Hand off a report without waiting for it to be delivered.
    pub fn send(&self, payload: BeaconPayload) -> DeliveryMode {
        let rejected = match self.queue.lock().as_ref() {
            Some(queue) => match queue.try_send(payload) {
                Ok(()) => return DeliveryMode::Beacon,
                Err(TrySendError::Full(payload))
                | Err(TrySendError::Closed(payload)) => payload,
            },
            None => payload,
        };

        debug!(watch_id = %rejected.watch_id, "beacon queue unavailable; using keep-alive request");
        self.send_keepalive(rejected);
        DeliveryMode::KeepAlive
    }

    fn send_keepalive(&self, payload: BeaconPayload) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                watch_id = %payload.watch_id,
                "no runtime available; final progress report dropped"
            );
            return;
        };
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;
        let handle = runtime.spawn(async move {
            deliver(transport.as_ref(), payload, DeliveryMode::KeepAlive, timeout)
                .await;
        });

        let mut keepalives = self.keepalives.lock();
        keepalives.retain(|task| !task.is_finished());
        keepalives.push(handle);
    }

    /// Stop accepting reports and wait up to `grace` for queued and in-flight
    /// ones to finish. Later reports fall back to keep-alive requests.
    pub async fn drain(&self, grace: Duration) {
        drop(self.queue.lock().take());
        let dispatcher = self.dispatcher.lock().take();
        let keepalives = std::mem::take(&mut *self.keepalives.lock());

        let pending = async {
            if let Some(dispatcher) = dispatcher {
                let _ = dispatcher.await;
            }
            for task in keepalives {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(grace, pending).await.is_err() {
            warn!(?grace, "unload reports still in flight after grace period");
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<BeaconPayload>,
    transport: Arc<dyn BeaconTransport>,
    timeout: Duration,
) {
    while let Some(payload) = rx.recv().await {
        deliver(transport.as_ref(), payload, DeliveryMode::Beacon, timeout).await;
    }
}

async fn deliver(
    transport: &dyn BeaconTransport,
    payload: BeaconPayload,
    mode: DeliveryMode,
    timeout: Duration,
) {
    let result = tokio::time::timeout(
        timeout,
        transport.deliver_end(&payload.watch_id, &payload.body, mode),
    )
    .await;
    match result {
        Ok(Ok(())) => debug!(
            watch_id = %payload.watch_id,
            mode = mode.as_str(),
            "unload report delivered"
        ),
        Ok(Err(err)) => warn!(
            error = %err,
            watch_id = %payload.watch_id,
            mode = mode.as_str(),
            "unload report failed"
        ),
        Err(_) => warn!(
            watch_id = %payload.watch_id,
            mode = mode.as_str(),
            ?timeout,
            "unload report timed out"
        ),
    }
}

impl WatchTracker {
    /// Send the closing report for the open session through the unload
    /// reporter, without waiting.
    ///
    /// A session whose end call is still in flight is reported too, since
    /// that call is likely to be cut off by the shutdown. The session is
    /// considered closed locally afterwards, so a later unmount does not end
    /// it a second time.
    pub fn report_unload(&self) -> Option<DeliveryMode> {
        let inner = &self.inner;
        let Some(reporter) = inner.unload.as_ref() else {
            debug!("no unload reporter attached");
            return None;
        };

        let payload = {
            let mut state = inner.state.lock();
            let session = state.session.current()?.clone();
            let sample = state.closing_sample(session.elapsed());
            state.session = SessionState::NoSession;
            BeaconPayload {
                watch_id: session.watch_id,
                body: EndWatchingRequest {
                    end_position: sample.position,
                    session_watched_seconds: sample.watched,
                },
            }
        };
        inner.sync_ticker();

        let watch_id = payload.watch_id.clone();
        let mode = reporter.send(payload);
        info!(watch_id = %watch_id, mode = mode.as_str(), "unload report sent");
        Some(mode)
    }

    /// Send the unload report when `signal` completes.
    ///
    /// Only one hook is kept per mount; later registrations return false.
    /// The hook is dropped on unmount.
    pub fn register_unload_hook<F>(&self, signal: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if !state.mounted || state.unload_hook_registered {
                return false;
            }
            state.unload_hook_registered = true;
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            signal.await;
            if let Some(inner) = weak.upgrade() {
                WatchTracker { inner }.report_unload();
            }
        });
        self.inner.track_background(handle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::memory::InMemoryWatchApi,
        tracking::{SessionStatus, TrackingContext, events::MockPlayerControl},
    };
    use classwatch_model::{
        ClassroomId, StreamItemId, VideoDescriptor, VideoId, VideoKind,
    };
    use tokio::sync::oneshot;

    fn payload(id: &str) -> BeaconPayload {
        BeaconPayload {
            watch_id: WatchId::parse(id).unwrap(),
            body: EndWatchingRequest {
                end_position: 10.0,
                session_watched_seconds: 5.0,
            },
        }
    }

    fn tracker(api: &InMemoryWatchApi, reporter: Arc<UnloadReporter>) -> WatchTracker {
        let mut player = MockPlayerControl::new();
        player.expect_seek_to().return_const(());
        player.expect_play().return_const(());
        WatchTracker::builder(Arc::new(api.clone()), Arc::new(player))
            .context(TrackingContext {
                classroom_id: ClassroomId::parse("c1").unwrap(),
                stream_item_id: StreamItemId::parse("s1").unwrap(),
                video: VideoDescriptor {
                    id: VideoId::parse("v1").unwrap(),
                    title: "Intro".into(),
                    url: None,
                    duration_secs: Some(200),
                    kind: VideoKind::Video,
                },
            })
            .unload_reporter(reporter)
            .build()
    }

    #[tokio::test]
    async fn queued_reports_are_delivered_on_drain() {
        let api = InMemoryWatchApi::new();
        let reporter =
            UnloadReporter::spawn(Arc::new(api.clone()), 4, Duration::from_secs(1));

        assert_eq!(reporter.send(payload("w1")), DeliveryMode::Beacon);
        reporter.drain(Duration::from_secs(1)).await;

        let beacons = api.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].0.as_str(), "w1");
        assert_eq!(beacons[0].2, DeliveryMode::Beacon);
    }

    #[tokio::test]
    async fn closed_queue_falls_back_to_keepalive() {
        let api = InMemoryWatchApi::new();
        let reporter =
            UnloadReporter::spawn(Arc::new(api.clone()), 1, Duration::from_secs(1));
        reporter.drain(Duration::from_secs(1)).await;

        assert_eq!(reporter.send(payload("w2")), DeliveryMode::KeepAlive);
        reporter.drain(Duration::from_secs(1)).await;

        let beacons = api.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].2, DeliveryMode::KeepAlive);
    }

    #[tokio::test(start_paused = true)]
    async fn unload_closes_session_once() {
        let api = InMemoryWatchApi::new();
        let reporter = Arc::new(UnloadReporter::spawn(
            Arc::new(api.clone()),
            4,
            Duration::from_secs(2),
        ));
        let tracker = tracker(&api, Arc::clone(&reporter));
        tracker.mount().await;
        tracker.on_play();
        tokio::time::sleep(Duration::from_secs(4)).await;
        tracker.on_progress(0.25);

        assert_eq!(tracker.report_unload(), Some(DeliveryMode::Beacon));
        assert_eq!(tracker.session_status(), SessionStatus::NoSession);
        assert_eq!(tracker.report_unload(), None);

        assert!(!tracker.unmount().await, "nothing left to end");
        reporter.drain(Duration::from_secs(1)).await;

        assert!(api.ends().is_empty());
        let beacons = api.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].1.end_position, 50.0);
        assert_eq!(beacons[0].1.session_watched_seconds, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn hook_fires_on_signal_and_registers_once() {
        let api = InMemoryWatchApi::new();
        let reporter = Arc::new(UnloadReporter::spawn(
            Arc::new(api.clone()),
            4,
            Duration::from_secs(2),
        ));
        let tracker = tracker(&api, Arc::clone(&reporter));
        assert!(!tracker.register_unload_hook(async {}), "requires mount");

        tracker.mount().await;
        let (tx, rx) = oneshot::channel::<()>();
        assert!(tracker.register_unload_hook(async move {
            let _ = rx.await;
        }));
        assert!(!tracker.register_unload_hook(async {}));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tracker.session_status(), SessionStatus::NoSession);

        reporter.drain(Duration::from_secs(1)).await;
        assert_eq!(api.beacons().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unload_reports_session_whose_end_is_in_flight() {
        let api = InMemoryWatchApi::new().with_end_latency(Duration::from_secs(10));
        let reporter = Arc::new(UnloadReporter::spawn(
            Arc::new(api.clone()),
            4,
            Duration::from_secs(2),
        ));
        let tracker = tracker(&api, Arc::clone(&reporter));
        tracker.mount().await;
        tracker.on_progress(0.5);

        let ending = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.end_session().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(tracker.session_status(), SessionStatus::Ending(_)));

        assert_eq!(tracker.report_unload(), Some(DeliveryMode::Beacon));
        assert_eq!(tracker.session_status(), SessionStatus::NoSession);
        reporter.drain(Duration::from_secs(1)).await;

        let beacons = api.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].0.as_str(), "watch-1");
        assert_eq!(beacons[0].1.end_position, 100.0);

        assert!(ending.await.unwrap(), "late answer still counts as ended");
        assert_eq!(tracker.session_status(), SessionStatus::NoSession);
    }
}
