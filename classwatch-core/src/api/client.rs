use async_trait::async_trait;
use classwatch_contracts::{
    prelude::{
        ApiResponse, EndWatchingRequest, ResetProgressRequest,
        StartWatchingRequest, StartWatchingResponse, UpdateProgressRequest,
        UpdateProgressResponse, ViewCountResponse, video_watch,
    },
    routes::fill,
};
use classwatch_model::{ClassroomId, VideoId, WatchId};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{BeaconTransport, DeliveryMode, WatchApi};
use crate::error::{TrackingError, TrackingResult};

const DEFAULT_BEACON_TIMEOUT: Duration = Duration::from_secs(2);

type RefreshFuture =
    Pin<Box<dyn Future<Output = TrackingResult<String>> + Send>>;

/// Callback invoked once when the backend answers 401
pub type RefreshTokenCallback =
    Arc<Mutex<Option<Box<dyn Fn() -> RefreshFuture + Send + Sync>>>>;

/// HTTP client for the watch-tracking backend
#[derive(Clone)]
pub struct WatchApiClient {
    client: Client,
    api_base: String,
    token_store: Arc<RwLock<Option<String>>>,
    refresh_callback: RefreshTokenCallback,
    beacon_timeout: Duration,
}

impl std::fmt::Debug for WatchApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchApiClient")
            .field("api_base", &self.api_base)
            .field(
                "has_token",
                &self
                    .token_store
                    .try_read()
                    .map(|t| t.is_some())
                    .unwrap_or(false),
            )
            .field("beacon_timeout", &self.beacon_timeout)
            .finish()
    }
}

impl WatchApiClient {
    /// Create a client rooted at `api_base` (origin plus API prefix).
    pub fn new(
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> TrackingResult<Self> {
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(request_timeout).build()?;

        info!(api_base = %api_base, "creating watch API client");

        Ok(Self {
            client,
            api_base,
            token_store: Arc::new(RwLock::new(None)),
            refresh_callback: Arc::new(Mutex::new(None)),
            beacon_timeout: DEFAULT_BEACON_TIMEOUT,
        })
    }

    /// Upper bound for unload deliveries, which must not hold up shutdown.
    pub fn with_beacon_timeout(mut self, timeout: Duration) -> Self {
        self.beacon_timeout = timeout;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let path = path.as_ref();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token_store.write().await = token;
    }

    pub async fn get_token(&self) -> Option<String> {
        self.token_store.read().await.clone()
    }

    pub async fn set_refresh_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TrackingResult<String>> + Send + 'static,
    {
        let boxed = Box::new(move || -> RefreshFuture { Box::pin(callback()) });
        *self.refresh_callback.lock().await = Some(boxed);
    }

    /// Attach the bearer token, if any
    pub async fn build_request(
        &self,
        builder: RequestBuilder,
    ) -> RequestBuilder {
        match self.token_store.read().await.as_ref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request, refreshing the token and retrying once on 401.
    async fn send(&self, request: RequestBuilder) -> TrackingResult<Response> {
        let retry = request.try_clone();
        let response = self.build_request(request).await.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if let Some(retry) = retry
            && let Some(callback) = self.refresh_callback.lock().await.as_ref()
        {
            info!("token rejected, attempting refresh");
            match callback().await {
                Ok(token) => {
                    self.set_token(Some(token)).await;
                    let response =
                        self.build_request(retry).await.send().await?;
                    if response.status() != StatusCode::UNAUTHORIZED {
                        return Ok(response);
                    }
                }
                Err(err) => warn!(error = %err, "token refresh failed"),
            }
        }

        self.set_token(None).await;
        Err(TrackingError::Unauthorized)
    }

    /// Unwrap the `ApiResponse` envelope of a successful response.
    async fn read_envelope<T: DeserializeOwned>(
        response: Response,
    ) -> TrackingResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(response).await);
        }
        if status == StatusCode::NO_CONTENT {
            return Err(TrackingError::EmptyResponse);
        }

        let envelope: ApiResponse<T> = response.json().await?;
        if envelope.data.is_none() && !envelope.is_success() {
            return Err(TrackingError::Server(envelope.failure_reason()));
        }
        envelope.data.ok_or(TrackingError::EmptyResponse)
    }

    /// Accept any 2xx, ignoring the body.
    async fn expect_ack(response: Response) -> TrackingResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn status_error(response: Response) -> TrackingError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        TrackingError::Status { status, body }
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> TrackingResult<R> {
        let request = self.client.post(self.build_url(path)).json(body);
        let response = self.send(request).await?;
        Self::read_envelope(response).await
    }

    async fn post_ack<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> TrackingResult<()> {
        let request = self.client.post(self.build_url(path)).json(body);
        let response = self.send(request).await?;
        Self::expect_ack(response).await
    }
}

#[async_trait]
impl WatchApi for WatchApiClient {
    async fn start_watching(
        &self,
        request: &StartWatchingRequest,
    ) -> TrackingResult<StartWatchingResponse> {
        self.post(video_watch::START, request).await
    }

    async fn update_progress(
        &self,
        watch_id: &WatchId,
        request: &UpdateProgressRequest,
    ) -> TrackingResult<UpdateProgressResponse> {
        let path =
            fill(video_watch::PROGRESS, &[("watch_id", watch_id.as_str())]);
        self.post(&path, request).await
    }

    async fn end_watching(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
    ) -> TrackingResult<()> {
        let path = fill(video_watch::END, &[("watch_id", watch_id.as_str())]);
        self.post_ack(&path, request).await
    }

    async fn reset_progress(
        &self,
        request: &ResetProgressRequest,
    ) -> TrackingResult<()> {
        self.post_ack(video_watch::RESET, request).await
    }

    async fn view_count(
        &self,
        classroom_id: &ClassroomId,
        video_id: &VideoId,
    ) -> TrackingResult<u64> {
        let path = fill(
            video_watch::VIEW_COUNT,
            &[
                ("classroom_id", classroom_id.as_str()),
                ("video_id", video_id.as_str()),
            ],
        );
        let request = self.client.get(self.build_url(path));
        let response = self.send(request).await?;
        let counts: ViewCountResponse = Self::read_envelope(response).await?;
        Ok(counts.view_count)
    }
}

#[async_trait]
impl BeaconTransport for WatchApiClient {
    /// Single attempt with a short timeout and no token refresh.
    async fn deliver_end(
        &self,
        watch_id: &WatchId,
        request: &EndWatchingRequest,
        mode: DeliveryMode,
    ) -> TrackingResult<()> {
        let path = fill(video_watch::END, &[("watch_id", watch_id.as_str())]);
        let mut builder = self
            .client
            .post(self.build_url(path))
            .timeout(self.beacon_timeout)
            .json(request);
        if mode == DeliveryMode::KeepAlive {
            builder = builder.header(header::CONNECTION, "keep-alive");
        }

        debug!(watch_id = %watch_id, mode = mode.as_str(), "delivering unload report");
        let response = self.build_request(builder).await.send().await?;
        Self::expect_ack(response).await
    }
}
