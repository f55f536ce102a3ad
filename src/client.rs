use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, error, info, warn};

use crate::models::{SkipSegmentEntry, VideoStreamResponse};
use crate::{
    BackendSupervisor, ChannelDetail, PlaybackError, Settings, SkipSegment, StreamDescriptor,
    VideoSummary,
};

/// Status the backend answers `/video/<id>` with when the video is age gated.
pub const AGE_RESTRICTED_STATUS: StatusCode = StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS;

/// What the session controller needs from the network.
pub trait ContentSource: Send + Sync + 'static {
    fn resolve_stream<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, Result<StreamDescriptor, PlaybackError>>;

    /// `Ok(None)` means the provider has nothing for this video.
    fn skip_segments<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<SkipSegment>>, PlaybackError>>;
}

/// Typed access to the local backend and the skip-segment provider.
///
/// Holds no mutable state, so clones can be used from concurrent tasks.
/// Every backend call first waits on the supervisor's readiness gate.
#[derive(Clone)]
pub struct ContentClient {
    client: Arc<Client>,
    base_url: String,
    skip_segments_url: String,
    supervisor: Arc<BackendSupervisor>,
}

impl ContentClient {
    /// Optionally accepts a custom reqwest client for connection reuse.
    pub fn new(
        settings: &Settings,
        supervisor: Arc<BackendSupervisor>,
        custom_client: Option<Arc<Client>>,
    ) -> Result<Self, PlaybackError> {
        let client = match custom_client {
            Some(client) => client,
            None => Arc::new(
                Client::builder()
                    .timeout(settings.request_timeout)
                    .connect_timeout(settings.connect_timeout)
                    .build()?,
            ),
        };

        Ok(Self {
            client,
            base_url: settings.backend_base_url.trim_end_matches('/').to_string(),
            skip_segments_url: format!(
                "{}/api/skipSegments",
                settings.skip_segments_base_url.trim_end_matches('/')
            ),
            supervisor,
        })
    }

    pub fn supervisor(&self) -> &Arc<BackendSupervisor> {
        &self.supervisor
    }

    pub async fn search(&self, query: &str) -> Result<Vec<VideoSummary>, PlaybackError> {
        self.supervisor.await_ready().await;
        debug!(query, "Searching");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await?;
        let response = ensure_success(response, "search")?;
        let body = response.bytes().await?;
        let results: Vec<VideoSummary> = serde_json::from_slice(&body)?;

        info!(query, count = results.len(), "Search completed");
        Ok(results)
    }

    /// Resolves the playable stream and the headers the stream host expects.
    /// `AgeRestricted` is terminal and must not be retried.
    pub async fn fetch_video(&self, video_id: &str) -> Result<StreamDescriptor, PlaybackError> {
        self.supervisor.await_ready().await;
        debug!(video_id, "Resolving stream");

        let response = self
            .client
            .get(format!("{}/video/{}", self.base_url, video_id))
            .send()
            .await?;
        if response.status() == AGE_RESTRICTED_STATUS {
            warn!(video_id, "Video is age restricted");
            return Err(PlaybackError::AgeRestricted);
        }
        let response = ensure_success(response, "video")?;
        let body = response.bytes().await?;
        let stream: VideoStreamResponse = serde_json::from_slice(&body)?;
        if stream.stream_url.trim().is_empty() {
            warn!(video_id, "Backend returned no stream URL");
            return Err(PlaybackError::InvalidResponse(format!(
                "empty stream_url for video {}",
                video_id
            )));
        }

        debug!(video_id, "Stream resolved");
        Ok(stream.into())
    }

    pub async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelDetail, PlaybackError> {
        self.supervisor.await_ready().await;
        debug!(channel_id, "Fetching channel");

        let response = self
            .client
            .get(format!("{}/channel/{}", self.base_url, channel_id))
            .send()
            .await?;
        let response = ensure_success(response, "channel")?;
        let body = response.bytes().await?;
        let channel: ChannelDetail = serde_json::from_slice(&body)?;

        debug!(channel_id, videos = channel.videos.len(), "Channel fetched");
        Ok(channel)
    }

    /// Any non-200 answer (404 is how the provider says "nothing here") maps to `None`.
    pub async fn fetch_skip_segments(
        &self,
        video_id: &str,
    ) -> Result<Option<Vec<SkipSegment>>, PlaybackError> {
        let response = self
            .client
            .get(&self.skip_segments_url)
            .query(&[("videoID", video_id)])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            debug!(video_id, status = %response.status(), "No skip segments");
            return Ok(None);
        }

        let body = response.bytes().await?;
        let entries: Vec<SkipSegmentEntry> = serde_json::from_slice(&body)?;
        let segments: Vec<SkipSegment> = entries
            .into_iter()
            .filter_map(SkipSegment::from_entry)
            .collect();

        debug!(video_id, count = segments.len(), "Skip segments fetched");
        Ok(Some(segments))
    }

    pub fn thumbnail_url(video_id: &str, thumbnail_idx: u8) -> String {
        format!(
            "https://img.youtube.com/vi/{}/{}.jpg",
            video_id, thumbnail_idx
        )
    }
}

impl ContentSource for ContentClient {
    fn resolve_stream<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, Result<StreamDescriptor, PlaybackError>> {
        self.fetch_video(video_id).boxed()
    }

    fn skip_segments<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<SkipSegment>>, PlaybackError>> {
        self.fetch_skip_segments(video_id).boxed()
    }
}

impl std::fmt::Debug for ContentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentClient")
            .field("base_url", &self.base_url)
            .field("skip_segments_url", &self.skip_segments_url)
            .finish()
    }
}

fn ensure_success(response: Response, endpoint: &str) -> Result<Response, PlaybackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    error!(endpoint, %status, "Backend request failed");
    Err(PlaybackError::UnexpectedStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
    })
}
