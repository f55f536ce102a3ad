#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use youtube_playback_rs::{
    ContentSource, ItemId, ItemNotification, MediaPlayer, Observation, ObserverCallback,
    ObserverRegistry, ObserverToken, PlaybackError, PlayerEvent, PlayerItem, Settings,
    SkipSegment, StreamDescriptor, TimeControlStatus,
};

pub fn segment(id: &str, start: f64, end: f64) -> SkipSegment {
    SkipSegment {
        id: id.to_string(),
        category: "sponsor".to_string(),
        action_type: "skip".to_string(),
        start_seconds: start,
        end_seconds: end,
        video_duration_seconds: 300.0,
        locked: false,
        votes: 0,
        description: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Scripted content source

pub struct FakeSource {
    resolve_delay: Duration,
    fail_with: Option<fn() -> PlaybackError>,
    segments: Option<Vec<SkipSegment>>,
    segments_fail: bool,
    segments_delay: Duration,
    resolve_calls: AtomicUsize,
    segment_calls: AtomicUsize,
}

impl FakeSource {
    pub fn streaming() -> Self {
        Self {
            resolve_delay: Duration::ZERO,
            fail_with: None,
            segments: None,
            segments_fail: false,
            segments_delay: Duration::ZERO,
            resolve_calls: AtomicUsize::new(0),
            segment_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: fn() -> PlaybackError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::streaming()
        }
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn with_segments(mut self, segments: Vec<SkipSegment>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn with_segments_delay(mut self, delay: Duration) -> Self {
        self.segments_delay = delay;
        self
    }

    pub fn with_failing_segments(mut self) -> Self {
        self.segments_fail = true;
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn segment_calls(&self) -> usize {
        self.segment_calls.load(Ordering::SeqCst)
    }
}

impl ContentSource for FakeSource {
    fn resolve_stream<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, Result<StreamDescriptor, PlaybackError>> {
        async move {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if !self.resolve_delay.is_zero() {
                tokio::time::sleep(self.resolve_delay).await;
            }
            if let Some(error) = self.fail_with {
                return Err(error());
            }
            let mut request_headers = HashMap::new();
            request_headers.insert("User-Agent".to_string(), "test-agent".to_string());
            Ok(StreamDescriptor {
                stream_url: format!("https://stream.example/{}.m3u8", video_id),
                request_headers,
            })
        }
        .boxed()
    }

    fn skip_segments<'a>(
        &'a self,
        _video_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<SkipSegment>>, PlaybackError>> {
        async move {
            self.segment_calls.fetch_add(1, Ordering::SeqCst);
            if !self.segments_delay.is_zero() {
                tokio::time::sleep(self.segments_delay).await;
            }
            if self.segments_fail {
                return Err(PlaybackError::UnexpectedStatus {
                    endpoint: "skipSegments".to_string(),
                    status: 500,
                });
            }
            Ok(self.segments.clone())
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Scripted media player

/// What the fake pipeline does after one `play()` call.
#[derive(Debug, Clone, Copy)]
pub enum StartBehavior {
    /// Silence; the attempt can only time out.
    Never,
    /// Posts a time-jump notification for the item that was playing.
    TimeJumpAfter(Duration),
    /// Reports the time-control status switching to playing.
    PlayingAfter(Duration),
}

#[derive(Debug, Default)]
struct PlayerLog {
    current: Option<ItemId>,
    // Registered observer count at the moment each item was installed
    installs: Vec<usize>,
    plays: usize,
    pauses: usize,
    seeks: Vec<f64>,
    position: f64,
    dispatched: Vec<usize>,
}

pub struct FakePlayer {
    registry: Arc<ObserverRegistry>,
    log: Arc<Mutex<PlayerLog>>,
    script: Mutex<VecDeque<StartBehavior>>,
    fallback: StartBehavior,
}

impl FakePlayer {
    pub fn new(fallback: StartBehavior) -> Self {
        Self {
            registry: Arc::new(ObserverRegistry::new()),
            log: Arc::new(Mutex::new(PlayerLog::default())),
            script: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    /// Behaviours for the first `play()` calls, in order; later calls use the fallback.
    pub fn scripted(script: Vec<StartBehavior>, fallback: StartBehavior) -> Self {
        let player = Self::new(fallback);
        *player.script.lock().unwrap() = script.into();
        player
    }

    pub fn registered_observers(&self) -> usize {
        self.registry.len()
    }

    pub fn installs(&self) -> Vec<usize> {
        self.log.lock().unwrap().installs.clone()
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.log.lock().unwrap().current
    }

    pub fn plays(&self) -> usize {
        self.log.lock().unwrap().plays
    }

    pub fn pauses(&self) -> usize {
        self.log.lock().unwrap().pauses
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.log.lock().unwrap().seeks.clone()
    }

    /// Observers reached by each scripted event, in delivery order.
    pub fn dispatched(&self) -> Vec<usize> {
        self.log.lock().unwrap().dispatched.clone()
    }

    pub fn set_position(&self, seconds: f64) {
        self.log.lock().unwrap().position = seconds;
    }

    fn deliver_later(&self, delay: Duration, event: PlayerEvent) {
        let registry = self.registry.clone();
        let log = self.log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reached = registry.dispatch(&event);
            log.lock().unwrap().dispatched.push(reached);
        });
    }
}

impl MediaPlayer for FakePlayer {
    fn replace_item(&self, item: Option<PlayerItem>) {
        let mut log = self.log.lock().unwrap();
        match item {
            Some(item) => {
                log.installs.push(self.registry.len());
                log.current = Some(item.id);
                log.position = 0.0;
            }
            None => log.current = None,
        }
    }

    fn play(&self) {
        let item = {
            let mut log = self.log.lock().unwrap();
            log.plays += 1;
            log.current
        };
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match (behavior, item) {
            (StartBehavior::TimeJumpAfter(delay), Some(item)) => {
                self.deliver_later(delay, PlayerEvent::item(item, ItemNotification::TimeJumped))
            }
            (StartBehavior::PlayingAfter(delay), Some(_)) => self.deliver_later(
                delay,
                PlayerEvent::TimeControlStatusChanged(TimeControlStatus::Playing),
            ),
            _ => {}
        }
    }

    fn pause(&self) {
        self.log.lock().unwrap().pauses += 1;
    }

    fn seek(&self, seconds: f64) {
        let mut log = self.log.lock().unwrap();
        log.seeks.push(seconds);
        log.position = seconds;
    }

    fn current_position(&self) -> f64 {
        self.log.lock().unwrap().position
    }

    fn add_observer(&self, observation: Observation, callback: ObserverCallback) -> ObserverToken {
        self.registry.register(observation, callback)
    }

    fn remove_observer(&self, token: ObserverToken) {
        self.registry.remove(token);
    }
}

// ---------------------------------------------------------------------------
// In-process HTTP backend

#[derive(Clone)]
struct BackendState {
    log: Arc<Mutex<Vec<String>>>,
    unhealthy_probes: usize,
    probes: Arc<AtomicUsize>,
}

impl BackendState {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

pub struct FakeBackend {
    pub base_url: String,
    log: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Requests seen so far, e.g. `health:503`, `search`, `video:abc`.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Settings pointing both the backend and the segment provider at this server.
    pub fn settings(&self) -> Settings {
        Settings {
            backend_base_url: self.base_url.clone(),
            skip_segments_base_url: self.base_url.clone(),
            health_poll_interval: Duration::from_millis(50),
            health_poll_attempts: 20,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            ..Settings::default()
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a fake backend whose first `unhealthy_probes` health checks answer 503.
pub async fn spawn_backend(unhealthy_probes: usize) -> FakeBackend {
    let log = Arc::new(Mutex::new(Vec::new()));
    let state = BackendState {
        log: log.clone(),
        unhealthy_probes,
        probes: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/video/:id", get(video))
        .route("/channel/:id", get(channel))
        .route("/api/skipSegments", get(skip_segments))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        base_url: format!("http://{}", addr),
        log,
        task,
    }
}

/// A base URL nothing is listening on.
pub async fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// A base URL whose listener accepts connections and never answers.
pub async fn silent_base_url() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (format!("http://{}", addr), task)
}

async fn health(State(state): State<BackendState>) -> StatusCode {
    let probe = state.probes.fetch_add(1, Ordering::SeqCst);
    let status = if probe < state.unhealthy_probes {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    state.record(format!("health:{}", status.as_u16()));
    status
}

async fn search(
    State(state): State<BackendState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.record("search".to_string());
    let query = params.get("q").cloned().unwrap_or_default();
    Json(json!([
        {
            "id": "dQw4w9WgXcQ",
            "title": format!("{} result", query),
            "uploader": "Rick Astley",
            "duration": 213.0,
            "views": 42,
            "is_live": false,
            "thumbnail": "https://img.youtube.com/vi/dQw4w9WgXcQ/0.jpg"
        },
        {
            "id": "live1",
            "title": "Live stream",
            "is_live": true
        }
    ]))
    .into_response()
}

async fn video(State(state): State<BackendState>, Path(id): Path<String>) -> Response {
    state.record(format!("video:{}", id));
    match id.as_str() {
        "age" => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS.into_response(),
        "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "unlisted" => Json(json!({ "stream_url": "", "headers": {} })).into_response(),
        _ => Json(json!({
            "stream_url": format!("https://stream.example/{}.m3u8", id),
            "headers": {
                "User-Agent": "Mozilla/5.0",
                "Accept": "*/*",
                "Cookie": "session=secret",
                "X-Forwarded-For": "10.0.0.1"
            }
        }))
        .into_response(),
    }
}

async fn channel(State(state): State<BackendState>, Path(id): Path<String>) -> Response {
    state.record(format!("channel:{}", id));
    match id.as_str() {
        "bad" => (StatusCode::OK, "<html>not json</html>").into_response(),
        _ => Json(json!({
            "id": id,
            "title": "Test Channel",
            "desc": "Channel description",
            "subscribers": 1000,
            "videos": [{ "id": "v1", "title": "First" }]
        }))
        .into_response(),
    }
}

async fn skip_segments(
    State(state): State<BackendState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let video_id = params.get("videoID").cloned().unwrap_or_default();
    state.record(format!("skipSegments:{}", video_id));
    match video_id.as_str() {
        "good" => Json(json!([
            {
                "category": "sponsor",
                "actionType": "skip",
                "segment": [10.0, 20.0],
                "UUID": "seg-a",
                "videoDuration": 300.0,
                "locked": 1,
                "votes": 5,
                "description": ""
            },
            {
                "category": "intro",
                "actionType": "skip",
                "segment": [30.5, 45.0],
                "UUID": "seg-b",
                "videoDuration": 300.0,
                "locked": 0,
                "votes": 0
            },
            {
                "category": "sponsor",
                "actionType": "skip",
                "segment": [50.0, 40.0],
                "UUID": "seg-reversed"
            },
            {
                "category": "sponsor",
                "actionType": "skip",
                "segment": [-5.0, 3.0],
                "UUID": "seg-negative"
            }
        ]))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
