use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::FutureExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::events::{ItemNotification, PlayerEvent, SessionEvent, TimeControlStatus};
use crate::observers::ObserverHandle;
use crate::player::{ItemId, MediaPlayer, Observation, PlayerItem};
use crate::progress::{ProgressRecord, ProgressStore, ProgressThrottle};
use crate::scheduler::SkipSegmentScheduler;
use crate::state::SessionState;
use crate::{ContentSource, PlaybackError, Settings, SkipSegment, StreamDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AgeRestricted,
    Transport(String),
    Decode(String),
}

impl FailureReason {
    /// Text a UI shows for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::AgeRestricted => {
                "This video is age restricted and cannot be played."
            }
            FailureReason::Transport(_) => "Could not reach the video service.",
            FailureReason::Decode(_) => "The video service sent an unexpected response.",
        }
    }
}

impl From<&PlaybackError> for FailureReason {
    fn from(error: &PlaybackError) -> Self {
        match error {
            PlaybackError::AgeRestricted => FailureReason::AgeRestricted,
            e if e.is_decode() => FailureReason::Decode(e.to_string()),
            e => FailureReason::Transport(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    ResolvingStream,
    Attempting { attempt: u32 },
    Confirmed,
    /// Every attempt ran out its confirmation window.
    Exhausted,
    Failed(FailureReason),
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Confirmed | SessionPhase::Exhausted | SessionPhase::Failed(_)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::ResolvingStream => "RESOLVING_STREAM",
            SessionPhase::Attempting { .. } => "ATTEMPTING",
            SessionPhase::Confirmed => "CONFIRMED",
            SessionPhase::Exhausted => "EXHAUSTED",
            SessionPhase::Failed(_) => "FAILED",
        }
    }
}

/// Tunables of the playback state machine.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub max_retries: u32,
    pub confirmation_window: Duration,
    pub tick_interval: Duration,
    pub skip_overshoot_secs: f64,
    pub progress_save_interval: Duration,
}

impl From<&Settings> for PlaybackConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            confirmation_window: settings.confirmation_window,
            tick_interval: settings.skip_tick_interval,
            skip_overshoot_secs: settings.skip_overshoot_secs,
            progress_save_interval: settings.progress_save_interval,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

// Why an attempt counted as started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmationSignal {
    PositionDiscontinuity,
    PlaybackRateActive,
}

/// Turns a video id into confirmed playback on one player.
///
/// `watch` drives the whole state machine and returns the phase it ended in;
/// `cancel` may be called from any clone at any time and tears the session
/// down before returning. Clones share the same session.
pub struct PlaybackSessionController<S, P> {
    source: Arc<S>,
    player: Arc<P>,
    progress: Arc<dyn ProgressStore>,
    config: PlaybackConfig,
    state: Arc<Mutex<SessionState>>,
    phase_tx: Arc<watch::Sender<SessionPhase>>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl<S, P> Clone for PlaybackSessionController<S, P> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            player: self.player.clone(),
            progress: self.progress.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            phase_tx: self.phase_tx.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}

impl<S, P> PlaybackSessionController<S, P>
where
    S: ContentSource,
    P: MediaPlayer,
{
    pub fn new(
        source: Arc<S>,
        player: Arc<P>,
        progress: Arc<dyn ProgressStore>,
        config: PlaybackConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        let (event_tx, _) = broadcast::channel(100);
        Self {
            source,
            player,
            progress,
            config,
            state: Arc::new(Mutex::new(SessionState::new())),
            phase_tx: Arc::new(phase_tx),
            event_sender: event_tx,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn phase_receiver(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn video_id(&self) -> Option<String> {
        self.lock_state().video_id.clone()
    }

    pub fn attempt(&self) -> u32 {
        self.lock_state().attempt
    }

    /// Observers held for the running attempt.
    pub fn active_observer_count(&self) -> usize {
        self.lock_state().observers.len()
    }

    pub fn has_time_observer(&self) -> bool {
        self.lock_state().time_observer.is_some()
    }

    /// Skip segments loaded for the confirmed session.
    pub fn segments(&self) -> Vec<SkipSegment> {
        self.lock_state().segments.clone()
    }

    /// Runs a session for `video_id` until it is confirmed, exhausted, failed or
    /// cancelled. Any session already open on this player is cancelled first.
    ///
    /// Returns `SessionPhase::Idle` when the session was cancelled.
    pub async fn watch(&self, video_id: &str) -> SessionPhase {
        let token = self.open_session(video_id);
        info!(video_id, "Opening playback session");

        let resolved = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(video_id, "Session cancelled while resolving stream");
                return SessionPhase::Idle;
            }
            result = self.source.resolve_stream(video_id) => result,
        };

        let stream = match resolved {
            Ok(stream) => stream,
            Err(e) => {
                error!(video_id, error = %e, "Stream resolution failed");
                return self.finish(&token, SessionPhase::Failed(FailureReason::from(&e)));
            }
        };

        // Kept alive for the whole session so the receiver never reports closed early
        let (signal_tx, mut signals) = mpsc::unbounded_channel();

        for attempt in 0..self.config.max_retries {
            if !self.begin_attempt(&token, video_id, attempt, &stream, &signal_tx) {
                return SessionPhase::Idle;
            }

            let confirmed = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(video_id, attempt, "Session cancelled during attempt");
                    return SessionPhase::Idle;
                }
                signal = timeout(self.config.confirmation_window, signals.recv()) => {
                    signal.ok().flatten()
                }
            };

            match confirmed {
                Some(signal) => {
                    info!(video_id, attempt = attempt + 1, ?signal, "Playback confirmed active");
                    return self.confirm(&token, video_id);
                }
                None => self.abandon_attempt(&token, video_id, attempt, &mut signals),
            }
        }

        warn!(
            video_id,
            attempts = self.config.max_retries,
            "Gave up, playback never started"
        );
        self.finish(&token, SessionPhase::Exhausted)
    }

    /// Stops playback and releases everything the session holds, whatever phase
    /// it is in. Calling it again, or with no session open, is harmless.
    pub fn cancel(&self) {
        let mut state = self.lock_state();
        let (video_id, released) = self.close_session(&mut state);
        self.set_phase(SessionPhase::Idle);
        drop(state);

        debug!(?video_id, released, "Playback session cancelled");
    }

    fn open_session(&self, video_id: &str) -> CancellationToken {
        let mut state = self.lock_state();
        if state.is_open() {
            let (previous, released) = self.close_session(&mut state);
            info!(?previous, released, "Replaced open playback session");
        }
        *state = SessionState::for_video(video_id);
        let token = state.cancel.clone();
        self.set_phase(SessionPhase::ResolvingStream);
        token
    }

    /// The one teardown path for a session, whichever phase it is in. Leaves the
    /// phase untouched; returns the closed video id and the observers released.
    fn close_session(&self, state: &mut SessionState) -> (Option<String>, usize) {
        state.cancel.cancel();

        // Last position of a confirmed session is kept even if the periodic
        // save ran moments ago
        if self.phase() == SessionPhase::Confirmed {
            if let Some(video_id) = state.video_id.clone() {
                let position = self.player.current_position();
                self.save_progress(&video_id, position);
            }
        }

        self.player.pause();
        self.player.replace_item(None);
        let released = state.teardown();
        state.segments.clear();
        state.attempt = 0;
        (state.video_id.take(), released)
    }

    fn begin_attempt(
        &self,
        token: &CancellationToken,
        video_id: &str,
        attempt: u32,
        stream: &StreamDescriptor,
        signal_tx: &mpsc::UnboundedSender<ConfirmationSignal>,
    ) -> bool {
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return false;
        }

        // Nothing registered for an earlier item may fire into this attempt
        let stale = state.release_attempt_observers();
        if stale > 0 {
            warn!(video_id, stale, "Released observers left over from a previous attempt");
        }
        self.player.replace_item(None);

        let item = PlayerItem::from_stream(stream);
        let item_id = item.id;
        self.player.replace_item(Some(item));
        state.attempt = attempt;
        self.set_phase(SessionPhase::Attempting { attempt });

        self.register_attempt_observers(&mut state, item_id, signal_tx);
        self.player.play();
        drop(state);

        info!(video_id, attempt = attempt + 1, item = %item_id, "Starting playback attempt");
        let _ = self.event_sender.send(SessionEvent::AttemptStarted {
            video_id: video_id.to_string(),
            attempt,
        });
        true
    }

    fn register_attempt_observers(
        &self,
        state: &mut SessionState,
        item: ItemId,
        signal_tx: &mpsc::UnboundedSender<ConfirmationSignal>,
    ) {
        let jumped = signal_tx.clone();
        state.observers.insert(self.observe(
            Observation::Item {
                item,
                notification: ItemNotification::TimeJumped,
            },
            move |_| {
                trace!("Time jumped, playback active");
                let _ = jumped.send(ConfirmationSignal::PositionDiscontinuity);
            },
        ));

        let rate = signal_tx.clone();
        state
            .observers
            .insert(self.observe(Observation::TimeControlStatus, move |event| {
                if let PlayerEvent::TimeControlStatusChanged(status) = event {
                    trace!(?status, "Time control status changed");
                    if *status == TimeControlStatus::Playing {
                        let _ = rate.send(ConfirmationSignal::PlaybackRateActive);
                    }
                }
            }));

        // Diagnostics only, these never confirm an attempt
        state.observers.insert(self.observe(
            Observation::Item {
                item,
                notification: ItemNotification::FailedToPlayToEnd,
            },
            |_| warn!("Player item failed to play to end"),
        ));
        state.observers.insert(self.observe(
            Observation::Item {
                item,
                notification: ItemNotification::PlaybackStalled,
            },
            |_| warn!("Playback stalled"),
        ));
        state.observers.insert(self.observe(
            Observation::Item {
                item,
                notification: ItemNotification::NewErrorLogEntry,
            },
            |event| {
                if let PlayerEvent::Item { detail, .. } = event {
                    debug!(detail = detail.as_deref().unwrap_or(""), "New player error log entry");
                }
            },
        ));
    }

    fn observe<F>(&self, observation: Observation, callback: F) -> ObserverHandle
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        let token = self.player.add_observer(observation, Arc::new(callback));
        let player = self.player.clone();
        ObserverHandle::new(move || player.remove_observer(token))
    }

    fn abandon_attempt(
        &self,
        token: &CancellationToken,
        video_id: &str,
        attempt: u32,
        signals: &mut mpsc::UnboundedReceiver<ConfirmationSignal>,
    ) {
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return;
        }
        let released = state.release_attempt_observers();
        self.player.replace_item(None);
        drop(state);

        // A signal that raced the window belongs to the abandoned item
        while signals.try_recv().is_ok() {}

        info!(video_id, attempt = attempt + 1, released, "No playback start detected, retrying");
        let _ = self.event_sender.send(SessionEvent::AttemptTimedOut {
            video_id: video_id.to_string(),
            attempt,
        });
    }

    fn confirm(&self, token: &CancellationToken, video_id: &str) -> SessionPhase {
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return SessionPhase::Idle;
        }
        // Second confirmation of the same session is a no-op
        if self.phase() == SessionPhase::Confirmed {
            return SessionPhase::Confirmed;
        }

        state.release_attempt_observers();
        self.set_phase(SessionPhase::Confirmed);

        let ticker = tokio::spawn(
            self.clone()
                .run_confirmed(token.clone(), video_id.to_string()),
        );
        state.time_observer = Some(ObserverHandle::from_task(ticker));
        SessionPhase::Confirmed
    }

    /// Ticks the scheduler and progress saving until the session is cancelled.
    /// Skip segments load alongside the ticks; until they arrive nothing is skipped.
    async fn run_confirmed(self, token: CancellationToken, video_id: String) {
        let mut segments_fetch = self.source.skip_segments(&video_id).fuse();
        let overshoot = self.config.skip_overshoot_secs;
        let mut scheduler = SkipSegmentScheduler::new(Vec::new(), overshoot);
        let mut throttle = ProgressThrottle::new(self.config.progress_save_interval);
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = &mut segments_fetch => {
                    let segments = match result {
                        Ok(Some(segments)) => segments,
                        Ok(None) => {
                            debug!(video_id = %video_id, "No skip segments for video");
                            Vec::new()
                        }
                        Err(e) => {
                            warn!(
                                video_id = %video_id,
                                error = %e,
                                "Failed to fetch skip segments, proceeding without them"
                            );
                            Vec::new()
                        }
                    };

                    let mut state = self.lock_state();
                    if token.is_cancelled() {
                        break;
                    }
                    info!(
                        video_id = %video_id,
                        segments = segments.len(),
                        "Monitoring skip segments"
                    );
                    state.segments = segments.clone();
                    scheduler = SkipSegmentScheduler::new(segments, overshoot);
                    continue;
                }
                _ = ticker.tick() => {}
            }

            // Hold the lock so a concurrent cancel cannot interleave with a seek
            let _state = self.lock_state();
            if token.is_cancelled() {
                break;
            }

            let position = self.player.current_position();
            if let Some(action) = scheduler.on_tick(position) {
                info!(
                    video_id = %video_id,
                    segment = %action.segment_id,
                    from = action.from_seconds,
                    to = action.target_seconds,
                    "Skipping segment"
                );
                self.player.seek(action.target_seconds);
                let _ = self.event_sender.send(SessionEvent::SegmentSkipped {
                    video_id: video_id.clone(),
                    segment_id: action.segment_id,
                    from_seconds: action.from_seconds,
                    to_seconds: action.target_seconds,
                });
            }

            if throttle.ready(Instant::now()) {
                self.save_progress(&video_id, position);
            }
        }
        trace!(video_id = %video_id, "Skip-segment monitor stopped");
    }

    fn finish(&self, token: &CancellationToken, phase: SessionPhase) -> SessionPhase {
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return SessionPhase::Idle;
        }
        let released = state.teardown();
        self.player.replace_item(None);
        self.set_phase(phase.clone());
        drop(state);

        debug!(phase = phase.as_str(), released, "Playback session finished");
        phase
    }

    fn save_progress(&self, video_id: &str, position_seconds: f64) {
        self.progress.upsert(ProgressRecord {
            video_id: video_id.to_string(),
            recorded_at: Utc::now(),
            position_seconds,
        });
        trace!(video_id, position_seconds, "Progress saved");
        let _ = self.event_sender.send(SessionEvent::ProgressSaved {
            video_id: video_id.to_string(),
            position_seconds,
        });
    }

    fn set_phase(&self, phase: SessionPhase) {
        debug!(phase = phase.as_str(), "Session phase changed");
        self.phase_tx.send_replace(phase.clone());
        let _ = self.event_sender.send(SessionEvent::PhaseChanged(phase));
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, P> std::fmt::Debug for PlaybackSessionController<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSessionController")
            .field("phase", &*self.phase_tx.borrow())
            .field("config", &self.config)
            .finish()
    }
}
