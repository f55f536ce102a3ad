use tokio_util::sync::CancellationToken;

use crate::observers::{ObserverHandle, ObserverSet};
use crate::SkipSegment;

/// Working state of the one session a controller may have open.
/// Only touched under the controller's lock, never across an await.
pub(crate) struct SessionState {
    pub(crate) video_id: Option<String>,
    pub(crate) attempt: u32,
    // Non-empty only while an attempt is running
    pub(crate) observers: ObserverSet,
    // Skip/progress tick, present only once playback is confirmed
    pub(crate) time_observer: Option<ObserverHandle>,
    pub(crate) segments: Vec<SkipSegment>,
    pub(crate) cancel: CancellationToken,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            video_id: None,
            attempt: 0,
            observers: ObserverSet::new(),
            time_observer: None,
            segments: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn for_video(video_id: &str) -> Self {
        Self {
            video_id: Some(video_id.to_string()),
            ..Self::new()
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.video_id.is_some()
    }

    pub(crate) fn release_attempt_observers(&mut self) -> usize {
        self.observers.drain()
    }

    /// Releases every observer the session holds. Idempotent.
    pub(crate) fn teardown(&mut self) -> usize {
        let mut released = self.observers.drain();
        if let Some(time_observer) = self.time_observer.take() {
            time_observer.release();
            released += 1;
        }
        released
    }
}
