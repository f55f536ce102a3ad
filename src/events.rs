use crate::player::ItemId;
use crate::session::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControlStatus {
    Paused,
    WaitingToPlay,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemNotification {
    /// Position jumped discontinuously; the pipeline is moving.
    TimeJumped,
    FailedToPlayToEnd,
    PlaybackStalled,
    NewErrorLogEntry,
}

// Events posted by a media player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Item {
        item: ItemId,
        notification: ItemNotification,
        detail: Option<String>,
    },
    TimeControlStatusChanged(TimeControlStatus),
}

impl PlayerEvent {
    pub fn item(item: ItemId, notification: ItemNotification) -> Self {
        PlayerEvent::Item {
            item,
            notification,
            detail: None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::Item { notification, .. } => match notification {
                ItemNotification::TimeJumped => "timeJumped",
                ItemNotification::FailedToPlayToEnd => "failedToPlayToEnd",
                ItemNotification::PlaybackStalled => "playbackStalled",
                ItemNotification::NewErrorLogEntry => "newErrorLogEntry",
            },
            PlayerEvent::TimeControlStatusChanged(_) => "timeControlStatus",
        }
    }
}

// Events broadcast by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    AttemptStarted {
        video_id: String,
        attempt: u32,
    },
    AttemptTimedOut {
        video_id: String,
        attempt: u32,
    },
    SegmentSkipped {
        video_id: String,
        segment_id: String,
        from_seconds: f64,
        to_seconds: f64,
    },
    ProgressSaved {
        video_id: String,
        position_seconds: f64,
    },
}
