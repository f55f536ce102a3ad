use std::collections::HashMap;

use uuid::Uuid;

use crate::events::{ItemNotification, PlayerEvent};
use crate::observers::{ObserverCallback, ObserverToken};
use crate::StreamDescriptor;

/// Identity of one installed player item. Item notifications carry it so an
/// observer only hears about the item it was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerItem {
    pub id: ItemId,
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl PlayerItem {
    /// Builds a fresh item; every call yields a new `ItemId`.
    pub fn from_stream(stream: &StreamDescriptor) -> Self {
        Self {
            id: ItemId::new(),
            url: stream.stream_url.clone(),
            headers: stream.request_headers.clone(),
        }
    }
}

/// What an observer wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A notification posted by one specific item.
    Item {
        item: ItemId,
        notification: ItemNotification,
    },
    /// Changes of the player's time-control status, whatever the item.
    TimeControlStatus,
}

impl Observation {
    pub fn matches(&self, event: &PlayerEvent) -> bool {
        match (self, event) {
            (
                Observation::Item { item, notification },
                PlayerEvent::Item {
                    item: event_item,
                    notification: event_notification,
                    ..
                },
            ) => item == event_item && notification == event_notification,
            (Observation::TimeControlStatus, PlayerEvent::TimeControlStatusChanged(_)) => true,
            _ => false,
        }
    }
}

/// The media pipeline driven by the session controller.
///
/// Implementations are expected to be slow and unreliable to start: `play()`
/// may report success while no frames advance. Observers registered through
/// `add_observer` must stop being called once `remove_observer` returns.
pub trait MediaPlayer: Send + Sync + 'static {
    /// Installs `item` (or clears the player with `None`), discarding the previous one.
    fn replace_item(&self, item: Option<PlayerItem>);

    fn play(&self);

    fn pause(&self);

    fn seek(&self, seconds: f64);

    fn current_position(&self) -> f64;

    fn add_observer(&self, observation: Observation, callback: ObserverCallback) -> ObserverToken;

    fn remove_observer(&self, token: ObserverToken);
}
