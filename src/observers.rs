use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::events::PlayerEvent;
use crate::player::Observation;

static NEXT_OBSERVER_TOKEN: AtomicU64 = AtomicU64::new(1);

pub type ObserverCallback = Arc<dyn Fn(&PlayerEvent) + Send + Sync + 'static>;

type Entry = (ObserverToken, Observation, ObserverCallback);

/// Identifies one registration inside an [`ObserverRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

impl ObserverToken {
    fn next() -> Self {
        Self(NEXT_OBSERVER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback table a [`MediaPlayer`](crate::MediaPlayer) implementation embeds
/// to serve `add_observer` / `remove_observer`.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observation: Observation, callback: ObserverCallback) -> ObserverToken {
        let token = ObserverToken::next();
        self.lock().push((token, observation, callback));
        token
    }

    /// Returns false if the token was not registered (already removed).
    pub fn remove(&self, token: ObserverToken) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(t, _, _)| *t != token);
        entries.len() != before
    }

    /// Delivers `event` to every matching observer and returns how many ran.
    pub fn dispatch(&self, event: &PlayerEvent) -> usize {
        // Callbacks run outside the lock so they may unregister themselves
        let matching: Vec<ObserverCallback> = self
            .lock()
            .iter()
            .filter(|(_, observation, _)| observation.matches(event))
            .map(|(_, _, callback)| callback.clone())
            .collect();
        for callback in &matching {
            callback(event);
        }
        matching.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

/// A live subscription. Releasing it, explicitly or by dropping it,
/// unregisters synchronously.
pub struct ObserverHandle {
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ObserverHandle {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Wraps a periodic task; releasing the handle aborts it.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("live", &self.release.is_some())
            .finish()
    }
}

/// The observers registered for one playback attempt.
#[derive(Debug, Default)]
pub struct ObserverSet {
    handles: Vec<ObserverHandle>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ObserverHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Releases every handle. Calling it on an empty set is a no-op.
    pub fn drain(&mut self) -> usize {
        let released = self.handles.len();
        for handle in self.handles.drain(..) {
            handle.release();
        }
        released
    }
}
