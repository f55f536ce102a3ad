use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Watch progress for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub video_id: String,
    pub recorded_at: DateTime<Utc>,
    pub position_seconds: f64,
}

/// Where confirmed sessions persist their position. Keyed by video id;
/// a later record replaces the earlier one.
pub trait ProgressStore: Send + Sync + 'static {
    fn upsert(&self, record: ProgressRecord);
}

#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    records: Mutex<HashMap<String, ProgressRecord>>,
    writes: AtomicUsize,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, video_id: &str) -> Option<ProgressRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(video_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of upserts received, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn upsert(&self, record: ProgressRecord) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.video_id.clone(), record);
    }
}

// Lets a tick loop save at most once per interval
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last_saved: Option<Instant>,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_saved: None,
        }
    }

    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last_saved
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_saved = Some(now);
        }
        due
    }
}
