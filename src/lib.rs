//! Playback acquisition and supervision for a locally hosted YouTube
//! extraction backend.
//!
//! The pieces, from the bottom up:
//!
//! - [`BackendSupervisor`] launches the backend process and gates every
//!   request on its health endpoint.
//! - [`ContentClient`] is the typed HTTP client for the backend and the
//!   skip-segment provider.
//! - [`PlaybackSessionController`] turns a video id into confirmed playback on
//!   a [`MediaPlayer`], retrying attempts that never start.
//! - [`SkipSegmentScheduler`] seeks past sponsor segments once each.
//!
//! # Logging
//!
//! This library uses the `tracing` crate for logging. To enable logs, you'll need to
//! initialize a tracing subscriber in your application.
//!
//! Example using `tracing_subscriber`:
//! ```no_run
//! use tracing::Level;
//! use tracing_subscriber::FmtSubscriber;
//!
//! // Create a subscriber with the desired log level
//! let subscriber = FmtSubscriber::builder()
//!     .with_max_level(Level::DEBUG) // Set to DEBUG, INFO, WARN, or ERROR
//!     .finish();
//!
//! // Initialize the global subscriber
//! tracing::subscriber::set_global_default(subscriber)
//!     .expect("Failed to set tracing subscriber");
//! ```
//!
//! The log levels control what information is displayed:
//! - `TRACE`: Every health probe, observer callback and saved position
//! - `DEBUG`: Backend stderr (target `backend`), phase changes, HTTP calls
//! - `INFO`: Backend launch, attempts, confirmation and skips
//! - `WARN`: Readiness timeouts, exhausted sessions, player stalls
//! - `ERROR`: Launch failures and failed backend requests

mod client;
pub use client::{ContentClient, ContentSource, AGE_RESTRICTED_STATUS};
mod error;
pub use error::PlaybackError;
mod events;
pub use events::{ItemNotification, PlayerEvent, SessionEvent, TimeControlStatus};
mod models;
pub use models::{ChannelDetail, SkipSegment, StreamDescriptor, VideoSummary};
mod observers;
pub use observers::{
    ObserverCallback, ObserverHandle, ObserverRegistry, ObserverSet, ObserverToken,
};
mod player;
pub use player::{ItemId, MediaPlayer, Observation, PlayerItem};
mod progress;
pub use progress::{InMemoryProgressStore, ProgressRecord, ProgressStore};
mod scheduler;
pub use scheduler::{SkipAction, SkipSegmentScheduler};
mod session;
pub use session::{FailureReason, PlaybackConfig, PlaybackSessionController, SessionPhase};
mod settings;
pub use settings::{Settings, SETTINGS};
mod state;
mod supervisor;
pub use supervisor::{BackendState, BackendSupervisor, Readiness};
