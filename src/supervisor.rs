//! Ownership of the local extraction backend process and its readiness gate.
//!
//! ```text
//!   NotStarted ──launch()──► Starting ──first healthy probe──► Ready
//!        │                     │  ▲                              │
//!        │                     └──┘ probe failed, retry          │
//!        └─────────────────────────┴──────── terminate() ────────┴──► Terminated
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::{PlaybackError, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    NotStarted,
    Starting,
    Ready,
    Terminated,
}

/// Outcome of waiting on the readiness gate. A timeout is not an error:
/// callers proceed and let their own request fail if the backend is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

pub struct BackendSupervisor {
    client: Client,
    health_url: String,
    program: PathBuf,
    script: PathBuf,
    python_path: PathBuf,
    cert_file: PathBuf,
    poll_interval: Duration,
    poll_attempts: u32,
    process: Mutex<Option<Child>>,
    state_tx: watch::Sender<BackendState>,
    // Serialises probing so concurrent callers share one polling loop
    probe_lock: AsyncMutex<()>,
}

impl BackendSupervisor {
    pub fn new(settings: &Settings) -> Result<Self, PlaybackError> {
        let client = Client::builder()
            .timeout(settings.connect_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;
        let (state_tx, _) = watch::channel(BackendState::NotStarted);

        Ok(Self {
            client,
            health_url: format!("{}/health", settings.backend_base_url.trim_end_matches('/')),
            program: settings.backend_program.clone(),
            script: settings.backend_script.clone(),
            python_path: settings.backend_python_path(),
            cert_file: settings.backend_cert_file(),
            // A zero interval would make every probe time out immediately
            poll_interval: settings.health_poll_interval.max(Duration::from_millis(1)),
            poll_attempts: settings.health_poll_attempts,
            process: Mutex::new(None),
            state_tx,
            probe_lock: AsyncMutex::new(()),
        })
    }

    pub fn current_state(&self) -> BackendState {
        *self.state_tx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<BackendState> {
        self.state_tx.subscribe()
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Starts the backend process. Only the first call while `NotStarted` does
    /// anything; later calls are no-ops. Must run inside a tokio runtime.
    ///
    /// A `LaunchFailure` means the application was packaged without its backend
    /// and should be treated as fatal by the caller.
    pub fn launch(&self) -> Result<(), PlaybackError> {
        let mut process = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.current_state();
        if state != BackendState::NotStarted {
            debug!(?state, "Backend launch requested again, ignoring");
            return Ok(());
        }

        if !self.program.is_file() {
            error!(program = ?self.program, "Backend interpreter not found");
            return Err(PlaybackError::LaunchFailure {
                program: self.program.clone(),
                reason: "backend interpreter not found".to_string(),
            });
        }
        if !self.script.is_file() {
            error!(script = ?self.script, "Backend script not found");
            return Err(PlaybackError::LaunchFailure {
                program: self.script.clone(),
                reason: "backend script not found".to_string(),
            });
        }

        info!(program = ?self.program, script = ?self.script, "Launching backend");
        let mut child = Command::new(&self.program)
            .arg(&self.script)
            .env_clear()
            .env("PYTHONPATH", &self.python_path)
            .env("SSL_CERT_FILE", &self.cert_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlaybackError::LaunchFailure {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_backend_output(stderr));
        }
        debug!(pid = ?child.id(), "Backend process spawned");

        *process = Some(child);
        self.state_tx.send_replace(BackendState::Starting);
        Ok(())
    }

    /// Polls the health endpoint until it answers 2xx or the attempt budget runs out.
    /// Each probe gets at most one poll interval, so the whole wait is bounded by
    /// `poll_attempts * poll_interval` even against a backend that never answers.
    /// `Ready` is sticky; after a timeout the next caller probes again.
    pub async fn await_ready(&self) -> Readiness {
        if self.current_state() == BackendState::Ready {
            return Readiness::Ready;
        }

        let _probe = self.probe_lock.lock().await;
        // Another caller may have finished probing while we waited for the lock
        if self.current_state() == BackendState::Ready {
            return Readiness::Ready;
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=self.poll_attempts {
            ticker.tick().await;
            let probe = self
                .client
                .get(&self.health_url)
                .timeout(self.poll_interval)
                .send();
            match probe.await {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, "Backend is ready");
                    self.state_tx.send_if_modified(|state| match state {
                        BackendState::Ready | BackendState::Terminated => false,
                        _ => {
                            *state = BackendState::Ready;
                            true
                        }
                    });
                    return Readiness::Ready;
                }
                Ok(response) => {
                    trace!(attempt, status = %response.status(), "Backend not healthy yet");
                }
                Err(e) => {
                    trace!(attempt, error = %e, "Health probe failed");
                }
            }
        }

        warn!(
            attempts = self.poll_attempts,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Backend did not respond in time, proceeding anyway"
        );
        Readiness::TimedOut
    }

    /// Sends the termination signal to the backend. Safe to call more than once.
    pub fn terminate(&self) {
        let child = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut child) = child {
            info!(pid = ?child.id(), "Terminating backend");
            send_terminate(&mut child);
        }
        self.state_tx.send_replace(BackendState::Terminated);
    }

    /// Terminates the backend when the process receives Ctrl-C (or SIGTERM on unix).
    /// The hook does not keep the supervisor alive.
    pub fn install_shutdown_hook(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::downgrade(self);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received");
            if let Some(supervisor) = supervisor.upgrade() {
                supervisor.terminate();
            }
        })
    }
}

impl std::fmt::Debug for BackendSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSupervisor")
            .field("health_url", &self.health_url)
            .field("program", &self.program)
            .field("state", &self.current_state())
            .finish()
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        if self.current_state() != BackendState::Terminated {
            debug!("Dropping BackendSupervisor, terminating backend.");
            self.terminate();
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        debug!("Backend already exited");
        return;
    };
    // SIGTERM lets the server close its sockets; fall back to a hard kill
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(
            pid,
            error = %std::io::Error::last_os_error(),
            "SIGTERM failed, killing backend"
        );
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill backend");
    }
}

async fn forward_backend_output(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "backend", "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Backend output stream closed");
                break;
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler, using Ctrl-C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}
