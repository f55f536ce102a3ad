use once_cell::sync::Lazy;
use std::{env, path::PathBuf, time::Duration};

/// Holds all tunables. `Default` carries the reference values,
/// `from_env` overlays environment variables (and a `.env` file) on top.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_base_url: String,
    pub backend_program: PathBuf,
    pub backend_script: PathBuf,
    pub backend_resource_dir: PathBuf,
    pub health_poll_interval: Duration,
    pub health_poll_attempts: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub skip_segments_base_url: String,
    pub max_retries: u32,
    pub confirmation_window: Duration,
    pub skip_tick_interval: Duration,
    pub skip_overshoot_secs: f64,
    pub progress_save_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_base_url: "http://127.0.0.1:8777".to_string(),
            backend_program: PathBuf::from("resources/bin/python3"),
            backend_script: PathBuf::from("resources/main.py"),
            backend_resource_dir: PathBuf::from("resources"),
            // 100ms x 50, roughly five seconds before giving up on readiness
            health_poll_interval: Duration::from_millis(100),
            health_poll_attempts: 50,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            skip_segments_base_url: "https://sponsor.ajay.app".to_string(),
            max_retries: 100,
            confirmation_window: Duration::from_secs(3),
            skip_tick_interval: Duration::from_secs(1),
            skip_overshoot_secs: 2.0,
            progress_save_interval: Duration::from_secs(10),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();

        fn parse_string(var: &str, default: String) -> String {
            env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or(default)
        }

        fn parse_path(var: &str, default: PathBuf) -> PathBuf {
            env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        }

        fn parse_u32(var: &str, default: u32) -> u32 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_f64(var: &str, default: f64) -> f64 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        // helper to parse seconds into Duration
        fn parse_secs(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }

        // helper to parse millis into Duration
        fn parse_millis(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }

        Settings {
            backend_base_url: parse_string("BACKEND_BASE_URL", defaults.backend_base_url),
            backend_program: parse_path("BACKEND_PROGRAM", defaults.backend_program),
            backend_script: parse_path("BACKEND_SCRIPT", defaults.backend_script),
            backend_resource_dir: parse_path(
                "BACKEND_RESOURCE_DIR",
                defaults.backend_resource_dir,
            ),
            health_poll_interval: parse_millis(
                "HEALTH_POLL_INTERVAL_MS",
                defaults.health_poll_interval,
            ),
            health_poll_attempts: parse_u32("HEALTH_POLL_ATTEMPTS", defaults.health_poll_attempts),
            request_timeout: parse_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            connect_timeout: parse_secs("CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            skip_segments_base_url: parse_string(
                "SKIP_SEGMENTS_BASE_URL",
                defaults.skip_segments_base_url,
            ),
            max_retries: parse_u32("PLAYBACK_MAX_RETRIES", defaults.max_retries),
            confirmation_window: parse_millis(
                "CONFIRMATION_WINDOW_MS",
                defaults.confirmation_window,
            ),
            skip_tick_interval: parse_millis("SKIP_TICK_INTERVAL_MS", defaults.skip_tick_interval),
            skip_overshoot_secs: parse_f64("SKIP_OVERSHOOT_SECS", defaults.skip_overshoot_secs),
            progress_save_interval: parse_secs(
                "PROGRESS_SAVE_INTERVAL_SECS",
                defaults.progress_save_interval,
            ),
        }
    }

    /// Directory handed to the backend interpreter as `PYTHONPATH`.
    pub fn backend_python_path(&self) -> PathBuf {
        self.backend_resource_dir.join("site-packages")
    }

    /// Trust store handed to the backend as `SSL_CERT_FILE`.
    pub fn backend_cert_file(&self) -> PathBuf {
        self.backend_resource_dir.join("cert.pem")
    }
}

/// Process-wide settings, read once from the environment.
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
