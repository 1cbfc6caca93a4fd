use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Engine and tenant settings, read from `SALONBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
    /// Attempts to enter a staff-day's exclusive section before giving up.
    pub lock_attempts: u32,
    /// Longest single wait for the exclusive section.
    pub lock_wait: Duration,
    /// First backoff between attempts; doubles each retry.
    pub lock_backoff: Duration,
    pub reject_past_bookings: bool,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            lock_attempts: 5,
            lock_wait: Duration::from_millis(50),
            lock_backoff: Duration::from_millis(2),
            reject_past_bookings: false,
            metrics_port: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("SALONBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: env_parse("SALONBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            lock_attempts: env_parse::<u32>("SALONBOOK_LOCK_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.lock_attempts),
            lock_wait: env_parse("SALONBOOK_LOCK_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_wait),
            lock_backoff: env_parse("SALONBOOK_LOCK_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_backoff),
            reject_past_bookings: env_parse("SALONBOOK_REJECT_PAST")
                .unwrap_or(defaults.reject_past_bookings),
            metrics_port: env_parse("SALONBOOK_METRICS_PORT"),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}
