use dugong_client_sdk::SESSION_DURATION_SECS;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_DATA_DIR: &str = "./dugong-data";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the orchestrator keeps re-reading session metadata after a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_secs(2),
        }
    }
}

impl PollPolicy {
    pub fn with_overrides(mut self, attempts: Option<u32>, interval_ms: Option<u64>) -> Self {
        if let Some(attempts) = attempts {
            self.attempts = attempts;
        }
        if let Some(ms) = interval_ms {
            self.interval = Duration::from_millis(ms);
        }
        self
    }

    /// Wall time the loop takes to exhaust its attempts, excluding request latency.
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub session_duration_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_DATA_DIR)
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_url: api_url.into(),
            data_dir: data_dir.into(),
            request_timeout: REQUEST_TIMEOUT,
            poll: PollPolicy::default(),
            session_duration_secs: SESSION_DURATION_SECS,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}
