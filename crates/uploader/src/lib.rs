//! Effectful half of the dugong client: HTTP access to the detection
//! backend, local state persistence, the upload/poll cycle and the
//! session countdown.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod orchestrator;
pub mod session_timer;
pub mod store;

pub use api::{ApiError, DetectionApi, HttpDetectionApi, UploadPart};
pub use config::{ClientConfig, PollPolicy, DEFAULT_API_URL, DEFAULT_DATA_DIR};
pub use dashboard::{Countdown, Dashboard, DashboardError, StageReport, WatchOutcome};
pub use orchestrator::{CyclePhase, CycleReport, Orchestrator, OrchestratorError};
pub use session_timer::{now_ms, SessionTimer};
pub use store::{CredentialRecord, StateStore, StoreError};
