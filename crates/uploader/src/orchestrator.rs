use bytes::Bytes;
use dugong_client_sdk::{
    ImageResultSet, UploadSession, UploadStatus, ValidationError, SESSION_DURATION_SECS,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::api::{ApiError, DetectionApi, UploadPart};
use crate::config::PollPolicy;
use crate::session_timer::now_ms;
use crate::store::{StateStore, StoreError};

const UPLOAD_FAILED_FALLBACK: &str = "Upload failed. Please try again.";

/// Upper bound on holding the baseline read back for the backfill request.
const BACKFILL_DISPATCH_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Uploading,
    BackfillRequested,
    Polling,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{message}")]
    UploadTransport {
        message: String,
        #[source]
        source: ApiError,
    },
    #[error("backfill request failed: {0}")]
    Backfill(#[source] ApiError),
    #[error("session metadata unavailable: {0}")]
    MetadataFetch(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one upload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub session_id: String,
    pub files_uploaded: usize,
    pub baseline_results: usize,
    pub final_results: usize,
    pub attempts: u32,
}

/// Drives `Idle -> Uploading -> BackfillRequested -> Polling -> Idle`.
pub struct Orchestrator<A> {
    api: Arc<A>,
    policy: PollPolicy,
    session_duration_secs: u64,
    phase: watch::Sender<CyclePhase>,
}

impl<A> Orchestrator<A>
where
    A: DetectionApi + 'static,
{
    pub fn new(api: Arc<A>, policy: PollPolicy) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            api,
            policy,
            session_duration_secs: SESSION_DURATION_SECS,
            phase,
        }
    }

    pub fn with_session_duration(mut self, secs: u64) -> Self {
        self.session_duration_secs = secs;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: PollPolicy) {
        self.policy = policy;
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Uploads every staged file, requests a backfill, then polls the session
    /// until the attempt budget is spent. Always ends back in `Idle`.
    pub async fn run_cycle(
        &self,
        upload: &mut UploadSession,
        images: &mut ImageResultSet,
        store: &StateStore,
    ) -> Result<CycleReport, OrchestratorError> {
        let result = self.drive(upload, images, store).await;
        self.enter(CyclePhase::Idle);
        result
    }

    async fn drive(
        &self,
        upload: &mut UploadSession,
        images: &mut ImageResultSet,
        store: &StateStore,
    ) -> Result<CycleReport, OrchestratorError> {
        if upload.files().is_empty() {
            return Err(ValidationError::NoStagedFiles.into());
        }
        let client_session_id = upload
            .session_id()
            .map(str::to_string)
            .ok_or(ValidationError::MissingSession)?;
        if upload.remaining_secs(now_ms(), self.session_duration_secs) == Some(0) {
            return Err(ValidationError::SessionExpired.into());
        }

        self.enter(CyclePhase::Uploading);
        upload.reset_session_timer(now_ms());
        store.save_upload(upload)?;
        upload.mark_all(UploadStatus::Uploading, None);

        let parts: Vec<UploadPart> = upload
            .files()
            .iter()
            .map(|f| UploadPart {
                file_name: f.name.clone(),
                content_type: f.content_type.to_string(),
                data: Bytes::from(f.data.clone()),
            })
            .collect();
        let staged = parts.len();
        info!(session_id = %client_session_id, files = staged, "uploading batch");

        let response = match self.api.upload_batch(&client_session_id, parts).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.user_message(UPLOAD_FAILED_FALLBACK);
                warn!(session_id = %client_session_id, error = %e, "batch upload failed");
                upload.mark_all(UploadStatus::Error, Some(&message));
                return Err(OrchestratorError::UploadTransport { message, source: e });
            }
        };

        upload.mark_all(UploadStatus::Success, None);
        let session_id = if response.session_id.trim().is_empty() {
            client_session_id
        } else {
            response.session_id.trim().to_string()
        };
        if upload.session_id() != Some(session_id.as_str()) {
            info!(from = ?upload.session_id(), to = %session_id, "server reassigned session");
        }
        upload.set_session_id(&session_id, now_ms());
        upload.clear_files();
        // batch already accepted; persistence failures are only logged
        if let Err(e) = store.save_upload(upload) {
            warn!(session_id = %session_id, error = %e, "failed to persist upload session");
        }
        let files_uploaded = if response.files_uploaded > 0 {
            response.files_uploaded
        } else {
            staged
        };

        self.enter(CyclePhase::BackfillRequested);
        let mut backfill = self.spawn_backfill(&session_id);
        let backfill_pending = timeout(BACKFILL_DISPATCH_WAIT, &mut backfill).await.is_err();
        if backfill_pending {
            debug!(session_id = %session_id, "backfill still running, polling anyway");
        }

        self.enter(CyclePhase::Polling);
        let baseline_results = self.fetch_session_metadata(&session_id, images, store).await;
        info!(session_id = %session_id, baseline = baseline_results, "polling for detections");

        let mut final_results = baseline_results;
        for attempt in 1..=self.policy.attempts {
            sleep(self.policy.interval).await;
            final_results = self.fetch_session_metadata(&session_id, images, store).await;
            debug!(session_id = %session_id, attempt, results = final_results, "poll attempt");
        }
        info!(
            session_id = %session_id,
            results = images.total_images(),
            attempts = self.policy.attempts,
            "polling finished"
        );
        if backfill_pending {
            if let Err(e) = backfill.await {
                debug!(session_id = %session_id, error = %e, "backfill task ended abnormally");
            }
        }

        Ok(CycleReport {
            session_id,
            files_uploaded,
            baseline_results,
            final_results,
            attempts: self.policy.attempts,
        })
    }

    fn spawn_backfill(&self, session_id: &str) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            match api.backfill_detections(&session_id).await {
                Ok(()) => debug!(session_id = %session_id, "backfill accepted"),
                Err(e) => {
                    let e = OrchestratorError::Backfill(e);
                    warn!(session_id = %session_id, error = %e, "backfill ignored");
                }
            }
        })
    }

    /// Replaces the result set with the latest server snapshot.
    ///
    /// Returns the number of results now held, or 0 when the fetch failed
    /// and the previous state was left untouched.
    pub async fn fetch_session_metadata(
        &self,
        session_id: &str,
        images: &mut ImageResultSet,
        store: &StateStore,
    ) -> usize {
        match self.try_fetch(session_id, images).await {
            Ok(count) => {
                if let Err(e) = store.save_images(images) {
                    warn!(error = %e, "failed to persist image results");
                }
                count
            }
            Err(e) => {
                debug!(session_id, error = %e, "metadata fetch skipped");
                0
            }
        }
    }

    async fn try_fetch(
        &self,
        session_id: &str,
        images: &mut ImageResultSet,
    ) -> Result<usize, OrchestratorError> {
        let status = self
            .api
            .session_status(session_id)
            .await
            .map_err(|e| OrchestratorError::MetadataFetch(e.to_string()))?;
        if !status.success {
            return Err(OrchestratorError::MetadataFetch(
                "server reported an unsuccessful status".to_string(),
            ));
        }
        images.replace_results(&status.files, status.last_activity.as_deref());
        Ok(images.total_images())
    }

    fn enter(&self, phase: CyclePhase) {
        self.phase.send_replace(phase);
    }
}
