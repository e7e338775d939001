use dugong_client_sdk::{
    validate_credentials, validate_image, AuthSession, DetectionResult, ImageResultSet,
    PendingFile, TimerUrgency, UploadSession, ValidationError, PLACEHOLDER_EMAIL, PLACEHOLDER_NAME,
};
use dugong_protocol::{
    export_file_name, LoginRequest, MarkPoorQualityRequest, TargetClass, LOGIN_FAILED_FALLBACK,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, DetectionApi};
use crate::config::ClientConfig;
use crate::orchestrator::{CycleReport, Orchestrator, OrchestratorError};
use crate::session_timer::{now_ms, SessionTimer};
use crate::store::{StateStore, StoreError};

const NO_TOKEN_MESSAGE: &str = "Login failed: No access token received";
const EXPORT_FAILED_MESSAGE: &str = "Failed to export CSV";
const MARK_FAILED_FALLBACK: &str = "Failed to move image";

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: Option<ApiError>,
    },
    #[error(transparent)]
    Cycle(#[from] OrchestratorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    fn rejected(source: ApiError, fallback: &str) -> Self {
        DashboardError::Rejected {
            message: source.user_message(fallback),
            source: Some(source),
        }
    }
}

/// Result of staging a set of paths for upload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub staged: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub remaining_secs: u64,
    pub urgency: TimerUrgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Expired,
    Stopped,
    NoSession,
}

/// Owns the auth, upload and result containers for one client session.
///
/// Every transition goes through here so the persisted records always
/// match the in-memory state.
pub struct Dashboard<A> {
    api: Arc<A>,
    store: StateStore,
    orchestrator: Orchestrator<A>,
    auth: AuthSession,
    upload: UploadSession,
    images: ImageResultSet,
    session_duration_secs: u64,
}

impl<A> Dashboard<A>
where
    A: DetectionApi + 'static,
{
    /// Restores persisted state, recovers the mirrored credential when the
    /// auth record has no token, and adopts the auth-issued session id.
    pub fn open(
        api: Arc<A>,
        store: StateStore,
        config: &ClientConfig,
    ) -> Result<Self, DashboardError> {
        let now = now_ms();
        let mut auth = store.load_auth()?;
        let mut upload = store.load_upload()?;
        let images = store.load_images()?;

        if auth.token().is_none() {
            if let Some(token) = store.load_credential(now)? {
                debug!("restored credential from cookie mirror");
                auth.set_token(&token);
                store.save_auth(&auth)?;
            }
        }
        if upload.sync_from_auth(auth.server_session_id(), now) {
            store.save_upload(&upload)?;
        }

        let orchestrator = Orchestrator::new(Arc::clone(&api), config.poll)
            .with_session_duration(config.session_duration_secs);
        Ok(Self {
            api,
            store,
            orchestrator,
            auth,
            upload,
            images,
            session_duration_secs: config.session_duration_secs,
        })
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn upload(&self) -> &UploadSession {
        &self.upload
    }

    pub fn images(&self) -> &ImageResultSet {
        &self.images
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator<A> {
        &mut self.orchestrator
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), DashboardError> {
        validate_credentials(email, password)?;
        let request = LoginRequest::new(email, password);
        let response = self
            .api
            .login(&request)
            .await
            .map_err(|e| DashboardError::rejected(e, LOGIN_FAILED_FALLBACK))?;
        let Some(token) = response.bearer() else {
            return Err(DashboardError::Rejected {
                message: NO_TOKEN_MESSAGE.to_string(),
                source: None,
            });
        };

        let now = now_ms();
        self.auth.login(
            token,
            response.username.as_deref().unwrap_or(PLACEHOLDER_NAME),
            response.email.as_deref().unwrap_or(PLACEHOLDER_EMAIL),
            response.session_id.as_deref(),
        );
        self.store.save_credential(token, now)?;
        self.store.save_auth(&self.auth)?;
        if self.upload.sync_from_auth(self.auth.server_session_id(), now) {
            self.store.save_upload(&self.upload)?;
        }
        info!(
            email = %self.auth.display_email(),
            session_id = ?self.auth.server_session_id(),
            "logged in"
        );
        Ok(())
    }

    /// Ends the session: best-effort server cleanup, then every container and
    /// every persisted record is cleared.
    pub async fn logout(&mut self) -> Result<(), DashboardError> {
        let session_id = self
            .upload
            .session_id()
            .or(self.auth.server_session_id())
            .map(str::to_string);
        if let (Some(email), Some(session_id)) = (self.auth.email(), session_id.as_deref()) {
            if let Err(e) = self.api.cleanup_session(email, session_id).await {
                warn!(session_id, error = %e, "session cleanup ignored");
            }
        }

        self.auth.clear();
        self.upload.clear();
        self.images.clear();
        self.store.clear_all()?;
        info!("logged out");
        Ok(())
    }

    /// Runs the logout cascade when the countdown ran out while the client
    /// was closed. Returns whether the session is still usable.
    pub async fn ensure_live(&mut self) -> Result<bool, DashboardError> {
        match self.countdown(now_ms()) {
            Some(countdown) if countdown.remaining_secs == 0 => {
                info!(session_id = ?self.upload.session_id(), "session expired while idle");
                self.logout().await?;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    /// Reads and stages image files. Unreadable, unsupported or oversized
    /// files are skipped and reported; they do not fail the batch.
    pub async fn stage_files<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<StageReport, DashboardError> {
        let mut report = StageReport::default();
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let size = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable file");
                    report.skipped.push((name, e.to_string()));
                    continue;
                }
            };
            if let Err(e) = validate_image(&name, size) {
                warn!(file = %name, reason = %e, "skipping file");
                report.skipped.push((name, e.to_string()));
                continue;
            }
            let data = match tokio::fs::read(path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable file");
                    report.skipped.push((name, e.to_string()));
                    continue;
                }
            };
            match PendingFile::new(&name, data) {
                Ok(file) => {
                    debug!(file = %name, id = %file.id, "staged");
                    self.upload.add_file(file);
                    report.staged.push(name);
                }
                Err(e) => report.skipped.push((name, e.to_string())),
            }
        }
        Ok(report)
    }

    pub fn unstage(&mut self, id: &str) -> bool {
        self.upload.remove_file(id)
    }

    pub async fn confirm_upload(&mut self) -> Result<CycleReport, DashboardError> {
        if !self.ensure_live().await? {
            return Err(ValidationError::SessionExpired.into());
        }
        let report = self
            .orchestrator
            .run_cycle(&mut self.upload, &mut self.images, &self.store)
            .await?;
        Ok(report)
    }

    /// One metadata read for the active session; the dashboard-load fetch.
    pub async fn refresh(&mut self) -> usize {
        let Some(session_id) = self.upload.session_id().map(str::to_string) else {
            return 0;
        };
        self.orchestrator
            .fetch_session_metadata(&session_id, &mut self.images, &self.store)
            .await
    }

    /// Serves the persisted result set, going to the server only when asked
    /// to or when nothing has been fetched yet. Browsing position survives
    /// unless a fetch actually happens.
    pub async fn load_results(&mut self, force: bool) -> usize {
        if force || self.images.total_images() == 0 {
            self.refresh().await;
        }
        self.images.total_images()
    }

    pub fn current(&self) -> Option<&DetectionResult> {
        self.images.current_item()
    }

    pub fn next(&mut self) -> Result<(), DashboardError> {
        self.images.go_next();
        self.store.save_images(&self.images)?;
        Ok(())
    }

    pub fn previous(&mut self) -> Result<(), DashboardError> {
        self.images.go_previous();
        self.store.save_images(&self.images)?;
        Ok(())
    }

    pub fn select(&mut self, position: usize) -> Result<(), DashboardError> {
        self.images.select(position);
        self.store.save_images(&self.images)?;
        Ok(())
    }

    /// Downloads the session CSV into `dir` and returns the written path.
    pub async fn export_csv(&self, dir: &Path) -> Result<PathBuf, DashboardError> {
        let session_id = self.upload.session_id().ok_or(ValidationError::MissingSession)?;
        let csv = self
            .api
            .export_session_csv(session_id)
            .await
            .map_err(|e| {
                warn!(session_id, error = %e, "csv export failed");
                DashboardError::Rejected {
                    message: EXPORT_FAILED_MESSAGE.to_string(),
                    source: Some(e),
                }
            })?;
        let path = dir.join(export_file_name(session_id));
        tokio::fs::write(&path, &csv).await?;
        info!(path = %path.display(), bytes = csv.len(), "exported session metadata");
        Ok(path)
    }

    /// Moves the current image to the false-positive bucket. Returns its name.
    pub async fn mark_poor_quality(&mut self) -> Result<String, DashboardError> {
        let current = self.images.current_item().ok_or(ValidationError::NoCurrentImage)?;
        let session_id = self.upload.session_id().ok_or(ValidationError::MissingSession)?;
        let image_name = current.image_name().to_string();
        if self.images.is_marked_poor(&image_name) {
            return Err(ValidationError::AlreadyMarked { name: image_name }.into());
        }
        let target_class = TargetClass::from_image_class(&current.image_class).ok_or_else(|| {
            ValidationError::UnsupportedTargetClass {
                class: current.image_class.clone(),
            }
        })?;

        let request = MarkPoorQualityRequest {
            session_id: session_id.to_string(),
            image_name: image_name.clone(),
            target_class,
        };
        self.api
            .mark_poor_quality(&request)
            .await
            .map_err(|e| DashboardError::rejected(e, MARK_FAILED_FALLBACK))?;

        self.images.mark_poor(&image_name);
        self.store.save_images(&self.images)?;
        info!(image = %image_name, ?target_class, "marked poor quality");
        Ok(image_name)
    }

    pub fn countdown(&self, now_ms: i64) -> Option<Countdown> {
        let remaining_secs = self.upload.remaining_secs(now_ms, self.session_duration_secs)?;
        Some(Countdown {
            remaining_secs,
            urgency: TimerUrgency::from_remaining(remaining_secs),
        })
    }

    /// Runs the session countdown until it expires or `shutdown` resolves.
    /// Expiry triggers the logout cascade exactly once.
    pub async fn watch<F, S>(
        &mut self,
        mut on_tick: F,
        shutdown: S,
    ) -> Result<WatchOutcome, DashboardError>
    where
        F: FnMut(Countdown),
        S: Future<Output = ()>,
    {
        let Some(started_at_ms) = self
            .upload
            .session_id()
            .and(self.upload.started_at_ms())
        else {
            return Ok(WatchOutcome::NoSession);
        };

        let (mut timer, mut expired) = SessionTimer::start(started_at_ms, self.session_duration_secs);
        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                Some(()) = expired.recv() => break WatchOutcome::Expired,
                ticked = timer.tick() => {
                    if !ticked {
                        break WatchOutcome::Stopped;
                    }
                    let remaining_secs = timer.remaining();
                    on_tick(Countdown {
                        remaining_secs,
                        urgency: TimerUrgency::from_remaining(remaining_secs),
                    });
                }
                _ = &mut shutdown => break WatchOutcome::Stopped,
            }
        };
        timer.stop();

        if outcome == WatchOutcome::Expired {
            self.logout().await?;
        }
        Ok(outcome)
    }
}
