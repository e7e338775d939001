use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::countdown::remaining_secs;
use crate::validation::{validate_image, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

/// An image staged for the next batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub id: String,
    pub name: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
    pub progress: u8,
    pub status: UploadStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl PendingFile {
    pub fn new(name: &str, data: Vec<u8>) -> Result<Self, ValidationError> {
        let content_type = validate_image(name, data.len() as u64)?;
        Ok(Self {
            id: random_file_id(),
            name: name.to_string(),
            content_type,
            data,
            progress: 0,
            status: UploadStatus::Pending,
            result_url: None,
            error_message: None,
        })
    }
}

/// Client-side view of the active upload session and its staged files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSession {
    session_id: Option<String>,
    started_at_ms: Option<i64>,
    files: Vec<PendingFile>,
}

/// On-disk shape of the `upload-store` record. Staged file bytes are never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadRecord {
    pub session_id: Option<String>,
    pub session_start_time: Option<i64>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts `id` and restarts the countdown. The only way the timer restarts from scratch.
    pub fn set_session_id(&mut self, id: &str, now_ms: i64) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.session_id = Some(id.to_string());
        self.started_at_ms = Some(now_ms);
    }

    /// Extends the active window; no-op without a session.
    pub fn reset_session_timer(&mut self, now_ms: i64) {
        if self.session_id.is_some() {
            self.started_at_ms = Some(now_ms);
        }
    }

    /// Takes over the auth-issued id once, if this session has none yet.
    pub fn sync_from_auth(&mut self, server_session_id: Option<&str>, now_ms: i64) -> bool {
        if self.session_id.is_some() {
            return false;
        }
        match server_session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                self.set_session_id(id, now_ms);
                true
            }
            None => false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    /// Seconds left before expiry, or `None` when there is no running session.
    pub fn remaining_secs(&self, now_ms: i64, duration_secs: u64) -> Option<u64> {
        self.session_id.as_ref()?;
        let started = self.started_at_ms?;
        Some(remaining_secs(started, now_ms, duration_secs))
    }

    pub fn add_file(&mut self, file: PendingFile) {
        self.files.push(file);
    }

    pub fn remove_file(&mut self, id: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id != id);
        self.files.len() != before
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn file(&self, id: &str) -> Option<&PendingFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn update_progress(&mut self, id: &str, progress: u8) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
            file.progress = progress.min(100);
        }
    }

    pub fn update_status(
        &mut self,
        id: &str,
        status: UploadStatus,
        result_url: Option<String>,
        error_message: Option<String>,
    ) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
            file.status = status;
            file.result_url = result_url;
            file.error_message = error_message;
        }
    }

    /// Applies one status to every staged file; used when a whole batch moves together.
    pub fn mark_all(&mut self, status: UploadStatus, error_message: Option<&str>) {
        for file in &mut self.files {
            file.status = status;
            file.error_message = error_message.map(str::to_string);
            match status {
                UploadStatus::Uploading => file.progress = 0,
                UploadStatus::Success => file.progress = 100,
                UploadStatus::Pending | UploadStatus::Error => {}
            }
        }
    }

    pub fn clear_files(&mut self) {
        self.files.clear();
    }

    /// Drops the session id together with its start stamp and any staged files.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn to_record(&self) -> UploadRecord {
        UploadRecord {
            session_id: self.session_id.clone(),
            session_start_time: self.session_id.as_ref().and(self.started_at_ms),
        }
    }

    pub fn from_record(record: UploadRecord) -> Self {
        let session_id = record.session_id.filter(|id| !id.trim().is_empty());
        let started_at_ms = session_id.as_ref().and(record.session_start_time);
        Self {
            session_id,
            started_at_ms,
            files: Vec::new(),
        }
    }
}

fn random_file_id() -> String {
    let mut id = [0u8; 16];
    OsRng.fill_bytes(&mut id);
    hex::encode(id)
}
