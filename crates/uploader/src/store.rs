use dugong_client_sdk::{AuthRecord, AuthSession, ImageResultSet, ImageSnapshot, UploadRecord, UploadSession};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const AUTH_KEY: &str = "auth-storage";
pub const UPLOAD_KEY: &str = "upload-store";
pub const IMAGE_KEY: &str = "image-storage";
pub const CREDENTIAL_KEY: &str = "cookie:access_token";

const CREDENTIAL_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state database: {0}")]
    Sled(#[from] sled::Error),
    #[error("state encoding: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Token mirror with cookie semantics: 7-day lifetime, strict same-site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub value: String,
    pub expires_at_ms: i64,
    pub same_site: String,
}

impl CredentialRecord {
    pub fn issue(value: &str, now_ms: i64) -> Self {
        Self {
            value: value.to_string(),
            expires_at_ms: now_ms.saturating_add(CREDENTIAL_TTL_MS),
            same_site: "Strict".to_string(),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Durable home of the three client records. Every write replaces a whole record.
pub struct StateStore {
    db: Db,
    #[cfg(test)]
    reject_writes: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl StateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_db(sled::open(path)?))
    }

    /// Throwaway store that vanishes on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Self::from_db(sled::Config::new().temporary(true).open()?))
    }

    fn from_db(db: Db) -> Self {
        Self {
            db,
            #[cfg(test)]
            reject_writes: Default::default(),
        }
    }

    /// Switch that makes every later record write fail while set.
    #[cfg(test)]
    pub(crate) fn write_switch(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        std::sync::Arc::clone(&self.reject_writes)
    }

    pub fn load_auth(&self) -> Result<AuthSession, StoreError> {
        Ok(AuthSession::from_record(self.load::<AuthRecord>(AUTH_KEY)?))
    }

    pub fn save_auth(&self, auth: &AuthSession) -> Result<(), StoreError> {
        self.save(AUTH_KEY, &auth.to_record())
    }

    pub fn load_upload(&self) -> Result<UploadSession, StoreError> {
        Ok(UploadSession::from_record(self.load::<UploadRecord>(UPLOAD_KEY)?))
    }

    pub fn save_upload(&self, upload: &UploadSession) -> Result<(), StoreError> {
        self.save(UPLOAD_KEY, &upload.to_record())
    }

    pub fn load_images(&self) -> Result<ImageResultSet, StoreError> {
        Ok(ImageResultSet::from_snapshot(self.load::<ImageSnapshot>(IMAGE_KEY)?))
    }

    pub fn save_images(&self, images: &ImageResultSet) -> Result<(), StoreError> {
        self.save(IMAGE_KEY, &images.to_snapshot())
    }

    pub fn save_credential(&self, token: &str, now_ms: i64) -> Result<(), StoreError> {
        self.save(CREDENTIAL_KEY, &CredentialRecord::issue(token, now_ms))
    }

    /// Unexpired mirrored token, if any. Expired records are dropped on read.
    pub fn load_credential(&self, now_ms: i64) -> Result<Option<String>, StoreError> {
        let Some(raw) = self.db.get(CREDENTIAL_KEY)? else {
            return Ok(None);
        };
        let record = match serde_json::from_slice::<CredentialRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = CREDENTIAL_KEY, error = %e, "discarding unreadable credential");
                self.db.remove(CREDENTIAL_KEY)?;
                return Ok(None);
            }
        };
        if record.is_expired(now_ms) {
            self.db.remove(CREDENTIAL_KEY)?;
            return Ok(None);
        }
        Ok(Some(record.value))
    }

    /// Removes every client record in one atomic batch.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for key in [AUTH_KEY, UPLOAD_KEY, IMAGE_KEY, CREDENTIAL_KEY] {
            batch.remove(key);
        }
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.db.contains_key(key)?)
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        let Some(raw) = self.db.get(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable record");
                Ok(T::default())
            }
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        #[cfg(test)]
        if self.reject_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(sled::Error::Unsupported("writes rejected".into()).into());
        }
        let encoded = serde_json::to_vec(value)?;
        self.db.insert(key, encoded)?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dugong_protocol::SessionFile;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn empty_store_yields_defaults() {
        let store = StateStore::temporary().unwrap();
        assert_eq!(store.load_auth().unwrap(), AuthSession::default());
        assert_eq!(store.load_upload().unwrap(), UploadSession::default());
        assert_eq!(store.load_images().unwrap(), ImageResultSet::default());
        assert_eq!(store.load_credential(NOW).unwrap(), None);
    }

    #[test]
    fn records_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path()).unwrap();
            let mut auth = AuthSession::new();
            auth.login("abc", "Ranger", "r@reef.org", Some("S1"));
            store.save_auth(&auth).unwrap();

            let mut upload = UploadSession::new();
            upload.set_session_id("S1", NOW);
            store.save_upload(&upload).unwrap();

            let mut images = ImageResultSet::new();
            images.replace_results(
                &[SessionFile {
                    filename: "a_20230601.jpg".into(),
                    dugong_count: Some(3),
                    ..SessionFile::default()
                }],
                None,
            );
            store.save_images(&images).unwrap();
        }

        let store = StateStore::open(dir.path()).unwrap();
        let auth = store.load_auth().unwrap();
        assert!(auth.is_authenticated());
        assert_eq!(auth.server_session_id(), Some("S1"));
        let upload = store.load_upload().unwrap();
        assert_eq!(upload.started_at_ms(), Some(NOW));
        let images = store.load_images().unwrap();
        assert_eq!(images.total_images(), 1);
        assert_eq!(images.current_item().map(|r| r.dugong_count), Some(3));
    }

    #[test]
    fn credential_expires_after_seven_days() {
        let store = StateStore::temporary().unwrap();
        store.save_credential("abc", NOW).unwrap();
        assert_eq!(store.load_credential(NOW + 1_000).unwrap().as_deref(), Some("abc"));
        assert_eq!(store.load_credential(NOW + CREDENTIAL_TTL_MS).unwrap(), None);
        assert!(!store.contains(CREDENTIAL_KEY).unwrap());
    }

    #[test]
    fn clear_all_removes_every_key() {
        let store = StateStore::temporary().unwrap();
        let mut auth = AuthSession::new();
        auth.login("abc", "u", "u@x.io", None);
        store.save_auth(&auth).unwrap();
        store.save_upload(&UploadSession::new()).unwrap();
        store.save_images(&ImageResultSet::new()).unwrap();
        store.save_credential("abc", NOW).unwrap();

        store.clear_all().unwrap();
        for key in [AUTH_KEY, UPLOAD_KEY, IMAGE_KEY, CREDENTIAL_KEY] {
            assert!(!store.contains(key).unwrap(), "{key} survived clear_all");
        }
    }

    #[test]
    fn unreadable_record_falls_back_to_default() {
        let store = StateStore::temporary().unwrap();
        store.db.insert(AUTH_KEY, b"{not json".to_vec()).unwrap();
        assert_eq!(store.load_auth().unwrap(), AuthSession::default());
    }
}
