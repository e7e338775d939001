//! Pure state-transition layer for the dugong monitoring client.
//!
//! Nothing in this crate performs I/O or reads the clock: callers pass
//! timestamps in and persist the containers themselves after each transition.

mod auth;
mod countdown;
mod dates;
mod images;
mod upload;
mod validation;

pub use auth::{AuthRecord, AuthSession, PLACEHOLDER_EMAIL, PLACEHOLDER_NAME};
pub use countdown::{
    format_remaining, remaining_secs, ExpiryLatch, TimerUrgency, SESSION_DURATION_SECS,
};
pub use dates::{extract_formatted_date, DATE_NOT_FOUND};
pub use images::{DetectionResult, ImageResultSet, ImageSnapshot, ResultsEnvelope, UNKNOWN_CLASS};
pub use upload::{PendingFile, UploadRecord, UploadSession, UploadStatus};
pub use validation::{
    image_content_type, validate_credentials, validate_image, ValidationError,
    MAX_IMAGE_BYTES, MIN_PASSWORD_LEN,
};
