use thiserror::Error;

pub const MAX_IMAGE_BYTES: u64 = 25 * 1024 * 1024;
pub const MIN_PASSWORD_LEN: usize = 6;

/// User input problems caught before any request is sent.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No images staged for upload.")]
    NoStagedFiles,
    #[error("Session ID not found. Please log in again.")]
    MissingSession,
    #[error("Session expired. Please log in again.")]
    SessionExpired,
    #[error("Not logged in.")]
    NotAuthenticated,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("{name} is not a supported image (JPEG, PNG, WebP).")]
    UnsupportedImage { name: String },
    #[error("{name} exceeds the 25MB size limit.")]
    ImageTooLarge { name: String },
    #[error("No image selected.")]
    NoCurrentImage,
    #[error("{name} is already marked as poor quality.")]
    AlreadyMarked { name: String },
    #[error("Images classed as '{class}' cannot be marked as poor quality.")]
    UnsupportedTargetClass { class: String },
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    if !is_reasonable_email(email.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

fn is_reasonable_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    parts.next().is_none()
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// MIME type for the image extensions the detector accepts.
pub fn image_content_type(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Checks a file before staging and returns its content type.
pub fn validate_image(name: &str, size_bytes: u64) -> Result<&'static str, ValidationError> {
    let content_type =
        image_content_type(name).ok_or_else(|| ValidationError::UnsupportedImage {
            name: name.to_string(),
        })?;
    if size_bytes > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge {
            name: name.to_string(),
        });
    }
    Ok(content_type)
}
