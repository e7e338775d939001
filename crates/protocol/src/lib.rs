use serde::{Deserialize, Serialize};

pub const LOGIN_FAILED_FALLBACK: &str = "Login failed. Please check your credentials.";
pub const NETWORK_FAILURE_MESSAGE: &str = "Network error. Please try again.";

/// HTTP verbs used by the detection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Every backend route the client talks to.
///
/// Paths are expressed as segments so the HTTP layer can percent-encode
/// caller-supplied parts (session ids, e-mail addresses) correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Login,
    UploadBatch,
    Backfill { session_id: &'a str },
    SessionStatus { session_id: &'a str },
    ExportCsv { session_id: &'a str },
    MarkPoorQuality,
    CleanupSessions { email: &'a str },
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::SessionStatus { .. } | Endpoint::ExportCsv { .. } => Method::Get,
            _ => Method::Post,
        }
    }

    pub fn segments(&self) -> Vec<&'a str> {
        match *self {
            Endpoint::Login => vec!["auth", "login"],
            Endpoint::UploadBatch => vec!["upload-multiple"],
            Endpoint::Backfill { session_id } => vec!["api", "backfill-detections", session_id],
            Endpoint::SessionStatus { session_id } => vec!["api", "session-status", session_id],
            Endpoint::ExportCsv { session_id } => vec!["export-session-csv", session_id],
            Endpoint::MarkPoorQuality => vec!["move-to-false-positive"],
            Endpoint::CleanupSessions { email } => vec!["cleanup-sessions", email],
        }
    }

    /// FastAPI registers these routes with a trailing slash.
    pub fn trailing_slash(&self) -> bool {
        matches!(self, Endpoint::UploadBatch | Endpoint::MarkPoorQuality)
    }

    /// Path as it appears in the route table, e.g. `/api/session-status/S1`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in self.segments() {
            path.push('/');
            path.push_str(segment);
        }
        if self.trailing_slash() {
            path.push('/');
        }
        path
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// The backend stores addresses lowercased, so the request must match.
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub access_token: Option<String>,
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
}

impl LoginResponse {
    /// `access_token` wins over the legacy `token` field; empty strings count as absent.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.as_deref().filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub session_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub files_uploaded: usize,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionFile {
    pub filename: String,
    pub created_at: Option<String>,
    pub dugong_count: Option<u32>,
    pub calf_count: Option<u32>,
    pub image_class: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStatus {
    pub success: bool,
    pub session_id: Option<String>,
    pub last_activity: Option<String>,
    pub remaining_seconds: Option<i64>,
    pub is_expired: Option<bool>,
    pub file_count: Option<usize>,
    pub files: Vec<SessionFile>,
}

/// Classes the false-positive bucket accepts as a move target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetClass {
    Feeding,
    Resting,
}

impl TargetClass {
    pub fn from_image_class(class: &str) -> Option<Self> {
        match class.trim().to_ascii_lowercase().as_str() {
            "feeding" => Some(TargetClass::Feeding),
            "resting" => Some(TargetClass::Resting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkPoorQualityRequest {
    pub session_id: String,
    pub image_name: String,
    pub target_class: TargetClass,
}

/// Structured error payload. FastAPI reports `detail`, other layers use
/// `message` or `error`; validation failures put a list in `detail`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn humanize(&self, fallback: &str) -> String {
        let detail = self.detail.as_ref().and_then(|d| d.as_str());
        [self.message.as_deref(), detail, self.error.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Best-effort extraction of a readable message from a raw error response.
pub fn humanize_error_body(body: &[u8], fallback: &str) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.humanize(fallback),
        Err(_) => fallback.to_string(),
    }
}

pub fn export_file_name(session_id: &str) -> String {
    format!("session_{session_id}_metadata.csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths_match_route_table() {
        assert_eq!(Endpoint::Login.path(), "/auth/login");
        assert_eq!(Endpoint::UploadBatch.path(), "/upload-multiple/");
        assert_eq!(
            Endpoint::Backfill { session_id: "S1" }.path(),
            "/api/backfill-detections/S1"
        );
        assert_eq!(
            Endpoint::SessionStatus { session_id: "S1" }.path(),
            "/api/session-status/S1"
        );
        assert_eq!(
            Endpoint::ExportCsv { session_id: "S1" }.path(),
            "/export-session-csv/S1"
        );
        assert_eq!(Endpoint::MarkPoorQuality.path(), "/move-to-false-positive/");
        assert_eq!(
            Endpoint::CleanupSessions { email: "a@b.co" }.path(),
            "/cleanup-sessions/a@b.co"
        );
        assert_eq!(Endpoint::SessionStatus { session_id: "S1" }.method(), Method::Get);
        assert_eq!(Endpoint::Backfill { session_id: "S1" }.method(), Method::Post);
    }

    #[test]
    fn login_request_lowercases_email() {
        let req = LoginRequest::new("  Ranger@Reef.ORG ", "secret1");
        assert_eq!(req.email, "ranger@reef.org");
        assert_eq!(req.password, "secret1");
    }

    #[test]
    fn bearer_prefers_access_token() {
        let resp: LoginResponse =
            serde_json::from_str(r#"{"access_token":"abc","token":"old","session_id":"S1"}"#)
                .unwrap();
        assert_eq!(resp.bearer(), Some("abc"));
        assert_eq!(resp.session_id.as_deref(), Some("S1"));

        let legacy: LoginResponse = serde_json::from_str(r#"{"access_token":"","token":"old"}"#).unwrap();
        assert_eq!(legacy.bearer(), Some("old"));

        let none: LoginResponse = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert_eq!(none.bearer(), None);
    }

    #[test]
    fn session_status_tolerates_missing_fields() {
        let status: SessionStatus = serde_json::from_str(
            r#"{"success":true,"files":[{"filename":"a_20230601.jpg","dugongCount":2,"calfCount":1}]}"#,
        )
        .unwrap();
        assert!(status.success);
        assert_eq!(status.files.len(), 1);
        assert_eq!(status.files[0].dugong_count, Some(2));
        assert_eq!(status.files[0].image_class, None);
        assert_eq!(status.last_activity, None);
    }

    #[test]
    fn humanize_picks_first_readable_field() {
        assert_eq!(
            humanize_error_body(br#"{"detail":"Incorrect password"}"#, LOGIN_FAILED_FALLBACK),
            "Incorrect password"
        );
        assert_eq!(
            humanize_error_body(br#"{"message":"m","detail":"d"}"#, LOGIN_FAILED_FALLBACK),
            "m"
        );
        assert_eq!(
            humanize_error_body(br#"{"detail":[{"loc":["body"]}]}"#, LOGIN_FAILED_FALLBACK),
            LOGIN_FAILED_FALLBACK
        );
        assert_eq!(humanize_error_body(b"<html>", "fallback"), "fallback");
    }

    #[test]
    fn mark_request_serializes_camel_case() {
        let req = MarkPoorQualityRequest {
            session_id: "S1".into(),
            image_name: "a.jpg".into(),
            target_class: TargetClass::Feeding,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sessionId":"S1","imageName":"a.jpg","targetClass":"feeding"})
        );
        assert_eq!(TargetClass::from_image_class(" Resting"), Some(TargetClass::Resting));
        assert_eq!(TargetClass::from_image_class("unknown"), None);
    }
}
