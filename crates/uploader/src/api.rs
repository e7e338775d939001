use async_trait::async_trait;
use bytes::Bytes;
use dugong_protocol::{
    humanize_error_body, Endpoint, LoginRequest, LoginResponse, MarkPoorQualityRequest, Method,
    SessionStatus, UploadResponse, NETWORK_FAILURE_MESSAGE,
};
use reqwest::{multipart, Client, RequestBuilder, Response, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid api url: {0}")]
    Url(String),
}

impl ApiError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(e) if e.is_decode() => fallback.to_string(),
            ApiError::Transport(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            ApiError::Url(_) => fallback.to_string(),
        }
    }
}

/// One image in a multipart batch.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// The detection backend as seen by the client.
#[async_trait]
pub trait DetectionApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;

    async fn upload_batch(
        &self,
        session_id: &str,
        parts: Vec<UploadPart>,
    ) -> Result<UploadResponse, ApiError>;

    async fn backfill_detections(&self, session_id: &str) -> Result<(), ApiError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, ApiError>;

    async fn export_session_csv(&self, session_id: &str) -> Result<Bytes, ApiError>;

    async fn mark_poor_quality(&self, request: &MarkPoorQualityRequest) -> Result<(), ApiError>;

    async fn cleanup_session(&self, email: &str, session_id: &str) -> Result<(), ApiError>;
}

pub struct HttpDetectionApi {
    client: Client,
    base: Url,
}

impl HttpDetectionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::Url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Url(format!("{base_url}: not a base url")));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, endpoint: Endpoint<'_>) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::Url(format!("{}: not a base url", self.base)))?;
            segments.pop_if_empty();
            segments.extend(endpoint.segments());
            if endpoint.trailing_slash() {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn request(&self, endpoint: Endpoint<'_>) -> Result<RequestBuilder, ApiError> {
        let url = self.url(endpoint)?;
        debug!(method = ?endpoint.method(), %url, "api request");
        Ok(match endpoint.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        })
    }
}

async fn ensure_success(response: Response, fallback: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: humanize_error_body(&body, fallback),
    })
}

#[async_trait]
impl DetectionApi for HttpDetectionApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response = self.request(Endpoint::Login)?.json(request).send().await?;
        let response = ensure_success(response, dugong_protocol::LOGIN_FAILED_FALLBACK).await?;
        Ok(response.json().await?)
    }

    async fn upload_batch(
        &self,
        session_id: &str,
        parts: Vec<UploadPart>,
    ) -> Result<UploadResponse, ApiError> {
        let mut form = multipart::Form::new();
        for part in parts {
            let file = multipart::Part::bytes(part.data.to_vec())
                .file_name(part.file_name)
                .mime_str(&part.content_type)?;
            form = form.part("files", file);
        }
        form = form.text("session_id", session_id.to_string());

        let response = self
            .request(Endpoint::UploadBatch)?
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response, "Upload failed. Please try again.").await?;
        Ok(response.json().await?)
    }

    async fn backfill_detections(&self, session_id: &str) -> Result<(), ApiError> {
        let response = self.request(Endpoint::Backfill { session_id })?.send().await?;
        ensure_success(response, "Backfill failed").await?;
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, ApiError> {
        let response = self
            .request(Endpoint::SessionStatus { session_id })?
            .send()
            .await?;
        let response = ensure_success(response, "Session status unavailable").await?;
        Ok(response.json().await?)
    }

    async fn export_session_csv(&self, session_id: &str) -> Result<Bytes, ApiError> {
        let response = self.request(Endpoint::ExportCsv { session_id })?.send().await?;
        let response = ensure_success(response, "Failed to export CSV").await?;
        Ok(response.bytes().await?)
    }

    async fn mark_poor_quality(&self, request: &MarkPoorQualityRequest) -> Result<(), ApiError> {
        let response = self
            .request(Endpoint::MarkPoorQuality)?
            .json(request)
            .send()
            .await?;
        ensure_success(response, "Failed to move image").await?;
        Ok(())
    }

    async fn cleanup_session(&self, email: &str, session_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Endpoint::CleanupSessions { email })?
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        ensure_success(response, "Session cleanup failed").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpDetectionApi {
        HttpDetectionApi::new(base, Duration::from_secs(1)).expect("valid base url")
    }

    #[test]
    fn urls_follow_route_table() {
        let api = api("http://localhost:8000");
        assert_eq!(
            api.url(Endpoint::UploadBatch).unwrap().as_str(),
            "http://localhost:8000/upload-multiple/"
        );
        assert_eq!(
            api.url(Endpoint::SessionStatus { session_id: "S 1" })
                .unwrap()
                .as_str(),
            "http://localhost:8000/api/session-status/S%201"
        );
        assert_eq!(
            api.url(Endpoint::CleanupSessions { email: "a@b.co" })
                .unwrap()
                .as_str(),
            "http://localhost:8000/cleanup-sessions/a@b.co"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let api = api("https://reef.example/dugong/");
        assert_eq!(
            api.url(Endpoint::Login).unwrap().as_str(),
            "https://reef.example/dugong/auth/login"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            HttpDetectionApi::new("mailto:ops@reef.example", Duration::from_secs(1)),
            Err(ApiError::Url(_))
        ));
        assert!(HttpDetectionApi::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn status_errors_surface_server_text() {
        let err = ApiError::Status {
            status: 401,
            message: "Incorrect password".into(),
        };
        assert_eq!(err.user_message("fallback"), "Incorrect password");
        assert_eq!(ApiError::Url("x".into()).user_message("fallback"), "fallback");
    }
}
