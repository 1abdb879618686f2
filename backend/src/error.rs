use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cipher::CipherError;

#[derive(Debug, Error)]
pub enum PlayError {
    #[error("{0}")]
    NotFound(String),
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid {service} response: {message}")]
    UpstreamInvalidResponse {
        service: &'static str,
        message: String,
    },
    #[error("decrypt failed: {0}")]
    Crypto(#[from] CipherError),
    #[error("missing key in decrypted data")]
    MissingKey,
    #[error("failed to get mp3 link")]
    FailedLink,
    #[error("progress complete but no url")]
    NoUrlAtCompletion,
    #[error("ytmp3 error: {0}")]
    Provider(String),
    #[error("timeout after {attempts} progress checks")]
    Timeout { attempts: usize },
    #[error("resolution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PlayError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamInvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { service, source }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
    pub retry_after_seconds: Option<u64>,
}

impl ApiError {
    pub fn query_required() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Parameter 'query' is required.".to_string(),
            code: Some("QUERY_REQUIRED"),
            retry_after_seconds: None,
        }
    }

    pub fn video_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Video not found for the given query.".to_string(),
            code: Some("VIDEO_NOT_FOUND"),
            retry_after_seconds: None,
        }
    }

    pub fn resolution_failed(reasons: &[String]) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Failed to fetch download links: {}", reasons.join("; ")),
            code: Some("RESOLUTION_FAILED"),
            retry_after_seconds: None,
        }
    }

    pub fn route_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Not Found".to_string(),
            code: None,
            retry_after_seconds: None,
        }
    }

    pub fn rate_limited(max_requests: usize, window_seconds: u64, retry_after_seconds: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: format!(
                "Rate limit exceeded. Max {max_requests} requests per {window_seconds}s."
            ),
            code: Some("RATE_LIMITED"),
            retry_after_seconds: Some(retry_after_seconds),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
            retry_after_seconds: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
            retry_after_seconds: self.retry_after_seconds,
        });

        let mut response = (self.status, body).into_response();
        if let Some(seconds) = self.retry_after_seconds
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}
