use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pubmed_evidence::EvidenceError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    /// Malformed path, query string or body the caller can fix
    #[error("{0}")]
    BadRequest(String),

    /// Well-formed input that fails validation
    #[error("{0}")]
    Unprocessable(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use EvidenceError as E;
        use StatusCode as SC;
        match self {
            ApiError::BadRequest(_) => SC::BAD_REQUEST,
            ApiError::Unprocessable(_) => SC::UNPROCESSABLE_ENTITY,
            ApiError::Evidence(err) => match err {
                E::InvalidPmid { .. } | E::InvalidPmcid { .. } | E::InvalidQuery(_) => {
                    SC::BAD_REQUEST
                }
                E::InvalidRequest(_) | E::InvalidConfig(_) => SC::UNPROCESSABLE_ENTITY,
                E::UpstreamUnavailable { .. } => SC::SERVICE_UNAVAILABLE,
                E::RequestError(_)
                | E::JsonError(_)
                | E::XmlError(_)
                | E::ArticleNotFound { .. }
                | E::RateLimitExceeded
                | E::ApiError { .. }
                | E::Timeout { .. }
                | E::ModelError(_) => SC::BAD_GATEWAY,
                E::InvalidTransition { .. } => SC::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Evidence(err) => err.kind(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unprocessable(_) => "invalid_request",
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => ApiError::Unprocessable(err.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{self}");
        } else {
            warn!(kind = self.kind(), "{self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
