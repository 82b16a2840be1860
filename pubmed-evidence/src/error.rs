use std::result;
use std::sync::Arc;

use crate::retry::RetryableError;
use thiserror::Error;

/// Error types for evidence retrieval and synthesis
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML parsing failed
    #[error("XML parsing failed: {0}")]
    XmlError(String),

    /// Article not found in an EFetch response
    #[error("Article not found: PMID {pmid}")]
    ArticleNotFound { pmid: String },

    /// Invalid PMID format
    #[error("Invalid PMID format: {pmid}")]
    InvalidPmid { pmid: String },

    /// Invalid PMC ID format
    #[error("Invalid PMC ID format: {pmcid}")]
    InvalidPmcid { pmcid: String },

    /// Invalid query structure or parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A request parameter is outside its accepted range
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// API rate limit exceeded
    #[error("API rate limit exceeded")]
    RateLimitExceeded,

    /// Generic API error with HTTP status code
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// A single upstream call did not complete in time
    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Retries were exhausted against a transiently failing upstream
    #[error("Upstream unavailable for {operation} after {attempts} attempts: {message}")]
    UpstreamUnavailable {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// Language model or embedding provider failure
    #[error("Model provider error: {0}")]
    ModelError(String),

    /// The pipeline was driven through an illegal stage change
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = result::Result<T, EvidenceError>;

impl EvidenceError {
    /// Whether this error means the upstream service itself is down
    pub fn is_upstream_outage(&self) -> bool {
        matches!(self, EvidenceError::UpstreamUnavailable { .. })
    }

    /// Recover an owned error from one shared between single-flight waiters
    pub fn from_shared(shared: Arc<EvidenceError>) -> Self {
        match Arc::try_unwrap(shared) {
            Ok(err) => err,
            Err(shared) => match shared.as_ref() {
                EvidenceError::RequestError(err) => EvidenceError::ApiError {
                    status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: err.to_string(),
                },
                EvidenceError::JsonError(err) => {
                    EvidenceError::XmlError(format!("invalid JSON payload: {err}"))
                }
                EvidenceError::XmlError(msg) => EvidenceError::XmlError(msg.clone()),
                EvidenceError::ArticleNotFound { pmid } => {
                    EvidenceError::ArticleNotFound { pmid: pmid.clone() }
                }
                EvidenceError::InvalidPmid { pmid } => {
                    EvidenceError::InvalidPmid { pmid: pmid.clone() }
                }
                EvidenceError::InvalidPmcid { pmcid } => EvidenceError::InvalidPmcid {
                    pmcid: pmcid.clone(),
                },
                EvidenceError::InvalidQuery(msg) => EvidenceError::InvalidQuery(msg.clone()),
                EvidenceError::InvalidRequest(msg) => EvidenceError::InvalidRequest(msg.clone()),
                EvidenceError::InvalidConfig(msg) => EvidenceError::InvalidConfig(msg.clone()),
                EvidenceError::RateLimitExceeded => EvidenceError::RateLimitExceeded,
                EvidenceError::ApiError { status, message } => EvidenceError::ApiError {
                    status: *status,
                    message: message.clone(),
                },
                EvidenceError::Timeout { operation, seconds } => EvidenceError::Timeout {
                    operation: operation.clone(),
                    seconds: *seconds,
                },
                EvidenceError::UpstreamUnavailable {
                    operation,
                    attempts,
                    message,
                } => EvidenceError::UpstreamUnavailable {
                    operation: operation.clone(),
                    attempts: *attempts,
                    message: message.clone(),
                },
                EvidenceError::ModelError(msg) => EvidenceError::ModelError(msg.clone()),
                EvidenceError::InvalidTransition { from, to } => EvidenceError::InvalidTransition {
                    from: from.clone(),
                    to: to.clone(),
                },
            },
        }
    }

    /// Short machine-readable kind, used in HTTP error bodies and failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            EvidenceError::RequestError(_) => "request_error",
            EvidenceError::JsonError(_) => "json_error",
            EvidenceError::XmlError(_) => "xml_error",
            EvidenceError::ArticleNotFound { .. } => "article_not_found",
            EvidenceError::InvalidPmid { .. } => "invalid_pmid",
            EvidenceError::InvalidPmcid { .. } => "invalid_pmcid",
            EvidenceError::InvalidQuery(_) => "invalid_query",
            EvidenceError::InvalidRequest(_) => "invalid_request",
            EvidenceError::InvalidConfig(_) => "invalid_config",
            EvidenceError::RateLimitExceeded => "rate_limited",
            EvidenceError::ApiError { .. } => "api_error",
            EvidenceError::Timeout { .. } => "timeout",
            EvidenceError::UpstreamUnavailable { .. } => "upstream_unavailable",
            EvidenceError::ModelError(_) => "model_error",
            EvidenceError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

impl RetryableError for EvidenceError {
    fn is_retryable(&self) -> bool {
        match self {
            EvidenceError::RequestError(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }

                if let Some(status) = err.status() {
                    return status.is_server_error() || status.as_u16() == 429;
                }

                !err.is_builder() && !err.is_redirect() && !err.is_decode()
            }

            EvidenceError::RateLimitExceeded | EvidenceError::Timeout { .. } => true,

            EvidenceError::ApiError { status, message } => {
                (*status >= 500 && *status < 600) || *status == 429 || {
                    let lower_msg = message.to_lowercase();
                    lower_msg.contains("temporarily unavailable")
                        || lower_msg.contains("timeout")
                        || lower_msg.contains("connection")
                }
            }

            // Already the product of an exhausted retry loop
            EvidenceError::UpstreamUnavailable { .. } => false,

            EvidenceError::JsonError(_)
            | EvidenceError::XmlError(_)
            | EvidenceError::ArticleNotFound { .. }
            | EvidenceError::InvalidPmid { .. }
            | EvidenceError::InvalidPmcid { .. }
            | EvidenceError::InvalidQuery(_)
            | EvidenceError::InvalidRequest(_)
            | EvidenceError::InvalidConfig(_)
            | EvidenceError::ModelError(_)
            | EvidenceError::InvalidTransition { .. } => false,
        }
    }

    fn retry_reason(&self) -> &str {
        if self.is_retryable() {
            match self {
                EvidenceError::RequestError(err) if err.is_timeout() => "Request timeout",
                EvidenceError::RequestError(err) if err.is_connect() => "Connection error",
                EvidenceError::RequestError(_) => "Network error",
                EvidenceError::RateLimitExceeded => "Rate limit exceeded",
                EvidenceError::Timeout { .. } => "Operation timeout",
                EvidenceError::ApiError { status, .. } => match status {
                    429 => "Rate limit exceeded",
                    500..=599 => "Server error",
                    _ => "Temporary API error",
                },
                _ => "Transient error",
            }
        } else {
            match self {
                EvidenceError::JsonError(_) => "Invalid JSON response",
                EvidenceError::XmlError(_) => "Invalid XML response",
                EvidenceError::ArticleNotFound { .. } => "Article does not exist",
                EvidenceError::InvalidPmid { .. } | EvidenceError::InvalidPmcid { .. } => {
                    "Invalid input"
                }
                EvidenceError::InvalidQuery(_) => "Invalid query",
                EvidenceError::UpstreamUnavailable { .. } => "Retries exhausted",
                _ => "Non-transient error",
            }
        }
    }
}
