//! Client configuration for NCBI E-utilities and the optional model provider

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;

pub const DEFAULT_NCBI_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_TOOL: &str = "pubmed-evidence";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Configuration for the E-utilities client
///
/// ```
/// use pubmed_evidence::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_api_key("key")
///     .with_email("researcher@example.org");
/// assert_eq!(config.effective_rate_limit(), 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub tool: Option<String>,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    /// Requests per second; defaults to the NCBI allowance for the key state
    pub rate_limit: Option<f64>,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    pub retry_config: RetryConfig,
    /// Cache for fetched records and PMC sections
    pub document_cache: CacheConfig,
    /// Cache for ESearch results
    pub search_cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            email: None,
            tool: None,
            base_url: None,
            user_agent: None,
            rate_limit: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            document_cache: CacheConfig::default(),
            search_cache: CacheConfig::short_lived(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Point the client at a different E-utilities root (mock servers, mirrors)
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limit = Some(per_second);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_document_cache(mut self, cache: CacheConfig) -> Self {
        self.document_cache = cache;
        self
    }

    pub fn with_search_cache(mut self, cache: CacheConfig) -> Self {
        self.search_cache = cache;
        self
    }

    pub fn effective_rate_limit(&self) -> f64 {
        self.rate_limit.unwrap_or(if self.api_key.is_some() {
            10.0
        } else {
            3.0
        })
    }

    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(DEFAULT_NCBI_BASE_URL)
    }

    pub fn effective_tool(&self) -> &str {
        self.tool.as_deref().unwrap_or(DEFAULT_TOOL)
    }

    pub fn effective_user_agent(&self) -> String {
        match &self.user_agent {
            Some(agent) => agent.clone(),
            None => {
                let mut agent = format!("{}/{}", self.effective_tool(), env!("CARGO_PKG_VERSION"));
                if let Some(email) = &self.email {
                    agent.push_str(&format!(" ({email})"));
                }
                agent
            }
        }
    }

    /// Etiquette parameters appended to every E-utilities request
    pub fn build_api_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(api_key) = &self.api_key {
            params.push(("api_key".to_string(), api_key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email".to_string(), email.clone()));
        }
        params.push(("tool".to_string(), self.effective_tool().to_string()));
        params
    }

    pub fn create_rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.effective_rate_limit())
    }
}

/// Credentials and endpoints for an OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    /// Chat model; synthesis falls back to extractive mode when unset
    pub chat_model: Option<String>,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_model<S: Into<String>>(mut self, model: S) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    pub fn with_embedding_model<S: Into<String>>(mut self, model: S) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
