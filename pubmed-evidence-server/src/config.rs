use std::time::Duration;

use clap::Parser;
use pubmed_evidence::config::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_TOOL};
use pubmed_evidence::{ClientConfig, ModelConfig, PipelineConfig, RetrievalConfig};

/// Serve evidence retrieval and grounded answers over PubMed
#[derive(Parser, Debug, Clone)]
#[command(name = "pubmed-evidence-server")]
#[command(about = "HTTP service for PubMed evidence retrieval and grounded answers", long_about = None)]
#[command(version)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// NCBI API key for higher rate limits
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    pub ncbi_api_key: Option<String>,

    /// Contact email sent with E-utilities requests
    #[arg(long, env = "NCBI_EMAIL")]
    pub ncbi_email: Option<String>,

    /// Tool name sent with E-utilities requests
    #[arg(long, env = "NCBI_TOOL", default_value = DEFAULT_TOOL)]
    pub ncbi_tool: String,

    /// API key for an OpenAI-compatible provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model used for synthesis; extractive answers without it
    #[arg(long, env = "OPENAI_MODEL")]
    pub openai_model: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Documents fetched in parallel per request
    #[arg(long, default_value_t = 4)]
    pub max_concurrent_fetches: usize,

    /// Record fetch timeout in seconds, per batch or per document on fallback
    #[arg(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut client = ClientConfig::new().with_tool(&self.ncbi_tool);
        if let Some(api_key) = non_blank(&self.ncbi_api_key) {
            client = client.with_api_key(api_key);
        }
        if let Some(email) = non_blank(&self.ncbi_email) {
            client = client.with_email(email);
        }

        let models = non_blank(&self.openai_api_key).map(|api_key| {
            let config = ModelConfig::new(api_key)
                .with_base_url(&self.openai_base_url)
                .with_embedding_model(&self.embedding_model);
            match non_blank(&self.openai_model) {
                Some(model) => config.with_chat_model(model),
                None => config,
            }
        });

        PipelineConfig {
            client,
            retrieval: RetrievalConfig {
                max_concurrent_fetches: self.max_concurrent_fetches.max(1),
                fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
                ..RetrievalConfig::default()
            },
            models,
            ..PipelineConfig::default()
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
