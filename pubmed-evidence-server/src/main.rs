use anyhow::{Context, Result};
use clap::Parser;
use pubmed_evidence::Pipeline;
use pubmed_evidence_server::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let pipeline =
        Pipeline::new(args.pipeline_config()).context("failed to build evidence pipeline")?;
    info!(
        language_model = pipeline.has_language_model(),
        embeddings = pipeline.has_embedder(),
        "Pipeline ready"
    );

    pubmed_evidence_server::serve(&args.listen_addr(), pipeline).await
}
