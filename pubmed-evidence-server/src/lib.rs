//! HTTP interface for the `pubmed-evidence` pipeline.
//!
//! Routes:
//!
//! - `GET /pubmed/search` PMIDs for a query
//! - `GET /pubmed/retrieve` documents by PMID with per-document failures
//! - `GET /pubmed/select` ranked evidence chunks
//! - `POST /pubmed/answer` grounded answer with citations

pub mod config;
pub mod error;
pub mod router;

pub use config::Args;
pub use error::{ApiError, ApiResult};
pub use router::router;

use anyhow::Context;
use pubmed_evidence::Pipeline;
use tracing::{info, warn};

/// Bind `addr` and serve the router until Ctrl-C
pub async fn serve(addr: &str, pipeline: Pipeline) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("error while binding {addr}"))?;

    info!("Listening on {addr}");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while serving")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
