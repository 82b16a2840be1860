//! # PubMed Evidence
//!
//! Evidence retrieval and grounded answer synthesis over PubMed and PubMed
//! Central. A question goes through search, retrieval, chunking and ranking;
//! the selected passages are the only material an answer may cite.
//!
//! ## Features
//!
//! - **E-utilities client**: ESearch, EFetch and ELink with NCBI etiquette,
//!   rate limiting, retries and TTL caches
//! - **PMC full text**: high-signal sections (Results, Methods, Discussion, ...)
//! - **Ranking**: BM25 with an optional embedding blend, recency decay and
//!   study-type / section boosts
//! - **Grounded synthesis**: `[PMID:n]` citation markers validated against the
//!   retrieved evidence, LLM-backed or extractive
//!
//! ## Quick Start
//!
//! ```no_run
//! use pubmed_evidence::{ClientConfig, Pipeline, PipelineConfig, SelectOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig {
//!         client: ClientConfig::new().with_email("researcher@example.org"),
//!         ..Default::default()
//!     })?;
//!
//!     let response = pipeline
//!         .answer(
//!             "Does metformin lower HbA1c in type 2 diabetes?",
//!             Some("metformin HbA1c randomized[tiab]"),
//!             &SelectOptions::for_answer(),
//!         )
//!         .await?;
//!
//!     println!("{}", response.answer);
//!     for reference in &response.references {
//!         println!("{} {}", reference.pmid, reference.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunk;
pub mod common;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod pipeline;
pub mod pmc;
pub mod pubmed;
pub mod rank;
pub mod rate_limit;
pub mod retrieve;
pub mod retry;
pub mod synthesis;
pub mod text;

// Re-export main types for convenience
pub use cache::CacheConfig;
pub use chunk::{Chunk, ChunkConfig, Chunker};
pub use common::{PmcId, PubMedId};
pub use config::{ClientConfig, ModelConfig};
pub use document::{Document, SectionText};
pub use embedding::{Embedder, OpenAiEmbedder};
pub use error::{EvidenceError, Result};
pub use evidence::{Section, StudyType};
pub use pipeline::{
    AnswerResponse, Pipeline, PipelineConfig, PipelineStage, SearchResponse, SelectOptions,
    Selection, SelectionStatus, StageTracker, Warning,
};
pub use pubmed::PubMedClient;
pub use rank::{RankedChunk, Ranker, RankingConfig};
pub use rate_limit::RateLimiter;
pub use retrieve::{FailedFetch, Retrieval, RetrievalConfig, Retriever};
pub use retry::{RetryConfig, RetryableError};
pub use synthesis::{
    Answer, AnswerStatus, Citation, EvidenceSet, LanguageModel, OpenAiChat, Reference,
    SynthesisConfig, Synthesizer,
};
