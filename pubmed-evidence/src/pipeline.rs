//! Per-request orchestration: search → retrieve → chunk → rank → synthesize

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::chunk::{Chunk, ChunkConfig, Chunker};
use crate::common::PubMedId;
use crate::config::{ClientConfig, ModelConfig};
use crate::embedding::{query_similarities, Embedder, OpenAiEmbedder};
use crate::error::{EvidenceError, Result};
use crate::evidence::Section;
use crate::pubmed::PubMedClient;
use crate::rank::{RankedChunk, Ranker, RankingConfig};
use crate::retrieve::{FailedFetch, Retrieval, RetrievalConfig, Retriever};
use crate::synthesis::{
    Answer, AnswerStatus, Citation, LanguageModel, OpenAiChat, Reference, SynthesisConfig,
    Synthesizer,
};

/// Stages of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Searching,
    Retrieving,
    Chunking,
    Ranking,
    Synthesizing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Searching => "searching",
            PipelineStage::Retrieving => "retrieving",
            PipelineStage::Chunking => "chunking",
            PipelineStage::Ranking => "ranking",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// Legal forward moves. Each working stage may also finish early in
    /// `Done`, and any non-terminal stage may fail.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (Idle, Searching | Retrieving) => true,
            (Searching, Retrieving | Done) => true,
            (Retrieving, Chunking | Done) => true,
            (Chunking, Ranking | Done) => true,
            (Ranking, Synthesizing | Done) => true,
            (Synthesizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stage plus every stage entered so far
#[derive(Debug, Clone, PartialEq)]
pub struct StageTracker {
    current: PipelineStage,
    trace: Vec<PipelineStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: PipelineStage::Idle,
            trace: Vec::new(),
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn trace(&self) -> &[PipelineStage] {
        &self.trace
    }

    pub fn advance(&mut self, next: PipelineStage) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(EvidenceError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.trace.push(next);
        Ok(())
    }

    /// Record a failure; a no-op once the request has finished
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = PipelineStage::Failed;
            self.trace.push(PipelineStage::Failed);
        }
    }

    fn into_trace(self) -> Vec<PipelineStage> {
        self.trace
    }
}

/// A non-fatal condition reported alongside a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// `partial_retrieval` or `embeddings_unavailable`
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pmids: Vec<PubMedId>,
}

impl Warning {
    fn partial_retrieval(failed: &[FailedFetch]) -> Self {
        Self {
            code: "partial_retrieval".to_string(),
            message: format!("{} document(s) could not be retrieved", failed.len()),
            pmids: failed.iter().map(|f| f.pmid).collect(),
        }
    }

    fn embeddings_unavailable(reason: &str) -> Self {
        Self {
            code: "embeddings_unavailable".to_string(),
            message: format!("Semantic scoring skipped, ranked lexically: {reason}"),
            pmids: Vec::new(),
        }
    }
}

/// Per-request selection knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOptions {
    /// PubMed records searched
    pub limit: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub top_k: usize,
    pub alpha: f64,
    pub use_embeddings: bool,
    pub freshness_weight: f64,
    pub half_life_years: f64,
    pub prefer_types: Vec<String>,
    pub full_text: bool,
    /// Full-text sections chunked besides the abstract
    pub sections: Vec<Section>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        let chunk = ChunkConfig::default();
        let ranking = RankingConfig::default();
        Self {
            limit: 20,
            chunk_size: chunk.size,
            overlap: chunk.overlap,
            top_k: ranking.top_k,
            alpha: ranking.alpha,
            use_embeddings: true,
            freshness_weight: ranking.freshness_weight,
            half_life_years: ranking.half_life_years,
            prefer_types: Vec::new(),
            full_text: false,
            sections: Section::DEFAULT_FULL_TEXT.to_vec(),
        }
    }
}

impl SelectOptions {
    /// Defaults for answering: more records and PMC full text
    pub fn for_answer() -> Self {
        Self {
            limit: 30,
            full_text: true,
            ..Self::default()
        }
    }

    /// Check every knob against its accepted range
    pub fn validate(&self) -> Result<()> {
        check_range("limit", self.limit as f64, 1.0, 100.0)?;
        check_range("chunk_size", self.chunk_size as f64, 300.0, 4000.0)?;
        check_range("overlap", self.overlap as f64, 0.0, 800.0)?;
        check_range("top_k", self.top_k as f64, 1.0, 20.0)?;
        check_range("alpha", self.alpha, 0.0, 1.0)?;
        check_range("freshness_weight", self.freshness_weight, 0.0, 1.0)?;
        check_range("half_life_years", self.half_life_years, 0.1, 50.0)?;
        if self.overlap >= self.chunk_size {
            return Err(EvidenceError::InvalidRequest(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            size: self.chunk_size,
            overlap: self.overlap,
        }
    }

    pub fn ranking_config(&self) -> RankingConfig {
        RankingConfig {
            top_k: self.top_k,
            alpha: self.alpha,
            freshness_weight: self.freshness_weight,
            half_life_years: self.half_life_years,
            prefer_types: self.prefer_types.clone(),
            ..RankingConfig::default()
        }
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(EvidenceError::InvalidRequest(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Selected,
    NoEvidenceFound,
}

/// Ranked evidence for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub query: String,
    pub status: SelectionStatus,
    pub chunks: Vec<RankedChunk>,
    pub used_embeddings: bool,
    /// Documents retrieved before chunking
    pub documents: usize,
    pub failed: Vec<FailedFetch>,
    pub warnings: Vec<Warning>,
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub pmids: Vec<PubMedId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question: String,
    pub query: String,
    pub status: AnswerStatus,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub references: Vec<Reference>,
    pub notes: String,
    pub used_embeddings: bool,
    pub warnings: Vec<Warning>,
    pub stages: Vec<PipelineStage>,
}

/// Shared resources for building a [`Pipeline`]
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub client: ClientConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    /// OpenAI-compatible provider; embeddings need a key, chat also a model
    pub models: Option<ModelConfig>,
}

/// Evidence pipeline; cloned per request, sharing client, caches and model clients
#[derive(Clone)]
pub struct Pipeline {
    retriever: Retriever,
    synthesis: SynthesisConfig,
    embedder: Option<Arc<dyn Embedder>>,
    model: Option<Arc<dyn LanguageModel>>,
}

struct SelectionRun {
    chunks: Vec<RankedChunk>,
    used_embeddings: bool,
    documents: usize,
    failed: Vec<FailedFetch>,
    warnings: Vec<Warning>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let client = PubMedClient::new(config.client)?;
        let mut pipeline = Self::with_client(client, config.retrieval, config.synthesis);

        if let Some(models) = config.models {
            if !models.api_key.is_empty() {
                if models.chat_model.is_some() {
                    pipeline.model = Some(Arc::new(OpenAiChat::new(models.clone())?));
                }
                pipeline.embedder = Some(Arc::new(OpenAiEmbedder::new(models)?));
            }
        }
        info!(
            embeddings = pipeline.embedder.is_some(),
            chat = pipeline.model.is_some(),
            "Pipeline ready"
        );
        Ok(pipeline)
    }

    /// Pipeline around an existing client, without model providers
    pub fn with_client(
        client: PubMedClient,
        retrieval: RetrievalConfig,
        synthesis: SynthesisConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(client, retrieval),
            synthesis,
            embedder: None,
            model: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn client(&self) -> &PubMedClient {
        self.retriever.client()
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_language_model(&self) -> bool {
        self.model.is_some()
    }

    /// PMIDs for `query` in relevance order
    #[instrument(skip(self), fields(query = %query, limit))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        check_range("limit", limit as f64, 1.0, 100.0)?;
        let pmids = self.client().search(query, limit).await?;
        Ok(SearchResponse {
            query: query.to_string(),
            count: pmids.len(),
            pmids,
        })
    }

    /// Fetch documents by PMID, reporting per-document failures
    #[instrument(skip(self, ids), fields(ids = ids.len(), full_text))]
    pub async fn retrieve(&self, ids: &[PubMedId], full_text: bool) -> Result<Retrieval> {
        self.retriever_for(full_text).retrieve(ids).await
    }

    /// Search, retrieve, chunk and rank evidence for `query`
    #[instrument(skip(self, options), fields(query = %query, limit = options.limit, top_k = options.top_k))]
    pub async fn select(&self, query: &str, options: &SelectOptions) -> Result<Selection> {
        options.validate()?;
        let mut stages = StageTracker::new();
        let run = match self.run_selection(query, query, options, &mut stages).await {
            Ok(run) => run,
            Err(err) => {
                stages.fail();
                warn!(error = %err, "Selection failed");
                return Err(err);
            }
        };
        if !stages.current().is_terminal() {
            stages.advance(PipelineStage::Done)?;
        }

        let status = if run.chunks.is_empty() {
            SelectionStatus::NoEvidenceFound
        } else {
            SelectionStatus::Selected
        };
        Ok(Selection {
            query: query.to_string(),
            status,
            chunks: run.chunks,
            used_embeddings: run.used_embeddings,
            documents: run.documents,
            failed: run.failed,
            warnings: run.warnings,
            stages: stages.into_trace(),
        })
    }

    /// Answer `question` from PubMed evidence found with `query` (the question
    /// itself when `None`). Ranking always uses the question.
    #[instrument(skip(self, options), fields(question = %question))]
    pub async fn answer(
        &self,
        question: &str,
        query: Option<&str>,
        options: &SelectOptions,
    ) -> Result<AnswerResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EvidenceError::InvalidQuery("question must not be empty".to_string()));
        }
        options.validate()?;
        let term = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(question);

        let mut stages = StageTracker::new();
        let run = match self.run_selection(term, question, options, &mut stages).await {
            Ok(run) => run,
            Err(err) => {
                stages.fail();
                warn!(error = %err, "Answer pipeline failed");
                return Err(err);
            }
        };

        let answer = if stages.current().is_terminal() {
            Answer::no_evidence_found(no_evidence_note(run.documents))
        } else {
            stages.advance(PipelineStage::Synthesizing)?;
            let synthesizer = match &self.model {
                Some(model) => {
                    Synthesizer::new(self.synthesis.clone()).with_model(Arc::clone(model))
                }
                None => Synthesizer::new(self.synthesis.clone()),
            };
            let answer = synthesizer.synthesize(question, &run.chunks).await;
            stages.advance(PipelineStage::Done)?;
            answer
        };

        info!(status = ?answer.status, references = answer.references.len(), "Answer completed");
        Ok(AnswerResponse {
            question: question.to_string(),
            query: term.to_string(),
            status: answer.status,
            answer: answer.answer,
            citations: answer.citations,
            references: answer.references,
            notes: answer.notes,
            used_embeddings: run.used_embeddings,
            warnings: run.warnings,
            stages: stages.into_trace(),
        })
    }

    fn retriever_for(&self, full_text: bool) -> Retriever {
        self.retriever.with_config(RetrievalConfig {
            full_text,
            ..self.retriever.config().clone()
        })
    }

    /// Runs up to `Ranking`; ends in `Done` when a guard finds nothing to rank
    async fn run_selection(
        &self,
        term: &str,
        ranking_query: &str,
        options: &SelectOptions,
        stages: &mut StageTracker,
    ) -> Result<SelectionRun> {
        let mut run = SelectionRun {
            chunks: Vec::new(),
            used_embeddings: false,
            documents: 0,
            failed: Vec::new(),
            warnings: Vec::new(),
        };

        stages.advance(PipelineStage::Searching)?;
        let pmids = self.client().search(term, options.limit).await?;
        if pmids.is_empty() {
            info!("Search returned no PMIDs");
            stages.advance(PipelineStage::Done)?;
            return Ok(run);
        }

        stages.advance(PipelineStage::Retrieving)?;
        let retrieval = self.retriever_for(options.full_text).retrieve(&pmids).await?;
        if retrieval.is_partial() {
            run.warnings.push(Warning::partial_retrieval(&retrieval.failed));
        }
        run.documents = retrieval.documents.len();
        run.failed = retrieval.failed;
        if retrieval.documents.is_empty() {
            warn!("No document could be retrieved");
            stages.advance(PipelineStage::Done)?;
            return Ok(run);
        }

        stages.advance(PipelineStage::Chunking)?;
        let chunker = Chunker::new(options.chunk_config())?;
        let chunks: Vec<Chunk> = retrieval
            .documents
            .iter()
            .flat_map(|doc| chunker.chunk_sections(doc, &options.sections))
            .collect();
        if chunks.is_empty() {
            info!("Retrieved documents have no text to chunk");
            stages.advance(PipelineStage::Done)?;
            return Ok(run);
        }

        stages.advance(PipelineStage::Ranking)?;
        let similarities = match (&self.embedder, options.use_embeddings) {
            (Some(embedder), true) => {
                let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
                match query_similarities(embedder.as_ref(), ranking_query, &texts).await {
                    Ok(sims) => Some(sims),
                    Err(err) => {
                        warn!(error = %err, "Embeddings failed, falling back to BM25");
                        run.warnings.push(Warning::embeddings_unavailable(&err.to_string()));
                        None
                    }
                }
            }
            _ => None,
        };
        run.used_embeddings = similarities.is_some();

        let candidates = chunks.len();
        let ranker = Ranker::new(options.ranking_config());
        run.chunks = ranker.rank_with_similarity(ranking_query, chunks, similarities.as_deref());
        info!(
            candidates,
            selected = run.chunks.len(),
            used_embeddings = run.used_embeddings,
            "Evidence ranked"
        );
        Ok(run)
    }
}

fn no_evidence_note(documents: usize) -> &'static str {
    if documents == 0 {
        "No PubMed records could be found or retrieved for this query."
    } else {
        "Retrieved records contain no abstract or full text to ground an answer."
    }
}
