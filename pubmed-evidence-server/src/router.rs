use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use pubmed_evidence::{
    AnswerResponse, Pipeline, PubMedId, Retrieval, SearchResponse, Section, SelectOptions,
    Selection,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};

use crate::error::{ApiError, ApiResult};

const DEFAULT_SEARCH_LIMIT: usize = 20;

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/pubmed/search", get(search))
        .route("/pubmed/retrieve", get(retrieve))
        .route("/pubmed/select", get(select))
        .route("/pubmed/answer", get(answer_usage).post(answer))
        .layer(TraceLayer::new_for_http().on_failure(
            |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                tracing::error!("{error}")
            },
        ))
        .with_state(pipeline)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "term")]
    pub query: String,
    #[serde(default = "default_search_limit", alias = "retmax")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct RetrieveParams {
    pub ids: String,
    #[serde(default, alias = "want_fulltext")]
    pub full_text: bool,
}

/// Selection knobs as sent by callers; unset fields keep the endpoint defaults.
///
/// List-valued knobs are comma-separated strings so the same shape works as a
/// query string and as a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SelectionParams {
    #[serde(alias = "term")]
    pub query: Option<String>,
    #[serde(alias = "retmax")]
    pub limit: Option<usize>,
    #[serde(alias = "chunk_chars")]
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub alpha: Option<f64>,
    pub use_embeddings: Option<bool>,
    pub freshness_weight: Option<f64>,
    pub half_life_years: Option<f64>,
    pub prefer_types: Option<String>,
    #[serde(alias = "want_fulltext")]
    pub full_text: Option<bool>,
    #[serde(alias = "include_sections")]
    pub sections: Option<String>,
}

impl SelectionParams {
    /// Overlay the caller's knobs on `base`
    pub fn apply(&self, base: SelectOptions) -> ApiResult<SelectOptions> {
        let mut options = base;
        if let Some(limit) = self.limit {
            options.limit = limit;
        }
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = chunk_size;
        }
        if let Some(overlap) = self.overlap {
            options.overlap = overlap;
        }
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        if let Some(alpha) = self.alpha {
            options.alpha = alpha;
        }
        if let Some(use_embeddings) = self.use_embeddings {
            options.use_embeddings = use_embeddings;
        }
        if let Some(weight) = self.freshness_weight {
            options.freshness_weight = weight;
        }
        if let Some(half_life) = self.half_life_years {
            options.half_life_years = half_life;
        }
        if let Some(types) = &self.prefer_types {
            options.prefer_types = split_csv(types).map(str::to_string).collect();
        }
        if let Some(full_text) = self.full_text {
            options.full_text = full_text;
        }
        if let Some(sections) = &self.sections {
            options.sections = parse_sections(sections)?;
        }
        Ok(options)
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(flatten)]
    pub params: SelectionParams,
}

fn split_csv(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_sections(raw: &str) -> ApiResult<Vec<Section>> {
    let mut sections = Vec::new();
    for name in split_csv(raw) {
        let section = Section::parse(name)
            .ok_or_else(|| ApiError::Unprocessable(format!("unknown section: {name}")))?;
        if !sections.contains(&section) {
            sections.push(section);
        }
    }
    Ok(sections)
}

fn require_query(query: &str) -> ApiResult<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    Ok(query)
}

async fn search(
    State(pipeline): State<Pipeline>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Query(params) = params?;
    let query = require_query(&params.query)?;
    let response = pipeline.search(query, params.limit).await?;
    Ok(Json(response))
}

async fn retrieve(
    State(pipeline): State<Pipeline>,
    params: Result<Query<RetrieveParams>, QueryRejection>,
) -> ApiResult<Json<Retrieval>> {
    let Query(params) = params?;
    let ids = PubMedId::parse_list(&params.ids)?;
    if ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".to_string()));
    }
    let retrieval = pipeline.retrieve(&ids, params.full_text).await?;
    if retrieval.is_partial() {
        info!(
            retrieved = retrieval.documents.len(),
            failed = retrieval.failed.len(),
            "Partial retrieval"
        );
    }
    Ok(Json(retrieval))
}

async fn select(
    State(pipeline): State<Pipeline>,
    params: Result<Query<SelectionParams>, QueryRejection>,
) -> ApiResult<Json<Selection>> {
    let Query(params) = params?;
    let query = params
        .query()
        .ok_or_else(|| ApiError::BadRequest("query must not be empty".to_string()))?;
    let options = params.apply(SelectOptions::default())?;
    let selection = pipeline.select(query, &options).await?;
    Ok(Json(selection))
}

async fn answer(
    State(pipeline): State<Pipeline>,
    request: Result<Json<AnswerRequest>, JsonRejection>,
) -> ApiResult<Json<AnswerResponse>> {
    let Json(request) = request?;
    let options = request.params.apply(SelectOptions::for_answer())?;
    let response = pipeline
        .answer(&request.question, request.params.query(), &options)
        .await?;
    Ok(Json(response))
}

async fn answer_usage() -> Json<Value> {
    let defaults = SelectOptions::for_answer();
    Json(json!({
        "detail": "This endpoint requires POST with a JSON body.",
        "example_body": {
            "question": "Do statins reduce all-cause mortality in high-risk adults?",
            "query": "statins mortality randomized[tiab]",
            "limit": defaults.limit,
            "chunk_size": defaults.chunk_size,
            "overlap": defaults.overlap,
            "top_k": 6,
            "alpha": defaults.alpha,
            "use_embeddings": defaults.use_embeddings,
            "freshness_weight": 0.35,
            "half_life_years": 6.0,
            "prefer_types": "RCT,Meta-analysis",
            "full_text": defaults.full_text,
            "sections": "Results,Methods,Discussion",
        },
    }))
}
