//! Chunk ranking: BM25 with optional semantic blend, recency and evidence boosts

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::evidence::preference_boost;
use crate::text::tokenize;

/// Ranking knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Number of chunks kept, clamped to `[1, candidates]`
    pub top_k: usize,
    /// Weight of cosine similarity against BM25 when embeddings are present
    pub alpha: f64,
    /// Weight of recency against content relevance
    pub freshness_weight: f64,
    pub half_life_years: f64,
    /// Study-type labels boosted ×1.2 (`"RCT"`, `"Meta-analysis"`)
    pub prefer_types: Vec<String>,
    /// Year recency is measured from; the current UTC year when unset
    pub reference_year: Option<i32>,
    pub k1: f64,
    pub b: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            alpha: 0.5,
            freshness_weight: 0.3,
            half_life_years: 5.0,
            prefer_types: Vec::new(),
            reference_year: None,
            k1: 1.2,
            b: 0.75,
        }
    }
}

/// A chunk with its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f64,
    /// Normalized lexical/semantic relevance before recency and boosts
    pub relevance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Lexical-only ranking
    pub fn rank(&self, query: &str, chunks: Vec<Chunk>) -> Vec<RankedChunk> {
        self.rank_with_similarity(query, chunks, None)
    }

    /// Rank with optional query/chunk cosine similarities aligned to `chunks`
    pub fn rank_with_similarity(
        &self,
        query: &str,
        chunks: Vec<Chunk>,
        similarities: Option<&[f64]>,
    ) -> Vec<RankedChunk> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let lexical = minmax(&bm25_scores(query, &texts, self.config.k1, self.config.b));

        let relevance = match similarities {
            Some(sims) if sims.len() == chunks.len() => {
                let alpha = self.config.alpha.clamp(0.0, 1.0);
                minmax(sims)
                    .iter()
                    .zip(&lexical)
                    .map(|(cos, bm)| alpha * cos + (1.0 - alpha) * bm)
                    .collect()
            }
            Some(sims) => {
                warn!(
                    similarities = sims.len(),
                    chunks = chunks.len(),
                    "Similarity count mismatch, ranking lexically"
                );
                lexical
            }
            None => lexical,
        };

        let now = self.config.reference_year.unwrap_or_else(current_year);
        let fresh: Vec<f64> = chunks
            .iter()
            .map(|c| freshness(c.year, now, self.config.half_life_years))
            .collect();
        let blended = blend_with_freshness(&relevance, &fresh, self.config.freshness_weight);

        let mut ranked: Vec<RankedChunk> = chunks
            .into_iter()
            .zip(blended)
            .zip(relevance)
            .map(|((chunk, base), relevance)| {
                let score = base
                    * preference_boost(chunk.study_type, &self.config.prefer_types)
                    * chunk.section.weight();
                RankedChunk {
                    chunk,
                    score,
                    relevance,
                }
            })
            .collect();

        ranked.sort_by(compare_ranked);

        let best = ranked
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.relevance.total_cmp(&b.relevance).then(ib.cmp(ia)))
            .map(|(idx, _)| idx);

        let k = self.config.top_k.clamp(1, ranked.len());
        if let Some(best) = best.filter(|&idx| idx >= k) {
            debug!(
                chunk = %ranked[best].chunk.id,
                "Keeping best content match in selection"
            );
            ranked.swap(k - 1, best);
        }
        ranked.truncate(k);
        ranked
    }
}

/// Score descending, then newer first (unknown year last), then chunk id
pub fn compare_ranked(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.chunk.year, b.chunk.year) {
            (Some(ya), Some(yb)) => yb.cmp(&ya),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// BM25 over lowercased word tokens; idf is `ln((N - n + 0.5)/(n + 0.5) + 1)`
pub fn bm25_scores(query: &str, docs: &[&str], k1: f64, b: f64) -> Vec<f64> {
    if docs.is_empty() {
        return Vec::new();
    }
    let query_tokens = tokenize(query);
    let doc_tokens: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d)).collect();

    let n_docs = doc_tokens.len() as f64;
    let avg_len = doc_tokens.iter().map(Vec::len).sum::<usize>() as f64 / n_docs;

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &doc_tokens {
        let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for token in seen {
            *doc_freq.entry(token).or_default() += 1;
        }
    }

    doc_tokens
        .iter()
        .map(|tokens| {
            let mut term_freq: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token.as_str()).or_default() += 1;
            }
            let norm = k1 * (1.0 - b + b * (tokens.len() as f64 / avg_len.max(1e-9)));
            query_tokens
                .iter()
                .filter_map(|q| {
                    let tf = *term_freq.get(q.as_str())? as f64;
                    let n = *doc_freq.get(q.as_str()).unwrap_or(&0) as f64;
                    let idf = ((n_docs - n + 0.5) / (n + 0.5) + 1.0).ln();
                    Some(idf * (tf * (k1 + 1.0)) / (tf + norm))
                })
                .sum()
        })
        .collect()
}

/// Scale to `[0, 1]`; a constant input maps to all zeros
pub fn minmax(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || hi - lo < 1e-12 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / (hi - lo)).collect()
}

/// `2^(-age / half_life)`; 0.5 for an unknown year
pub fn freshness(year: Option<i32>, reference_year: i32, half_life_years: f64) -> f64 {
    match year {
        None => 0.5,
        Some(year) => {
            let age = f64::from(reference_year - year).max(0.0);
            2f64.powf(-age / half_life_years.max(0.1))
        }
    }
}

/// `(1 - w) * minmax(content) + w * minmax(freshness)`, `w` clamped to `[0, 1]`
pub fn blend_with_freshness(content: &[f64], fresh: &[f64], weight: f64) -> Vec<f64> {
    let weight = weight.clamp(0.0, 1.0);
    minmax(content)
        .into_iter()
        .zip(minmax(fresh))
        .map(|(c, f)| (1.0 - weight) * c + weight * f)
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn current_year() -> i32 {
    time::OffsetDateTime::now_utc().year()
}
