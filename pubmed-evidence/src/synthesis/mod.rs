//! Grounded answer synthesis over a fixed set of ranked chunks
//!
//! The synthesizer never sees anything but an [`EvidenceSet`] built from the
//! selected chunks. Drafts, whether written by a language model or extracted
//! from the evidence, pass through [`grounding::ground`] before they become an
//! [`Answer`]: unsupported statements are dropped, foreign citation markers are
//! removed and the references block is derived from the markers that remain.

pub mod grounding;
pub mod llm;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::common::{PmcId, PubMedId};
use crate::evidence::Section;
use crate::rank::RankedChunk;
use crate::text::normalize_whitespace;

pub use grounding::{extractive_draft, ground};
pub use llm::{ChatMessage, LanguageModel, OpenAiChat};

/// Outcome class of an answer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    NoEvidenceFound,
    InsufficientEvidence,
}

/// A verified quote backing a cited document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub pmid: PubMedId,
    pub pmcid: Option<PmcId>,
    pub quote: String,
}

/// One entry of the references block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub pmid: PubMedId,
    pub pmcid: Option<PmcId>,
    pub title: String,
    pub journal: String,
    pub year: Option<i32>,
    pub url: String,
    pub pmc_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub status: AnswerStatus,
    /// Answer text with `[PMID:n]` markers, or the status label when not answered
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Cited documents in order of first citation
    pub references: Vec<Reference>,
    pub notes: String,
}

impl Answer {
    pub fn insufficient_evidence<S: Into<String>>(notes: S) -> Self {
        Self::empty(AnswerStatus::InsufficientEvidence, notes)
    }

    pub fn no_evidence_found<S: Into<String>>(notes: S) -> Self {
        Self::empty(AnswerStatus::NoEvidenceFound, notes)
    }

    fn empty<S: Into<String>>(status: AnswerStatus, notes: S) -> Self {
        let answer = match status {
            AnswerStatus::Answered => String::new(),
            AnswerStatus::NoEvidenceFound => "no_evidence_found".to_string(),
            AnswerStatus::InsufficientEvidence => "insufficient_evidence".to_string(),
        };
        Self {
            status,
            answer,
            citations: Vec::new(),
            references: Vec::new(),
            notes: notes.into(),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.status == AnswerStatus::Answered
    }
}

/// An unvalidated answer: model output or extractive statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub answer: String,
    pub citations: Vec<DraftCitation>,
    pub notes: String,
}

/// A citation as written in a draft; identifiers are not yet resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftCitation {
    pub pmid: String,
    pub pmcid: String,
    pub quote: String,
}

/// One excerpt the synthesizer may cite
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceItem {
    pub pmid: PubMedId,
    pub pmcid: Option<PmcId>,
    pub title: String,
    pub journal: String,
    pub year: Option<i32>,
    pub section: Section,
    pub text: String,
}

/// The closed world of excerpts an answer may draw on, in rank order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSet {
    items: Vec<EvidenceItem>,
}

impl EvidenceSet {
    /// Take chunks in rank order until `max_chars` of excerpt text is reached.
    /// The first chunk is always included.
    pub fn from_ranked(chunks: &[RankedChunk], max_chars: usize) -> Self {
        let mut items = Vec::with_capacity(chunks.len());
        let mut used = 0;
        for ranked in chunks {
            let chunk = &ranked.chunk;
            if !items.is_empty() && used + chunk.text.len() > max_chars {
                break;
            }
            used += chunk.text.len();
            items.push(EvidenceItem {
                pmid: chunk.pmid,
                pmcid: chunk.pmcid,
                title: chunk.title.clone(),
                journal: chunk.journal.clone(),
                year: chunk.year,
                section: chunk.section,
                text: chunk.text.clone(),
            });
        }
        Self { items }
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, pmid: PubMedId) -> bool {
        self.items.iter().any(|item| item.pmid == pmid)
    }

    /// PMID of the evidence document carrying `pmcid`
    pub fn pmid_for_pmcid(&self, pmcid: PmcId) -> Option<PubMedId> {
        self.items
            .iter()
            .find(|item| item.pmcid == Some(pmcid))
            .map(|item| item.pmid)
    }

    /// First excerpt of `pmid`, the source of its reference metadata
    pub fn first_for(&self, pmid: PubMedId) -> Option<&EvidenceItem> {
        self.items.iter().find(|item| item.pmid == pmid)
    }

    /// Whether `quote` occurs in one of `pmid`'s excerpts, ignoring case and
    /// whitespace differences
    pub fn supports_quote(&self, pmid: PubMedId, quote: &str) -> bool {
        let needle = normalize_whitespace(quote).to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.items
            .iter()
            .filter(|item| item.pmid == pmid)
            .any(|item| normalize_whitespace(&item.text).to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Best chunk score must reach this for synthesis to run
    pub min_relevance: f64,
    /// Statements in an extractive answer, one per document
    pub max_statements: usize,
    /// Budget of excerpt text handed to the model
    pub max_evidence_chars: usize,
    /// Longest quote accepted as a citation
    pub max_quote_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_relevance: 0.0,
            max_statements: 5,
            max_evidence_chars: 12_000,
            max_quote_chars: 200,
        }
    }
}

/// Produces grounded answers, through a language model when one is set and
/// extractively otherwise
#[derive(Clone, Default)]
pub struct Synthesizer {
    config: SynthesisConfig,
    model: Option<Arc<dyn LanguageModel>>,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// `"llm"` or `"extractive"`
    pub fn mode(&self) -> &'static str {
        if self.model.is_some() {
            "llm"
        } else {
            "extractive"
        }
    }

    /// Answer `question` from `chunks` only. Never fails: provider errors and
    /// unusable drafts become `insufficient_evidence`.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len(), mode = self.mode()))]
    pub async fn synthesize(&self, question: &str, chunks: &[RankedChunk]) -> Answer {
        let best = chunks
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        if chunks.is_empty() || best < self.config.min_relevance {
            info!(best_score = best, "Evidence below relevance threshold");
            return Answer::insufficient_evidence(
                "No retrieved passage is relevant enough to answer the question.",
            );
        }

        let evidence = EvidenceSet::from_ranked(chunks, self.config.max_evidence_chars);

        let draft = match &self.model {
            Some(model) => match llm::draft_answer(model.as_ref(), question, &evidence).await {
                Ok(draft) => draft,
                Err(err) => {
                    warn!(error = %err, "Language model synthesis failed");
                    return Answer::insufficient_evidence(format!(
                        "Language model call failed or returned malformed output: {err}"
                    ));
                }
            },
            None => extractive_draft(question, &evidence, self.config.max_statements),
        };

        if draft.answer.trim().eq_ignore_ascii_case("insufficient_evidence") {
            info!("Draft declined to answer");
            return Answer::insufficient_evidence(draft.notes);
        }

        let answer = ground(draft, &evidence, self.config.max_quote_chars);
        info!(
            status = ?answer.status,
            references = answer.references.len(),
            citations = answer.citations.len(),
            "Synthesis completed"
        );
        answer
    }
}
