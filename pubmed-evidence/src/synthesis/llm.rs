//! Language-model drafting through an OpenAI-compatible chat completions API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::{Draft, DraftCitation, EvidenceSet};
use crate::config::ModelConfig;
use crate::embedding::OpenAiErrorBody;
use crate::error::{EvidenceError, Result};

pub const SYSTEM_PROMPT: &str = "You are a meticulous biomedical literature analyst. \
You may ONLY answer using the provided PubMed/PMC excerpts. \
Every non-trivial claim must be supported by inline citations like [PMID:########]. \
If there is insufficient evidence, respond with this exact JSON object: \
{\"answer\":\"insufficient_evidence\",\"citations\":[],\"notes\":\"<why>\"} \
and do not speculate.";

pub const RESPONSE_RULES: &str = "Return a STRICT JSON object with keys: \
{\"answer\": string, \"citations\": [{\"pmid\": string, \"quote\": string}], \"notes\": string}. \
Each citation must include a concise quote (<=200 chars) copied verbatim from the provided excerpt. \
Only cite the PMIDs shown with the excerpts. Do not invent identifiers or quotes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat model that answers in JSON mode
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    /// Raw JSON text of the model's reply
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Prompt built from the question and the evidence excerpts only
pub fn build_messages(question: &str, evidence: &EvidenceSet) -> Vec<ChatMessage> {
    let excerpts: Vec<String> = evidence
        .items()
        .iter()
        .map(|item| {
            format!(
                "[PMID:{}] {} | Section: {}\n{}",
                item.pmid,
                item.title.trim(),
                item.section.as_str(),
                item.text.trim()
            )
        })
        .collect();

    let user = format!(
        "Question:\n{}\n\nEvidence (excerpts; cite with the PMIDs shown):\n{}",
        question.trim(),
        excerpts.join("\n\n")
    );

    vec![
        ChatMessage::new(Role::System, SYSTEM_PROMPT),
        ChatMessage::new(Role::User, user),
        ChatMessage::new(Role::Assistant, RESPONSE_RULES),
    ]
}

/// Parse a JSON-mode reply into a draft.
///
/// `answer` must be a string and `citations` an array; identifiers may be
/// strings or numbers. Citations without a quote or an identifier are skipped.
pub fn parse_draft(raw: &str) -> Result<Draft> {
    let value: Value = serde_json::from_str(raw.trim())?;
    let object = value
        .as_object()
        .ok_or_else(|| EvidenceError::ModelError("model output is not a JSON object".to_string()))?;

    let answer = object
        .get("answer")
        .and_then(Value::as_str)
        .ok_or_else(|| EvidenceError::ModelError("model output has no answer text".to_string()))?
        .to_string();
    let citations = object
        .get("citations")
        .and_then(Value::as_array)
        .ok_or_else(|| EvidenceError::ModelError("model output has no citations array".to_string()))?;

    let citations = citations
        .iter()
        .filter_map(|entry| {
            let citation = DraftCitation {
                pmid: scalar_text(entry.get("pmid")),
                pmcid: scalar_text(entry.get("pmcid")),
                quote: scalar_text(entry.get("quote")),
            };
            let identified = !citation.pmid.is_empty() || !citation.pmcid.is_empty();
            (identified && !citation.quote.is_empty()).then_some(citation)
        })
        .collect();

    Ok(Draft {
        answer,
        citations,
        notes: scalar_text(object.get("notes")),
    })
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Ask `model` for a draft answer grounded in `evidence`
pub async fn draft_answer(
    model: &dyn LanguageModel,
    question: &str,
    evidence: &EvidenceSet,
) -> Result<Draft> {
    let messages = build_messages(question, evidence);
    let raw = model.complete_json(&messages).await?;
    parse_draft(&raw)
}

/// OpenAI-compatible chat completions client in JSON mode
pub struct OpenAiChat {
    client: Client,
    config: ModelConfig,
    model: String,
}

impl OpenAiChat {
    /// Fails with `InvalidConfig` when no chat model is configured
    pub fn new(config: ModelConfig) -> Result<Self> {
        let model = config
            .chat_model
            .clone()
            .ok_or_else(|| EvidenceError::InvalidConfig("no chat model configured".to_string()))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            model,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = %status, "Chat completion request failed");
            return Err(EvidenceError::ModelError(format!(
                "chat completion failed with {status}: {message}"
            )));
        }

        let response: ChatResponse = response.json().await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EvidenceError::ModelError("chat completion had no content".to_string()))?;
        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }
}
