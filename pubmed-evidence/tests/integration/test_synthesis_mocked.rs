//! Language-model synthesis against a mocked chat completions endpoint

mod common;

use common::{mock_client, mount_metformin_corpus, METFORMIN};
use pubmed_evidence::synthesis::grounding::cited_pmids;
use pubmed_evidence::{
    AnswerResponse, AnswerStatus, ModelConfig, OpenAiChat, Pipeline, PubMedId, RetrievalConfig,
    SelectOptions, SynthesisConfig,
};
use serde_json::json;
use std::sync::Arc;
use tracing_test::traced_test;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() },
            "finish_reason": "stop"
        }]
    }))
}

async fn answer_with_chat(server: &MockServer) -> AnswerResponse {
    let chat = OpenAiChat::new(
        ModelConfig::new("sk-test")
            .with_base_url(server.uri())
            .with_chat_model("gpt-4o-mini"),
    )
    .unwrap();

    Pipeline::with_client(
        mock_client(server),
        RetrievalConfig::default(),
        SynthesisConfig::default(),
    )
    .with_language_model(Arc::new(chat))
    .answer(
        "Does metformin lower HbA1c?",
        Some("metformin HbA1c"),
        &SelectOptions {
            full_text: false,
            use_embeddings: false,
            ..SelectOptions::for_answer()
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
#[traced_test]
async fn test_model_answer_is_grounded_against_evidence() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(chat_reply(json!({
            "answer": "Metformin lowers HbA1c by about 1% [PMID:30000001][PMID:30000003]. \
                       It also prevents dementia [PMID:99999999]. \
                       It is the best drug ever.",
            "citations": [
                { "pmid": "30000001", "quote": "metformin reduced HbA1c by 1.1% compared with placebo" },
                { "pmid": "30000003", "quote": "metformin cured everyone" },
                { "pmid": "99999999", "quote": "dementia" }
            ],
            "notes": "Two trials and a meta-analysis."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = answer_with_chat(&server).await;

    assert_eq!(response.status, AnswerStatus::Answered);
    assert_eq!(
        response.answer,
        "Metformin lowers HbA1c by about 1% [PMID:30000001] [PMID:30000003]."
    );

    let referenced: Vec<String> = response.references.iter().map(|r| r.pmid.to_string()).collect();
    assert_eq!(referenced, vec!["30000001", "30000003"]);
    assert_eq!(
        cited_pmids(&response.answer),
        response.references.iter().map(|r| r.pmid).collect::<Vec<_>>()
    );

    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].pmid, PubMedId::parse("30000001").unwrap());
    assert!(response.notes.contains("Two trials and a meta-analysis."));
    assert!(response.notes.contains("Removed 2 statement(s)"));
}

#[tokio::test]
#[traced_test]
async fn test_model_refusal_is_honoured() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!({
            "answer": "insufficient_evidence",
            "citations": [],
            "notes": "Excerpts do not report long-term outcomes."
        })))
        .mount(&server)
        .await;

    let response = answer_with_chat(&server).await;

    assert_eq!(response.status, AnswerStatus::InsufficientEvidence);
    assert!(response.references.is_empty());
    assert_eq!(response.notes, "Excerpts do not report long-term outcomes.");
}

#[tokio::test]
#[traced_test]
async fn test_provider_error_fails_closed() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "The server had an error", "type": "server_error" }
        })))
        .mount(&server)
        .await;

    let response = answer_with_chat(&server).await;

    assert_eq!(response.status, AnswerStatus::InsufficientEvidence);
    assert_eq!(response.answer, "insufficient_evidence");
    assert!(response.citations.is_empty());
    assert!(response.notes.contains("The server had an error"));
}

#[tokio::test]
#[traced_test]
async fn test_malformed_model_output_fails_closed() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Metformin works [PMID:30000001]." } }]
        })))
        .mount(&server)
        .await;

    let response = answer_with_chat(&server).await;

    assert_eq!(response.status, AnswerStatus::InsufficientEvidence);
    assert!(response.references.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_prompt_lists_only_retrieved_pmids() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!({
            "answer": "insufficient_evidence",
            "citations": [],
            "notes": ""
        })))
        .mount(&server)
        .await;

    answer_with_chat(&server).await;

    let requests = server.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/chat/completions")
        .expect("chat request");
    let body: serde_json::Value = serde_json::from_slice(&chat.body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.starts_with("Question:\nDoes metformin lower HbA1c?"));
    for (pmid, ..) in METFORMIN {
        assert!(user.contains(&format!("[PMID:{pmid}]")));
    }
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["temperature"].as_f64().map(|t| (t * 10.0).round()), Some(2.0));
}
