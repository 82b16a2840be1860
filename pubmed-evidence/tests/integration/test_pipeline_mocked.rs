//! End-to-end pipeline runs against mocked NCBI and embedding endpoints

mod common;

use common::{mock_client, mock_efetch, mock_esearch, mount_metformin_corpus, pubmed_record, METFORMIN};
use pubmed_evidence::synthesis::grounding::cited_pmids;
use pubmed_evidence::{
    AnswerStatus, ModelConfig, OpenAiEmbedder, Pipeline, PipelineStage, PubMedId,
    RetrievalConfig, SelectOptions, SelectionStatus, SynthesisConfig,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing_test::traced_test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(server: &MockServer) -> Pipeline {
    Pipeline::with_client(
        mock_client(server),
        RetrievalConfig::default(),
        SynthesisConfig::default(),
    )
}

fn abstracts_only() -> SelectOptions {
    SelectOptions {
        full_text: false,
        ..SelectOptions::for_answer()
    }
}

fn metformin_pmids() -> HashSet<PubMedId> {
    METFORMIN
        .iter()
        .map(|r| PubMedId::parse(r.0).unwrap())
        .collect()
}

#[tokio::test]
#[traced_test]
async fn test_metformin_answer_cites_only_retrieved_abstracts() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;

    let response = pipeline(&server)
        .answer(
            "Does metformin lower HbA1c in type 2 diabetes?",
            Some("metformin HbA1c"),
            &abstracts_only(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, AnswerStatus::Answered);
    assert_eq!(response.query, "metformin HbA1c");
    assert!(!response.used_embeddings);

    let allowed = metformin_pmids();
    let referenced: Vec<PubMedId> = response.references.iter().map(|r| r.pmid).collect();
    assert!(!referenced.is_empty());
    assert!(referenced.iter().all(|pmid| allowed.contains(pmid)));

    // every marker has a reference and every reference is cited, in first-citation order
    assert_eq!(cited_pmids(&response.answer), referenced);

    assert_eq!(
        response.stages,
        vec![
            PipelineStage::Searching,
            PipelineStage::Retrieving,
            PipelineStage::Chunking,
            PipelineStage::Ranking,
            PipelineStage::Synthesizing,
            PipelineStage::Done,
        ]
    );
}

#[tokio::test]
#[traced_test]
async fn test_zero_search_results_is_no_evidence_found() {
    let server = MockServer::start().await;
    mock_esearch(&server, &[]).await;

    let response = pipeline(&server)
        .answer("Does unobtainium cure gout?", None, &abstracts_only())
        .await
        .unwrap();

    assert_eq!(response.status, AnswerStatus::NoEvidenceFound);
    assert_eq!(response.answer, "no_evidence_found");
    assert!(response.references.is_empty());
    assert!(response.citations.is_empty());
    assert_eq!(
        response.stages,
        vec![PipelineStage::Searching, PipelineStage::Done]
    );
}

#[tokio::test]
#[traced_test]
async fn test_partial_retrieval_still_ranks_the_subset() {
    let server = MockServer::start().await;
    mock_esearch(&server, &["30000001", "30000009"]).await;
    let (pmid, title, abstract_text, year, pub_type) = METFORMIN[0];
    mock_efetch(&server, pmid, pubmed_record(pmid, title, abstract_text, year, pub_type)).await;
    mock_efetch(
        &server,
        "30000009",
        r#"<?xml version="1.0" ?><PubmedArticleSet></PubmedArticleSet>"#.to_string(),
    )
    .await;

    let selection = pipeline(&server)
        .select("metformin HbA1c", &SelectOptions::default())
        .await
        .unwrap();

    assert_eq!(selection.status, SelectionStatus::Selected);
    assert_eq!(selection.documents, 1);
    assert!(selection
        .chunks
        .iter()
        .all(|c| c.chunk.pmid.to_string() == "30000001"));
    let warning = selection
        .warnings
        .iter()
        .find(|w| w.code == "partial_retrieval")
        .expect("partial retrieval warning");
    assert_eq!(warning.pmids, vec![PubMedId::parse("30000009").unwrap()]);
}

#[tokio::test]
#[traced_test]
async fn test_selection_is_deterministic() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    let pipeline = pipeline(&server);
    let options = SelectOptions {
        prefer_types: vec!["RCT".to_string()],
        ..SelectOptions::default()
    };

    let first = pipeline.select("metformin HbA1c", &options).await.unwrap();
    let second = pipeline.select("metformin HbA1c", &options).await.unwrap();

    assert_eq!(first.chunks.len(), 3);
    assert_eq!(first.chunks, second.chunks);
}

#[tokio::test]
#[traced_test]
async fn test_invalid_options_are_rejected_before_searching() {
    let server = MockServer::start().await;
    let options = SelectOptions {
        top_k: 50,
        ..SelectOptions::default()
    };

    let err = pipeline(&server).select("metformin", &options).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_embeddings_blend_into_ranking() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    // query + three abstract chunks
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [
                { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] },
                { "object": "embedding", "index": 1, "embedding": [0.9, 0.1] },
                { "object": "embedding", "index": 2, "embedding": [0.1, 0.9] },
                { "object": "embedding", "index": 3, "embedding": [0.7, 0.3] }
            ],
            "usage": { "prompt_tokens": 40, "total_tokens": 40 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(ModelConfig::new("sk-test").with_base_url(server.uri())).unwrap();
    let selection = pipeline(&server)
        .with_embedder(Arc::new(embedder))
        .select("metformin HbA1c", &SelectOptions::default())
        .await
        .unwrap();

    assert!(selection.used_embeddings);
    assert!(selection.warnings.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_embedding_failure_falls_back_to_bm25() {
    let server = MockServer::start().await;
    mount_metformin_corpus(&server).await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "backend overloaded", "type": "server_error" }
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(ModelConfig::new("sk-test").with_base_url(server.uri())).unwrap();
    let selection = pipeline(&server)
        .with_embedder(Arc::new(embedder))
        .select("metformin HbA1c", &SelectOptions::default())
        .await
        .unwrap();

    assert!(!selection.used_embeddings);
    assert_eq!(selection.chunks.len(), 3);
    let warning = &selection.warnings[0];
    assert_eq!(warning.code, "embeddings_unavailable");
    assert!(warning.message.contains("backend overloaded"));
}

#[tokio::test]
#[traced_test]
async fn test_search_outage_fails_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = pipeline(&server)
        .answer("Does metformin work?", None, &abstracts_only())
        .await
        .unwrap_err();
    assert!(err.is_upstream_outage());
}
