//! ESearch behaviour against a mocked E-utilities server

mod common;

use common::{esearch_body, mock_client, mock_config};
use pubmed_evidence::{EvidenceError, PubMedClient};
use serde_json::json;
use tracing_test::traced_test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[traced_test]
async fn test_search_returns_pmids_in_relevance_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .and(query_param("term", "metformin HbA1c"))
        .and(query_param("retmax", "3"))
        .and(query_param("sort", "relevance"))
        .and(query_param("tool", "pubmed-evidence"))
        .and(query_param("email", "lab@example.org"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(esearch_body(&["300", "100", "300", "200"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = PubMedClient::new(mock_config(&server).with_email("lab@example.org")).unwrap();
    let pmids = client.search("metformin HbA1c", 3).await.unwrap();

    let ids: Vec<String> = pmids.iter().map(|p| p.to_string()).collect();
    assert_eq!(ids, vec!["300", "100", "200"]);
}

#[tokio::test]
#[traced_test]
async fn test_repeated_search_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["1", "2"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let first = client.search("aspirin", 10).await.unwrap();
    let second = client.search("  aspirin ", 10).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
#[traced_test]
async fn test_ncbi_error_field_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "esearchresult": { "count": "0", "idlist": [], "ERROR": "Invalid query syntax" }
        })))
        .mount(&server)
        .await;

    let err = mock_client(&server).search("((", 5).await.unwrap_err();
    match err {
        EvidenceError::ApiError { status, message } => {
            assert_eq!(status, 200);
            assert!(message.contains("Invalid query syntax"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
#[traced_test]
async fn test_blank_query_makes_no_request() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    assert!(client.search("   ", 10).await.unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = mock_client(&server).search("metformin", 5).await.unwrap_err();
    assert!(matches!(err, EvidenceError::ApiError { status: 400, .. }));
}
