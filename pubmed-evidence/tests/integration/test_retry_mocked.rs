//! Retry policy against transient E-utilities failures

mod common;

use common::{esearch_body, mock_client};
use pubmed_evidence::{ClientConfig, EvidenceError, PubMedClient, RetryConfig};
use tracing_test::traced_test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[traced_test]
async fn test_transient_503_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["42"])))
        .mount(&server)
        .await;

    let pmids = mock_client(&server).search("metformin", 5).await.unwrap();

    assert_eq!(pmids.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(logs_contain("Retrying after transient failure"));
}

#[tokio::test]
#[traced_test]
async fn test_exhausted_retries_surface_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = mock_client(&server).search("metformin", 5).await.unwrap_err();

    match err {
        EvidenceError::UpstreamUnavailable { attempts, message, .. } => {
            assert_eq!(attempts, 3);
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
#[traced_test]
async fn test_throttling_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["7"])))
        .mount(&server)
        .await;

    let pmids = mock_client(&server).search("aspirin", 5).await.unwrap();
    assert_eq!(pmids[0].to_string(), "7");
}

#[tokio::test]
#[traced_test]
async fn test_disabled_retries_fail_after_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = PubMedClient::new(
        ClientConfig::new()
            .with_base_url(server.uri())
            .with_rate_limit(100.0)
            .with_retry_config(RetryConfig::disabled()),
    )
    .unwrap();
    let err = client.search("aspirin", 5).await.unwrap_err();

    assert!(matches!(err, EvidenceError::UpstreamUnavailable { attempts: 1, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
