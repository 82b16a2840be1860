//! HTTP routes against a pipeline backed by mocked E-utilities

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pubmed_evidence::{ClientConfig, Pipeline, PipelineConfig, RetryConfig};
use pubmed_evidence_server::router;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use tracing_test::traced_test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CORPUS: [(&str, &str, &str, i32, &str); 2] = [
    (
        "30000001",
        "Metformin versus placebo in type 2 diabetes",
        "In this randomized trial, metformin reduced HbA1c by 1.1% compared with placebo.",
        2021,
        "Randomized Controlled Trial",
    ),
    (
        "30000003",
        "Metformin and HbA1c: a meta-analysis",
        "Pooled trials showed metformin lowered HbA1c by 0.9% on average.",
        2023,
        "Meta-Analysis",
    ),
];

fn pubmed_record(pmid: &str, title: &str, abstract_text: &str, year: i32, pub_type: &str) -> String {
    format!(
        r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">{pmid}</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue><PubDate><Year>{year}</Year></PubDate></JournalIssue>
          <Title>Diabetes Care</Title>
        </Journal>
        <ArticleTitle>{title}</ArticleTitle>
        <Abstract><AbstractText>{abstract_text}</AbstractText></Abstract>
        <PublicationTypeList><PublicationType>{pub_type}</PublicationType></PublicationTypeList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#
    )
}

async fn mock_esearch(server: &MockServer, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "esearchresult": { "count": ids.len().to_string(), "idlist": ids }
        })))
        .mount(server)
        .await;
}

async fn mount_corpus(server: &MockServer) {
    let ids: Vec<&str> = CORPUS.iter().map(|r| r.0).collect();
    mock_esearch(server, &ids).await;
    for (pmid, title, abstract_text, year, pub_type) in CORPUS {
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("id", pmid))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(pubmed_record(pmid, title, abstract_text, year, pub_type)),
            )
            .mount(server)
            .await;
    }
}

fn app(server: &MockServer) -> Router {
    let client = ClientConfig::new()
        .with_base_url(server.uri())
        .with_rate_limit(100.0)
        .with_retry_config(
            RetryConfig::new()
                .with_max_retries(1)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2))
                .without_jitter(),
        );
    let pipeline = Pipeline::new(PipelineConfig {
        client,
        ..PipelineConfig::default()
    })
    .unwrap();
    router(pipeline)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

#[tokio::test]
#[traced_test]
async fn test_search_returns_pmids() {
    let server = MockServer::start().await;
    mock_esearch(&server, &["30000001", "30000003"]).await;

    let (status, body) = get(app(&server), "/pubmed/search?query=metformin&limit=5").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "metformin");
    assert_eq!(body["count"], 2);
    assert_eq!(body["pmids"], json!(["30000001", "30000003"]));
}

#[tokio::test]
#[traced_test]
async fn test_search_limit_out_of_range_is_unprocessable() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/pubmed/search?query=metformin&limit=500").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_request");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_malformed_query_string_is_unprocessable() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/pubmed/search?query=metformin&limit=many").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
#[traced_test]
async fn test_invalid_ids_are_bad_request() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/pubmed/retrieve?ids=123,abc").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_pmid");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_retrieve_reports_partial_failures() {
    let server = MockServer::start().await;
    mount_corpus(&server).await;
    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("id", "30000009"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0" ?><PubmedArticleSet></PubmedArticleSet>"#,
        ))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/pubmed/retrieve?ids=30000001,30000009").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"].as_array().unwrap().len(), 1);
    assert_eq!(body["failed"][0]["pmid"], "30000009");
    assert_eq!(body["failed"][0]["retryable"], false);
}

#[tokio::test]
#[traced_test]
async fn test_select_applies_query_string_options() {
    let server = MockServer::start().await;
    mount_corpus(&server).await;

    let (status, body) = get(
        app(&server),
        "/pubmed/select?query=metformin%20HbA1c&top_k=1&prefer_types=RCT&use_embeddings=false",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "selected");
    assert_eq!(body["chunks"].as_array().unwrap().len(), 1);
    assert_eq!(body["used_embeddings"], false);
    assert_eq!(
        body["stages"],
        json!(["searching", "retrieving", "chunking", "ranking", "done"])
    );
}

#[tokio::test]
#[traced_test]
async fn test_select_rejects_unknown_section() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/pubmed/select?query=metformin&sections=Appendix").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("Appendix"));
}

#[tokio::test]
#[traced_test]
async fn test_answer_cites_only_retrieved_documents() {
    let server = MockServer::start().await;
    mount_corpus(&server).await;

    let (status, body) = post_json(
        app(&server),
        "/pubmed/answer",
        &json!({
            "question": "Does metformin lower HbA1c?",
            "query": "metformin HbA1c",
            "full_text": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "answered");
    let references = body["references"].as_array().unwrap();
    assert!(!references.is_empty());
    for reference in references {
        let pmid = reference["pmid"].as_str().unwrap();
        assert!(CORPUS.iter().any(|r| r.0 == pmid));
        assert!(body["answer"]
            .as_str()
            .unwrap()
            .contains(&format!("[PMID:{pmid}]")));
    }
}

#[tokio::test]
#[traced_test]
async fn test_answer_without_hits_is_no_evidence_found() {
    let server = MockServer::start().await;
    mock_esearch(&server, &[]).await;

    let (status, body) = post_json(
        app(&server),
        "/pubmed/answer",
        &json!({ "question": "Does unobtainium cure gout?" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_evidence_found");
    assert_eq!(body["references"], json!([]));
}

#[tokio::test]
#[traced_test]
async fn test_answer_body_validation() {
    let server = MockServer::start().await;

    let (status, _) = post_json(app(&server), "/pubmed/answer", &json!({ "query": "x" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = post_json(
        app(&server),
        "/pubmed/answer",
        &json!({ "question": "Does metformin work?", "overlap": 900 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) =
        post_json(app(&server), "/pubmed/answer", &json!({ "question": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_query");

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_answer_get_returns_usage_hint() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/pubmed/answer").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["example_body"]["question"].is_string());
    assert_eq!(body["example_body"]["limit"], 30);
}

#[tokio::test]
#[traced_test]
async fn test_upstream_outage_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/pubmed/search?query=metformin").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "upstream_unavailable");
}
