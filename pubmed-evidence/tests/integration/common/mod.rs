//! Shared fixtures for the mocked integration tests
#![allow(dead_code)]

use pubmed_evidence::{ClientConfig, PubMedClient, RetryConfig};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A minimal EFetch `PubmedArticleSet` for one record
pub fn pubmed_record(pmid: &str, title: &str, abstract_text: &str, year: i32, pub_type: &str) -> String {
    format!(
        r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">{pmid}</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue><PubDate><Year>{year}</Year><Month>Mar</Month></PubDate></JournalIssue>
          <Title>Diabetes Care</Title>
        </Journal>
        <ArticleTitle>{title}</ArticleTitle>
        <Abstract><AbstractText>{abstract_text}</AbstractText></Abstract>
        <PublicationTypeList>
          <PublicationType>Journal Article</PublicationType>
          <PublicationType>{pub_type}</PublicationType>
        </PublicationTypeList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList><ArticleId IdType="pubmed">{pmid}</ArticleId></ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#
    )
}

/// One EFetch `PubmedArticleSet` holding every record in `records`
pub fn pubmed_article_set(records: &[String]) -> String {
    let articles: Vec<&str> = records
        .iter()
        .filter_map(|record| {
            let start = record.find("<PubmedArticle>")?;
            let end = record.rfind("</PubmedArticleSet>")?;
            Some(&record[start..end])
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" ?>\n<PubmedArticleSet>\n{}</PubmedArticleSet>",
        articles.concat()
    )
}

pub fn esearch_body(ids: &[&str]) -> serde_json::Value {
    json!({
        "header": { "type": "esearch", "version": "0.3" },
        "esearchresult": {
            "count": ids.len().to_string(),
            "retmax": ids.len().to_string(),
            "retstart": "0",
            "idlist": ids,
        }
    })
}

pub async fn mock_esearch(server: &MockServer, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(ids)))
        .mount(server)
        .await;
}

pub async fn mock_efetch(server: &MockServer, pmid: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("db", "pubmed"))
        .and(query_param("id", pmid))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/xml"),
        )
        .mount(server)
        .await;
}

/// The metformin corpus: three abstracts about glycaemic control
pub const METFORMIN: [(&str, &str, &str, i32, &str); 3] = [
    (
        "30000001",
        "Metformin versus placebo in type 2 diabetes",
        "In this randomized trial, metformin reduced HbA1c by 1.1% compared with placebo. Gastrointestinal events were more frequent with metformin.",
        2021,
        "Randomized Controlled Trial",
    ),
    (
        "30000002",
        "Long-term glycaemic control with metformin: a cohort study",
        "Among 12,000 adults, metformin users maintained lower HbA1c over five years. Weight remained stable.",
        2018,
        "Observational Study",
    ),
    (
        "30000003",
        "Metformin and HbA1c: a meta-analysis",
        "Pooled trials showed metformin lowered HbA1c by 0.9% on average. Heterogeneity was moderate.",
        2023,
        "Meta-Analysis",
    ),
];

pub async fn mount_metformin_corpus(server: &MockServer) {
    let ids: Vec<&str> = METFORMIN.iter().map(|r| r.0).collect();
    mock_esearch(server, &ids).await;
    let mut records = Vec::new();
    for (pmid, title, abstract_text, year, pub_type) in METFORMIN {
        let record = pubmed_record(pmid, title, abstract_text, year, pub_type);
        mock_efetch(server, pmid, record.clone()).await;
        records.push(record);
    }
    mock_efetch(server, &ids.join(","), pubmed_article_set(&records)).await;
}

/// Fast retries so failure paths finish quickly
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .without_jitter()
}

pub fn mock_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new()
        .with_base_url(server.uri())
        .with_rate_limit(100.0)
        .with_retry_config(fast_retry())
}

pub fn mock_client(server: &MockServer) -> PubMedClient {
    PubMedClient::new(mock_config(server)).expect("client should build")
}
