mod fulltext;

use crate::cache::MemoryCache;
use crate::common::{PmcId, PubMedId};
use crate::config::ClientConfig;
use crate::document::{Document, SectionText};
use crate::error::{EvidenceError, Result};
use crate::pubmed::parser::parse_documents;
use crate::pubmed::responses::ESearchResult;
use crate::rate_limit::RateLimiter;
use crate::retry::{with_retry, RetryableError};
use reqwest::{Client, Response};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// PubMed limits retmax to 9,999 retrievable results
pub const MAX_SEARCH_RESULTS: usize = 9999;

/// NCBI recommends at most 200 IDs per EFetch request
const EFETCH_BATCH_SIZE: usize = 200;

/// Client for the E-utilities endpoints the evidence pipeline needs
///
/// Cloning is cheap: the HTTP client, rate limiter and caches are shared.
#[derive(Clone)]
pub struct PubMedClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    config: ClientConfig,
    documents: MemoryCache<PubMedId, Document>,
    sections: MemoryCache<PmcId, Vec<SectionText>>,
    searches: MemoryCache<(String, usize), Vec<PubMedId>>,
}

impl PubMedClient {
    /// Build a client; fails only if the TLS backend cannot be initialised
    ///
    /// ```
    /// use pubmed_evidence::{ClientConfig, PubMedClient};
    ///
    /// let client = PubMedClient::new(ClientConfig::new().with_email("lab@example.org")).unwrap();
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.effective_user_agent())
            .timeout(config.timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build around an existing `reqwest::Client` (shared connection pool)
    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self {
            client,
            base_url: config.effective_base_url().to_string(),
            rate_limiter: config.create_rate_limiter(),
            documents: MemoryCache::new(&config.document_cache),
            sections: MemoryCache::new(&config.document_cache),
            searches: MemoryCache::new(&config.search_cache),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Search PubMed by relevance and return up to `max_results` PMIDs
    ///
    /// # Errors
    ///
    /// * `EvidenceError::InvalidQuery` - if `max_results` exceeds [`MAX_SEARCH_RESULTS`]
    /// * `EvidenceError::ApiError` - if NCBI reports an error inside a 200 response
    /// * `EvidenceError::UpstreamUnavailable` - if retries against NCBI are exhausted
    #[instrument(skip(self), fields(query = %query, max_results))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PubMedId>> {
        if max_results > MAX_SEARCH_RESULTS {
            return Err(EvidenceError::InvalidQuery(format!(
                "requested {max_results} results, maximum is {MAX_SEARCH_RESULTS}"
            )));
        }
        let term = query.trim();
        if term.is_empty() || max_results == 0 {
            debug!("Empty query or zero limit, returning no results");
            return Ok(Vec::new());
        }

        let key = (term.to_string(), max_results);
        if let Some(cached) = self.searches.get(&key).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=json&sort=relevance",
            self.base_url,
            urlencoding::encode(term),
            max_results
        );
        let response = self.make_request(&url).await?;
        let result: ESearchResult = response.json().await?;

        if let Some(message) = result.esearchresult.error {
            return Err(EvidenceError::ApiError {
                status: 200,
                message: format!("NCBI ESearch error: {message}"),
            });
        }

        let mut pmids = Vec::with_capacity(result.esearchresult.idlist.len());
        for raw in &result.esearchresult.idlist {
            match PubMedId::parse(raw) {
                Ok(pmid) if !pmids.contains(&pmid) => pmids.push(pmid),
                Ok(_) => {}
                Err(_) => warn!(pmid = %raw, "Ignoring malformed PMID in ESearch result"),
            }
        }

        info!(
            total = result.esearchresult.count.as_deref().unwrap_or("0"),
            returned = pmids.len(),
            "Search completed"
        );
        self.searches.insert(key, pmids.clone()).await;
        Ok(pmids)
    }

    /// Fetch one PubMed record, served from cache when possible.
    ///
    /// Concurrent calls for the same PMID share a single upstream request.
    #[instrument(skip(self), fields(pmid = %pmid))]
    pub async fn fetch_document(&self, pmid: PubMedId) -> Result<Document> {
        self.documents
            .get_or_try_insert(pmid, self.fetch_document_uncached(pmid))
            .await
    }

    /// Fetch many PubMed records with one EFetch request per 200 PMIDs.
    ///
    /// Cached records are not requested again and every parsed record is
    /// cached under its own PMID. Documents come back in the order of `pmids`;
    /// PMIDs absent from the response are simply missing from the result.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any batch request fails or returns unparseable XML.
    #[instrument(skip(self, pmids), fields(requested = pmids.len()))]
    pub async fn fetch_documents(&self, pmids: &[PubMedId]) -> Result<Vec<Document>> {
        let mut found: HashMap<PubMedId, Document> = HashMap::with_capacity(pmids.len());
        let mut uncached: Vec<PubMedId> = Vec::new();
        for pmid in pmids {
            if found.contains_key(pmid) || uncached.contains(pmid) {
                continue;
            }
            match self.documents.get(pmid).await {
                Some(document) => {
                    found.insert(*pmid, document);
                }
                None => uncached.push(*pmid),
            }
        }

        for batch in uncached.chunks(EFETCH_BATCH_SIZE) {
            let ids: Vec<String> = batch.iter().map(ToString::to_string).collect();
            let url = format!(
                "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml&rettype=abstract",
                self.base_url,
                ids.join(",")
            );
            debug!(batch_size = batch.len(), "Making batch EFetch request");
            let response = self.make_request(&url).await?;
            let xml = response.text().await?;
            if xml.trim().is_empty() {
                continue;
            }

            let documents = parse_documents(&xml)?;
            info!(
                requested = batch.len(),
                parsed = documents.len(),
                "Batch fetch completed"
            );
            for document in documents {
                if batch.contains(&document.pmid) && !found.contains_key(&document.pmid) {
                    self.documents.insert(document.pmid, document.clone()).await;
                    found.insert(document.pmid, document);
                }
            }
        }

        let mut ordered = Vec::with_capacity(found.len());
        for pmid in pmids {
            if let Some(document) = found.remove(pmid) {
                ordered.push(document);
            }
        }
        Ok(ordered)
    }

    /// Cached record for `pmid`, without touching the network
    pub async fn cached_document(&self, pmid: PubMedId) -> Option<Document> {
        self.documents.get(&pmid).await
    }

    async fn fetch_document_uncached(&self, pmid: PubMedId) -> Result<Document> {
        let url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml&rettype=abstract",
            self.base_url, pmid
        );
        debug!("Making EFetch request");
        let response = self.make_request(&url).await?;
        let xml = response.text().await?;

        parse_documents(&xml)?
            .into_iter()
            .find(|doc| doc.pmid == pmid)
            .ok_or_else(|| EvidenceError::ArticleNotFound {
                pmid: pmid.to_string(),
            })
    }

    /// GET `url` with etiquette parameters, rate limiting and retries.
    ///
    /// Transient failures (network errors, 429, 5xx) are retried per
    /// `retry_config`; once the budget is spent they surface as
    /// `EvidenceError::UpstreamUnavailable`.
    pub(crate) async fn make_request(&self, url: &str) -> Result<Response> {
        let mut final_url = url.to_string();
        let params = self.config.build_api_params();
        if !params.is_empty() {
            final_url.push(if url.contains('?') { '&' } else { '?' });
            let encoded: Vec<String> = params
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, urlencoding::encode(&value)))
                .collect();
            final_url.push_str(&encoded.join("&"));
        }

        let retry_config = &self.config.retry_config;
        let response = with_retry(
            || async {
                self.rate_limiter.acquire().await?;
                debug!(url = %url, "Sending E-utilities request");
                let response = self
                    .client
                    .get(&final_url)
                    .send()
                    .await
                    .map_err(EvidenceError::from)?;

                let status = response.status();
                if status.is_server_error() || status.as_u16() == 429 {
                    return Err(EvidenceError::ApiError {
                        status: status.as_u16(),
                        message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
                    });
                }
                Ok(response)
            },
            retry_config,
            "NCBI API request",
        )
        .await
        .map_err(|err| {
            if err.is_retryable() {
                EvidenceError::UpstreamUnavailable {
                    operation: "NCBI API request".to_string(),
                    attempts: retry_config.max_attempts(),
                    message: err.to_string(),
                }
            } else {
                err
            }
        })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "E-utilities request failed");
            return Err(EvidenceError::ApiError {
                status: response.status().as_u16(),
                message: response
                    .status()
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        Ok(response)
    }
}
