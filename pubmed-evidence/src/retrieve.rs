//! Batch document retrieval with bounded concurrency and partial failures

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::common::PubMedId;
use crate::document::Document;
use crate::error::{EvidenceError, Result};
use crate::pubmed::PubMedClient;
use crate::retry::RetryableError;

type Outcome = (PubMedId, Result<Document>);

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Documents fetched concurrently
    pub max_concurrent_fetches: usize,
    /// Deadline for a batch record fetch, and for each document when falling back
    pub fetch_timeout: Duration,
    /// Deadline for one document's PMC lookup and section fetch
    pub full_text_timeout: Duration,
    /// Also fetch PMC full-text sections
    pub full_text: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(30),
            full_text_timeout: Duration::from_secs(60),
            full_text: false,
        }
    }
}

/// A document that could not be retrieved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFetch {
    pub pmid: PubMedId,
    pub reason: String,
    pub retryable: bool,
}

/// Outcome of a batch retrieval: what arrived, in request order, and what did not
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub documents: Vec<Document>,
    pub failed: Vec<FailedFetch>,
}

impl Retrieval {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<PubMedId> {
        self.failed.iter().map(|f| f.pmid).collect()
    }
}

#[derive(Clone)]
pub struct Retriever {
    client: PubMedClient,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(client: PubMedClient, config: RetrievalConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &PubMedClient {
        &self.client
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Same retriever with a different configuration, sharing client and caches
    pub fn with_config(&self, config: RetrievalConfig) -> Self {
        Self {
            client: self.client.clone(),
            config,
        }
    }

    /// Fetch `ids` in batched EFetch requests; duplicates are fetched once.
    ///
    /// PMIDs the batch response does not contain are reported in
    /// [`Retrieval::failed`] as not found. If the batch request itself fails
    /// for a reason other than an outage, each document is fetched on its own
    /// with a per-document deadline. The call fails only when every document
    /// failed and at least one failure was an upstream outage.
    #[instrument(skip(self, ids), fields(requested = ids.len(), full_text = self.config.full_text))]
    pub async fn retrieve(&self, ids: &[PubMedId]) -> Result<Retrieval> {
        let mut unique: Vec<PubMedId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Ok(Retrieval::default());
        }

        let mut outcomes: Vec<Outcome> = match self.fetch_batch(&unique).await {
            Ok(documents) => {
                let mut by_pmid: HashMap<PubMedId, Document> =
                    documents.into_iter().map(|doc| (doc.pmid, doc)).collect();
                unique
                    .iter()
                    .map(|pmid| {
                        let outcome = by_pmid.remove(pmid).ok_or_else(|| {
                            EvidenceError::ArticleNotFound {
                                pmid: pmid.to_string(),
                            }
                        });
                        (*pmid, outcome)
                    })
                    .collect()
            }
            Err(err) if err.is_upstream_outage() => {
                warn!(error = %err, "Batch fetch failed, upstream unavailable");
                self.cached_or_failed(&unique, err).await
            }
            Err(err) => {
                warn!(error = %err, "Batch fetch failed, falling back to single-document fetches");
                self.fetch_each(&unique).await
            }
        };

        if self.config.full_text {
            outcomes = self.attach_full_text(outcomes).await;
        }

        let mut retrieval = Retrieval::default();
        let mut outage: Option<EvidenceError> = None;
        for (pmid, outcome) in outcomes {
            match outcome {
                Ok(document) => retrieval.documents.push(document),
                Err(err) => {
                    warn!(pmid = %pmid, error = %err, "Document retrieval failed");
                    retrieval.failed.push(FailedFetch {
                        pmid,
                        reason: err.to_string(),
                        retryable: err.is_retryable() || err.is_upstream_outage(),
                    });
                    if outage.is_none() && err.is_upstream_outage() {
                        outage = Some(err);
                    }
                }
            }
        }

        if retrieval.documents.is_empty() {
            if let Some(err) = outage {
                return Err(err);
            }
        }

        info!(
            retrieved = retrieval.documents.len(),
            failed = retrieval.failed.len(),
            "Retrieval completed"
        );
        Ok(retrieval)
    }

    async fn fetch_batch(&self, pmids: &[PubMedId]) -> Result<Vec<Document>> {
        timeout(self.config.fetch_timeout, self.client.fetch_documents(pmids))
            .await
            .map_err(|_| EvidenceError::Timeout {
                operation: format!("batch fetch of {} PMIDs", pmids.len()),
                seconds: self.config.fetch_timeout.as_secs(),
            })?
    }

    /// Serve what the cache holds and fail the rest with the outage
    async fn cached_or_failed(
        &self,
        pmids: &[PubMedId],
        err: EvidenceError,
    ) -> Vec<Outcome> {
        let shared = Arc::new(err);
        let mut outcomes = Vec::with_capacity(pmids.len());
        for pmid in pmids {
            let outcome = match self.client.cached_document(*pmid).await {
                Some(document) => Ok(document),
                None => Err(EvidenceError::from_shared(Arc::clone(&shared))),
            };
            outcomes.push((*pmid, outcome));
        }
        outcomes
    }

    async fn fetch_each(&self, pmids: &[PubMedId]) -> Vec<Outcome> {
        let concurrency = self.config.max_concurrent_fetches.max(1);
        let mut outcomes: Vec<(usize, PubMedId, Result<Document>)> =
            stream::iter(pmids.iter().copied().enumerate())
                .map(|(index, pmid)| async move { (index, pmid, self.fetch_one(pmid).await) })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
            .into_iter()
            .map(|(_, pmid, outcome)| (pmid, outcome))
            .collect()
    }

    async fn fetch_one(&self, pmid: PubMedId) -> Result<Document> {
        timeout(self.config.fetch_timeout, self.client.fetch_document(pmid))
            .await
            .map_err(|_| EvidenceError::Timeout {
                operation: format!("fetch PMID {pmid}"),
                seconds: self.config.fetch_timeout.as_secs(),
            })?
    }

    async fn attach_full_text(
        &self,
        outcomes: Vec<Outcome>,
    ) -> Vec<Outcome> {
        let concurrency = self.config.max_concurrent_fetches.max(1);
        let mut attached: Vec<(usize, PubMedId, Result<Document>)> =
            stream::iter(outcomes.into_iter().enumerate())
                .map(|(index, (pmid, outcome))| async move {
                    let outcome = match outcome {
                        Ok(document) => Ok(self.with_full_text(document).await),
                        Err(err) => Err(err),
                    };
                    (index, pmid, outcome)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        attached.sort_by_key(|(index, _, _)| *index);
        attached
            .into_iter()
            .map(|(_, pmid, outcome)| (pmid, outcome))
            .collect()
    }

    /// Add PMC sections when available; the abstract-only record is kept otherwise
    async fn with_full_text(&self, document: Document) -> Document {
        let pmid = document.pmid;
        let fallback = document.clone();
        match timeout(
            self.config.full_text_timeout,
            self.client.attach_full_text(document),
        )
        .await
        {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => {
                warn!(pmid = %pmid, error = %err, "Full text unavailable, keeping abstract");
                fallback
            }
            Err(_) => {
                warn!(pmid = %pmid, "Full text fetch timed out, keeping abstract");
                fallback
            }
        }
    }
}
