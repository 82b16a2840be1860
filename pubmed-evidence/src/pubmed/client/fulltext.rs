//! PMC full text: PMID→PMCID links (ELink) and section retrieval (EFetch db=pmc)

use crate::common::{PmcId, PubMedId};
use crate::document::{Document, SectionText};
use crate::error::Result;
use crate::pmc::parse_sections;
use crate::pubmed::responses::ELinkResponse;
use tracing::{debug, info, instrument};

use super::PubMedClient;

impl PubMedClient {
    /// PMC id of the open-access full text linked to `pmid`, if any
    #[instrument(skip(self), fields(pmid = %pmid))]
    pub async fn pmc_link(&self, pmid: PubMedId) -> Result<Option<PmcId>> {
        let url = format!(
            "{}/elink.fcgi?dbfrom=pubmed&db=pmc&id={}&linkname=pubmed_pmc&retmode=json",
            self.base_url, pmid
        );
        debug!("Making ELink request");
        let response = self.make_request(&url).await?;
        let links: ELinkResponse = response.json().await?;

        let pmcid = links
            .links_named("pmc", "pubmed_pmc")
            .iter()
            .find_map(|raw| PmcId::parse(raw).ok());
        debug!(linked = pmcid.is_some(), "ELink completed");
        Ok(pmcid)
    }

    /// High-signal sections of a PMC article, cached per PMC id
    #[instrument(skip(self), fields(pmcid = %pmcid))]
    pub async fn fetch_pmc_sections(&self, pmcid: PmcId) -> Result<Vec<SectionText>> {
        self.sections
            .get_or_try_insert(pmcid, async move {
                let url = format!(
                    "{}/efetch.fcgi?db=pmc&id={}&retmode=xml",
                    self.base_url,
                    pmcid.numeric_part()
                );
                let response = self.make_request(&url).await?;
                let xml = response.text().await?;
                let sections = parse_sections(&xml)?;
                info!(sections = sections.len(), "PMC sections fetched");
                Ok(sections)
            })
            .await
    }

    /// Attach PMC sections to `document`, resolving its PMC id first when the
    /// record did not carry one. A document without open-access full text is
    /// returned unchanged.
    pub async fn attach_full_text(&self, mut document: Document) -> Result<Document> {
        let pmcid = match document.pmcid {
            Some(pmcid) => Some(pmcid),
            None => self.pmc_link(document.pmid).await?,
        };
        let Some(pmcid) = pmcid else {
            debug!(pmid = %document.pmid, "No PMC full text linked");
            return Ok(document);
        };

        document.pmcid = Some(pmcid);
        document.sections = self.fetch_pmc_sections(pmcid).await?;
        Ok(document)
    }
}
