use serde::{Deserialize, Serialize};

use crate::common::{PmcId, PubMedId};
use crate::evidence::{Section, StudyType};

/// Text of one full-text section, paragraphs separated by newlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionText {
    pub section: Section,
    pub text: String,
}

/// A retrieved article: PubMed record plus any PMC full-text sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pmid: PubMedId,
    pub pmcid: Option<PmcId>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub journal: String,
    /// Publication date as printed in the record (`"2021 Mar 4"`, `"2019 Spring"`)
    pub pub_date: String,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub publication_types: Vec<String>,
    pub study_type: StudyType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionText>,
}

impl Document {
    /// Text of `section`, the abstract included
    pub fn section_text(&self, section: Section) -> Option<&str> {
        if section == Section::Abstract {
            return Some(self.abstract_text.as_str()).filter(|t| !t.trim().is_empty());
        }
        self.sections
            .iter()
            .find(|s| s.section == section)
            .map(|s| s.text.as_str())
    }

    pub fn has_full_text(&self) -> bool {
        !self.sections.is_empty()
    }

    pub fn pubmed_url(&self) -> String {
        self.pmid.pubmed_url()
    }

    pub fn pmc_url(&self) -> Option<String> {
        self.pmcid.map(|id| id.pmc_url())
    }
}
