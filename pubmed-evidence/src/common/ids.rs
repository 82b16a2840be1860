//! Validated PubMed and PubMed Central identifiers

use crate::error::{EvidenceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated PubMed ID (PMID)
///
/// Serialized as its decimal string, the form NCBI uses in JSON payloads.
///
/// ```
/// use pubmed_evidence::PubMedId;
///
/// let pmid = PubMedId::parse(" 31978945 ").unwrap();
/// assert_eq!(pmid.as_u32(), 31978945);
/// assert!(PubMedId::parse("0").is_err());
/// assert!(PubMedId::parse("PMC123").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PubMedId {
    value: u32,
}

impl PubMedId {
    /// Parse a PMID, trimming surrounding whitespace. Zero is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || EvidenceError::InvalidPmid {
            pmid: s.to_string(),
        };
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match trimmed.parse::<u32>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(value) => Ok(Self { value }),
        }
    }

    /// Parse a comma-separated list, as accepted by `/pubmed/retrieve?ids=`
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn as_u32(&self) -> u32 {
        self.value
    }

    pub fn pubmed_url(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.value)
    }
}

impl fmt::Display for PubMedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for PubMedId {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<PubMedId> for String {
    fn from(id: PubMedId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PubMedId {
    type Error = EvidenceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// A validated PubMed Central ID, always rendered with its `PMC` prefix
///
/// ```
/// use pubmed_evidence::PmcId;
///
/// let pmcid = PmcId::parse("pmc7092803").unwrap();
/// assert_eq!(pmcid.to_string(), "PMC7092803");
/// assert_eq!(PmcId::parse("7092803").unwrap(), pmcid);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PmcId {
    value: u32,
}

impl PmcId {
    /// Parse `PMC1234`, `pmc1234` or a bare `1234`
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || EvidenceError::InvalidPmcid {
            pmcid: s.to_string(),
        };
        let trimmed = s.trim();
        let digits = match trimmed.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("pmc") => &trimmed[3..],
            _ => trimmed,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match digits.parse::<u32>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(value) => Ok(Self { value }),
        }
    }

    pub fn numeric_part(&self) -> u32 {
        self.value
    }

    pub fn pmc_url(&self) -> String {
        format!("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{}/", self.value)
    }
}

impl fmt::Display for PmcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PMC{}", self.value)
    }
}

impl FromStr for PmcId {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<PmcId> for String {
    fn from(id: PmcId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PmcId {
    type Error = EvidenceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}
