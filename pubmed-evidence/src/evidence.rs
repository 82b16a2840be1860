//! Evidence labels: article sections and study-type classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Part of an article a chunk was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    Abstract,
    Methods,
    Results,
    Discussion,
    Conclusion,
    Limitations,
}

impl Section {
    /// Full-text sections in the order they are chunked
    pub const FULL_TEXT: [Section; 5] = [
        Section::Results,
        Section::Methods,
        Section::Discussion,
        Section::Conclusion,
        Section::Limitations,
    ];

    /// Sections chunked from PMC when the caller does not choose
    pub const DEFAULT_FULL_TEXT: [Section; 3] =
        [Section::Results, Section::Methods, Section::Discussion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Abstract => "Abstract",
            Section::Methods => "Methods",
            Section::Results => "Results",
            Section::Discussion => "Discussion",
            Section::Conclusion => "Conclusion",
            Section::Limitations => "Limitations",
        }
    }

    /// Lowercase slug used in chunk ids
    pub fn slug(&self) -> &'static str {
        match self {
            Section::Abstract => "abs",
            Section::Methods => "methods",
            Section::Results => "results",
            Section::Discussion => "discussion",
            Section::Conclusion => "conclusion",
            Section::Limitations => "limitations",
        }
    }

    /// Parse a section name as given by API callers (`"results"`, `"Conclusions"`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "abstract" | "abs" => Some(Section::Abstract),
            "methods" | "method" => Some(Section::Methods),
            "results" | "result" => Some(Section::Results),
            "discussion" => Some(Section::Discussion),
            "conclusion" | "conclusions" => Some(Section::Conclusion),
            "limitations" | "limitation" => Some(Section::Limitations),
            _ => None,
        }
    }

    /// Map a JATS `sec-type` attribute or a section heading to a full-text section.
    ///
    /// `sec-type` is matched exactly; headings by keyword ("Materials and Methods").
    pub fn from_jats(sec_type: Option<&str>, heading: Option<&str>) -> Option<Self> {
        if let Some(kind) = sec_type {
            let kind = kind.trim().to_ascii_lowercase();
            if let Some(section) = Self::FULL_TEXT
                .into_iter()
                .find(|s| s.as_str().eq_ignore_ascii_case(&kind))
            {
                return Some(section);
            }
        }
        let heading = heading?.to_ascii_lowercase();
        Self::FULL_TEXT
            .into_iter()
            .find(|s| heading.contains(&s.as_str().to_ascii_lowercase()))
    }

    /// Ranking weight favouring high-signal sections
    pub fn weight(&self) -> f64 {
        match self {
            Section::Results => 1.20,
            Section::Methods => 1.10,
            Section::Discussion | Section::Conclusion | Section::Limitations => 1.05,
            Section::Abstract => 1.0,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concise evidence label derived from PubMed publication types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyType {
    #[serde(rename = "RCT")]
    RandomizedControlledTrial,
    #[serde(rename = "Meta-analysis")]
    MetaAnalysis,
    #[serde(rename = "Systematic review")]
    SystematicReview,
    #[serde(rename = "Cohort")]
    Cohort,
    #[serde(rename = "Case-control")]
    CaseControl,
    #[serde(rename = "Cross-sectional")]
    CrossSectional,
    #[serde(rename = "Clinical trial")]
    ClinicalTrial,
    #[serde(rename = "Observational")]
    Observational,
    #[serde(rename = "Comparative")]
    Comparative,
    #[serde(rename = "Multicenter")]
    Multicenter,
    #[serde(rename = "Review")]
    Review,
    #[serde(rename = "Editorial")]
    Editorial,
    #[serde(rename = "Letter")]
    Letter,
    #[serde(rename = "Unspecified")]
    Unspecified,
}

impl StudyType {
    /// Highest-evidence label first; classification picks the first match
    const PRIORITY: [StudyType; 13] = [
        StudyType::RandomizedControlledTrial,
        StudyType::MetaAnalysis,
        StudyType::SystematicReview,
        StudyType::Cohort,
        StudyType::CaseControl,
        StudyType::CrossSectional,
        StudyType::ClinicalTrial,
        StudyType::Observational,
        StudyType::Comparative,
        StudyType::Multicenter,
        StudyType::Review,
        StudyType::Editorial,
        StudyType::Letter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StudyType::RandomizedControlledTrial => "RCT",
            StudyType::MetaAnalysis => "Meta-analysis",
            StudyType::SystematicReview => "Systematic review",
            StudyType::Cohort => "Cohort",
            StudyType::CaseControl => "Case-control",
            StudyType::CrossSectional => "Cross-sectional",
            StudyType::ClinicalTrial => "Clinical trial",
            StudyType::Observational => "Observational",
            StudyType::Comparative => "Comparative",
            StudyType::Multicenter => "Multicenter",
            StudyType::Review => "Review",
            StudyType::Editorial => "Editorial",
            StudyType::Letter => "Letter",
            StudyType::Unspecified => "Unspecified",
        }
    }

    fn from_publication_type(pub_type: &str) -> Option<Self> {
        match pub_type.trim() {
            "Randomized Controlled Trial" => Some(StudyType::RandomizedControlledTrial),
            "Clinical Trial" => Some(StudyType::ClinicalTrial),
            "Meta-Analysis" => Some(StudyType::MetaAnalysis),
            "Systematic Review" => Some(StudyType::SystematicReview),
            "Review" => Some(StudyType::Review),
            "Cohort Studies" => Some(StudyType::Cohort),
            "Case-Control Studies" => Some(StudyType::CaseControl),
            "Cross-Sectional Studies" => Some(StudyType::CrossSectional),
            "Comparative Study" => Some(StudyType::Comparative),
            "Observational Study" => Some(StudyType::Observational),
            "Multicenter Study" => Some(StudyType::Multicenter),
            "Letter" => Some(StudyType::Letter),
            "Editorial" => Some(StudyType::Editorial),
            _ => None,
        }
    }

    /// Classify from PubMed publication types, with title hints for reviews
    ///
    /// ```
    /// use pubmed_evidence::StudyType;
    ///
    /// let types = vec!["Journal Article".to_string(), "Review".to_string()];
    /// assert_eq!(
    ///     StudyType::classify(&types, "Metformin: a meta-analysis"),
    ///     StudyType::MetaAnalysis
    /// );
    /// ```
    pub fn classify(publication_types: &[String], title: &str) -> Self {
        let mut found: Vec<StudyType> = publication_types
            .iter()
            .filter_map(|t| Self::from_publication_type(t))
            .collect();

        let title = title.to_lowercase();
        if title.contains("systematic review") {
            found.push(StudyType::SystematicReview);
        }
        if title.contains("meta-analysis") || title.contains("meta analysis") {
            found.push(StudyType::MetaAnalysis);
        }

        Self::PRIORITY
            .into_iter()
            .find(|candidate| found.contains(candidate))
            .unwrap_or(StudyType::Unspecified)
    }

    /// Case-insensitive match against a caller-supplied label (`"rct"`, `"Meta-analysis"`)
    pub fn matches_label(&self, label: &str) -> bool {
        self.label().eq_ignore_ascii_case(label.trim())
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Multiplicative boost for study types the caller prefers
pub fn preference_boost(study_type: StudyType, preferred: &[String]) -> f64 {
    if preferred.iter().any(|label| study_type.matches_label(label)) {
        1.2
    } else {
        1.0
    }
}
