//! EFetch (`db=pubmed`, `rettype=abstract`) XML parsing
//!
//! Only the fields the evidence pipeline needs are read. Element context is
//! tracked with a stack of open tag names so that, for instance, the PMIDs
//! inside `CommentsCorrectionsList` or the article ids of cited references
//! are not mistaken for the record's own.

use quick_xml::events::Event;
use quick_xml::name::QName;
use tracing::{debug, instrument, warn};

use crate::common::xml::{get_attr, make_reader, read_text_content, skip_element};
use crate::common::{PmcId, PubMedId};
use crate::document::Document;
use crate::error::{EvidenceError, Result};
use crate::evidence::StudyType;
use crate::text::parse_year;

#[derive(Default)]
struct RecordBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    journal: String,
    pub_year: Option<String>,
    pub_month: Option<String>,
    pub_day: Option<String>,
    medline_date: Option<String>,
    article_date_year: Option<String>,
    doi: Option<String>,
    pmcid: Option<String>,
    publication_types: Vec<String>,
}

impl RecordBuilder {
    fn pub_date(&self) -> String {
        if let Some(year) = &self.pub_year {
            [Some(year), self.pub_month.as_ref(), self.pub_day.as_ref()]
                .into_iter()
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        } else if let Some(medline) = &self.medline_date {
            medline.clone()
        } else {
            self.article_date_year.clone().unwrap_or_default()
        }
    }

    fn build(self) -> Option<Document> {
        let raw_pmid = self.pmid.as_deref()?;
        let pmid = match PubMedId::parse(raw_pmid) {
            Ok(pmid) => pmid,
            Err(_) => {
                warn!(pmid = raw_pmid, "Skipping record with invalid PMID");
                return None;
            }
        };

        let pub_date = self.pub_date();
        let year = parse_year(&pub_date).or_else(|| {
            self.article_date_year
                .as_deref()
                .and_then(parse_year)
        });
        let pmcid = self.pmcid.as_deref().and_then(|id| PmcId::parse(id).ok());
        let study_type = StudyType::classify(&self.publication_types, &self.title);

        Some(Document {
            pmid,
            pmcid,
            title: self.title,
            abstract_text: self.abstract_parts.join("\n"),
            journal: self.journal,
            pub_date,
            year,
            doi: self.doi,
            publication_types: self.publication_types,
            study_type,
            sections: Vec::new(),
        })
    }
}

fn parent_is(stack: &[Vec<u8>], tag: &[u8]) -> bool {
    stack.last().is_some_and(|t| t.as_slice() == tag)
}

fn grandparent_is(stack: &[Vec<u8>], tag: &[u8]) -> bool {
    stack.len() >= 2 && stack[stack.len() - 2].as_slice() == tag
}

/// Parse every `PubmedArticle` in an EFetch response.
///
/// Records without a valid PMID are skipped; `PubmedBookArticle` entries are ignored.
#[instrument(skip(xml), fields(xml_size = xml.len()))]
pub fn parse_documents(xml: &str) -> Result<Vec<Document>> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<RecordBuilder> = None;
    let mut documents = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| EvidenceError::XmlError(e.to_string()))?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                let label = get_attr(&e, b"Label");
                let id_type = get_attr(&e, b"IdType").or_else(|| get_attr(&e, b"EIdType"));
                buf.clear();

                match name.as_slice() {
                    b"PubmedArticle" => {
                        current = Some(RecordBuilder::default());
                        stack.push(name);
                    }
                    b"PubmedBookArticle" => {
                        skip_element(&mut reader, QName(&name), &mut buf)?;
                    }
                    _ => match current.as_mut() {
                        Some(record) => {
                            if read_field(record, &name, &stack, label, id_type, &mut reader, &mut buf)? {
                                continue;
                            }
                            stack.push(name);
                        }
                        None => stack.push(name),
                    },
                }
            }
            Event::End(e) => {
                let is_article = e.name().as_ref() == b"PubmedArticle";
                stack.pop();
                if is_article {
                    if let Some(document) = current.take().and_then(RecordBuilder::build) {
                        documents.push(document);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(documents = documents.len(), "Parsed EFetch response");
    Ok(documents)
}

/// Consume the element if it is a field of interest; returns `true` when consumed
fn read_field(
    record: &mut RecordBuilder,
    name: &[u8],
    stack: &[Vec<u8>],
    label: Option<String>,
    id_type: Option<String>,
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<bool> {
    match name {
        b"PMID" if parent_is(stack, b"MedlineCitation") => {
            let text = read_text_content(reader, name, buf)?;
            if record.pmid.is_none() {
                record.pmid = Some(text);
            }
        }
        b"ArticleTitle" if parent_is(stack, b"Article") => {
            record.title = read_text_content(reader, name, buf)?;
        }
        b"AbstractText" if parent_is(stack, b"Abstract") => {
            let text = read_text_content(reader, name, buf)?;
            if !text.is_empty() {
                record.abstract_parts.push(match label {
                    Some(label) if !label.is_empty() => format!("{label}: {text}"),
                    _ => text,
                });
            }
        }
        b"Title" if parent_is(stack, b"Journal") => {
            record.journal = read_text_content(reader, name, buf)?;
        }
        b"Year" if parent_is(stack, b"PubDate") => {
            record.pub_year = Some(read_text_content(reader, name, buf)?);
        }
        b"Month" if parent_is(stack, b"PubDate") => {
            record.pub_month = Some(read_text_content(reader, name, buf)?);
        }
        b"Day" if parent_is(stack, b"PubDate") => {
            record.pub_day = Some(read_text_content(reader, name, buf)?);
        }
        b"MedlineDate" if parent_is(stack, b"PubDate") => {
            record.medline_date = Some(read_text_content(reader, name, buf)?);
        }
        b"Year" if parent_is(stack, b"ArticleDate") => {
            record.article_date_year = Some(read_text_content(reader, name, buf)?);
        }
        b"PublicationType" if parent_is(stack, b"PublicationTypeList") => {
            let text = read_text_content(reader, name, buf)?;
            if !text.is_empty() {
                record.publication_types.push(text);
            }
        }
        b"ELocationID" if parent_is(stack, b"Article") => {
            let text = read_text_content(reader, name, buf)?;
            if id_type.as_deref() == Some("doi") && record.doi.is_none() && !text.is_empty() {
                record.doi = Some(text);
            }
        }
        b"ArticleId"
            if parent_is(stack, b"ArticleIdList") && grandparent_is(stack, b"PubmedData") =>
        {
            let text = read_text_content(reader, name, buf)?;
            match id_type.as_deref() {
                Some("pmc") if record.pmcid.is_none() => record.pmcid = Some(text),
                Some("doi") if record.doi.is_none() && !text.is_empty() => record.doi = Some(text),
                _ => {}
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}
