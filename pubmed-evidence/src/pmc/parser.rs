//! PMC full-text (JATS NXML) section extraction
//!
//! Walks `<body>` (and `<back>`, where limitations sometimes live) and files the
//! paragraphs of each `<sec>` under a high-signal [`Section`]. A section's
//! bucket comes from its `sec-type`, else its own `<title>`, else the enclosing
//! section's bucket. Figures, tables and reference lists are skipped.

use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::common::xml::{get_attr, make_reader, read_text_content, skip_element};
use crate::document::SectionText;
use crate::error::{EvidenceError, Result};
use crate::evidence::Section;
use crate::text::normalize_whitespace;

const SKIPPED: [&[u8]; 7] = [
    b"front",
    b"fig",
    b"table-wrap",
    b"ref-list",
    b"supplementary-material",
    b"disp-formula",
    b"fn-group",
];

struct SecFrame {
    declared: Option<Section>,
    inherited: Option<Section>,
    titled: bool,
}

impl SecFrame {
    fn bucket(&self) -> Option<Section> {
        self.declared.or(self.inherited)
    }
}

/// Extract the high-signal sections of one PMC article, in canonical order.
/// Sections without paragraph text are omitted.
#[instrument(skip(xml), fields(xml_size = xml.len()))]
pub fn parse_sections(xml: &str) -> Result<Vec<SectionText>> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();
    let mut frames: Vec<SecFrame> = Vec::new();
    let mut buckets: BTreeMap<Section, Vec<String>> = BTreeMap::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| EvidenceError::XmlError(e.to_string()))?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                let sec_type = get_attr(&e, b"sec-type");
                buf.clear();

                if SKIPPED.contains(&name.as_slice()) {
                    skip_element(&mut reader, QName(&name), &mut buf)?;
                    continue;
                }

                match name.as_slice() {
                    b"sec" => {
                        let inherited = frames.last().and_then(SecFrame::bucket);
                        frames.push(SecFrame {
                            declared: Section::from_jats(sec_type.as_deref(), None),
                            inherited,
                            titled: false,
                        });
                    }
                    b"title" => {
                        let heading = read_text_content(&mut reader, b"title", &mut buf)?;
                        if let Some(frame) = frames.last_mut().filter(|f| !f.titled) {
                            frame.titled = true;
                            if frame.declared.is_none() {
                                frame.declared = Section::from_jats(None, Some(&heading));
                            }
                        }
                    }
                    b"p" => {
                        let text = read_text_content(&mut reader, b"p", &mut buf)?;
                        let bucket = frames.last().and_then(SecFrame::bucket);
                        if let Some(section) = bucket {
                            let text = normalize_whitespace(&text);
                            if !text.is_empty() {
                                buckets.entry(section).or_default().push(text);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"sec" {
                    frames.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let sections: Vec<SectionText> = Section::FULL_TEXT
        .into_iter()
        .filter_map(|section| {
            let paragraphs = buckets.remove(&section)?;
            Some(SectionText {
                section,
                text: paragraphs.join("\n"),
            })
        })
        .collect();

    debug!(sections = sections.len(), "Parsed PMC sections");
    Ok(sections)
}
