//! Thin wrappers around `quick_xml::Reader` shared by the PubMed and PMC parsers

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::error::{EvidenceError, Result};

/// Reader over a string slice with `<tag/>` expanded into `Start` + `End`.
///
/// Text is not trimmed so mixed content (`<p>a <i>b</i> c</p>`) keeps its spacing.
pub fn make_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().expand_empty_elements = true;
    reader
}

/// Collect the text inside the element whose `Start` was just consumed,
/// dropping child tags. Consumes through the matching `End`.
pub fn read_text_content(
    reader: &mut Reader<&[u8]>,
    parent_tag: &[u8],
    buf: &mut Vec<u8>,
) -> Result<String> {
    let mut text = String::new();
    let mut depth: u32 = 1;

    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == parent_tag => depth += 1,
            Ok(Event::Text(ref e)) => {
                let unescaped = e
                    .unescape()
                    .map_err(|err| EvidenceError::XmlError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == parent_tag => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EvidenceError::XmlError(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    buf.clear();

    Ok(text.trim().to_string())
}

/// Attribute value, if present
pub fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()?
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Skip the element whose `Start` was just consumed, children included
pub fn skip_element(reader: &mut Reader<&[u8]>, tag: QName, buf: &mut Vec<u8>) -> Result<()> {
    reader
        .read_to_end_into(tag, buf)
        .map_err(|e| EvidenceError::XmlError(e.to_string()))?;
    buf.clear();
    Ok(())
}
