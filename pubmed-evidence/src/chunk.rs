//! Sentence-aligned chunking with bounded size and word-aligned overlap
//!
//! Every chunk is a contiguous slice `[start, end)` of the whitespace-normalized
//! section text, so its offsets reproduce its text exactly. Chunking is a pure
//! function of the document and the configuration.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::common::{PmcId, PubMedId};
use crate::document::Document;
use crate::error::{EvidenceError, Result};
use crate::evidence::{Section, StudyType};
use crate::text::{floor_char_boundary, normalize_whitespace, sentence_spans};

/// Chunk size bounds, in bytes of UTF-8 text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 1200,
            overlap: 120,
        }
    }
}

impl ChunkConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        let config = Self { size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(EvidenceError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(EvidenceError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// A bounded passage of one document section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{pmid}-{section}-{index}`
    pub id: String,
    pub pmid: PubMedId,
    pub pmcid: Option<PmcId>,
    pub section: Section,
    /// Byte offsets into the normalized section text
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub title: String,
    pub journal: String,
    pub year: Option<i32>,
    pub study_type: StudyType,
}

/// Splits documents into chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk the abstract and every full-text section of `document`
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunk_sections(document, &Section::FULL_TEXT)
    }

    /// Chunk the abstract plus the listed full-text sections, in canonical order
    pub fn chunk_sections(&self, document: &Document, full_text: &[Section]) -> Vec<Chunk> {
        let mut chunks = self.section_chunks(document, Section::Abstract, &document.abstract_text);

        for section in Section::FULL_TEXT {
            if !full_text.contains(&section) {
                continue;
            }
            if let Some(text) = document.section_text(section) {
                chunks.extend(self.section_chunks(document, section, text));
            }
        }

        debug!(pmid = %document.pmid, chunks = chunks.len(), "Document chunked");
        chunks
    }

    fn section_chunks(&self, document: &Document, section: Section, raw: &str) -> Vec<Chunk> {
        let text = normalize_whitespace(raw);
        chunk_ranges(&text, &self.config)
            .into_iter()
            .enumerate()
            .map(|(index, range)| Chunk {
                id: format!("{}-{}-{}", document.pmid, section.slug(), index),
                pmid: document.pmid,
                pmcid: document.pmcid,
                section,
                start: range.start,
                end: range.end,
                text: text[range].to_string(),
                title: document.title.clone(),
                journal: document.journal.clone(),
                year: document.year,
                study_type: document.study_type,
            })
            .collect()
    }
}

/// Chunk boundaries for already-normalized `text`
pub fn chunk_ranges(text: &str, config: &ChunkConfig) -> Vec<Range<usize>> {
    let pieces: Vec<Range<usize>> = sentence_spans(text)
        .into_iter()
        .flat_map(|span| split_long_span(text, span, config.size))
        .collect();

    let Some(first) = pieces.first() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let mut start = first.start;
    let mut end = first.end;

    for piece in &pieces[1..] {
        if piece.end - start <= config.size {
            end = piece.end;
            continue;
        }
        ranges.push(start..end);
        start = overlap_start(text, start, end, piece, config);
        end = piece.end;
    }
    ranges.push(start..end);
    ranges
}

/// Where the chunk containing `next` starts: inside the previous chunk's
/// tail when a word-aligned tail of at most `overlap` bytes still fits.
fn overlap_start(
    text: &str,
    prev_start: usize,
    prev_end: usize,
    next: &Range<usize>,
    config: &ChunkConfig,
) -> usize {
    if config.overlap == 0 {
        return next.start;
    }
    let earliest = ceil_char_boundary(text, prev_end.saturating_sub(config.overlap).max(prev_start + 1));
    if earliest >= prev_end {
        return next.start;
    }
    let word_start = text[earliest..prev_end]
        .find(' ')
        .map(|offset| earliest + offset + 1);

    match word_start {
        Some(begin) if begin < prev_end && next.end - begin <= config.size => begin,
        _ => next.start,
    }
}

/// Break a sentence longer than `size` at word boundaries, or at a char
/// boundary when a single word is longer than `size`.
fn split_long_span(text: &str, span: Range<usize>, size: usize) -> Vec<Range<usize>> {
    if span.end - span.start <= size {
        return vec![span];
    }

    let mut pieces = Vec::new();
    let mut start = span.start;
    while span.end - start > size {
        let mut limit = floor_char_boundary(text, start + size);
        if limit <= start {
            limit = ceil_char_boundary(text, start + 1);
        }
        match text[start..limit].rfind(' ') {
            Some(offset) if offset > 0 => {
                pieces.push(start..start + offset);
                start += offset + 1;
            }
            _ => {
                pieces.push(start..limit);
                start = limit;
            }
        }
        while text[start..span.end].starts_with(' ') {
            start += 1;
        }
    }
    if start < span.end {
        pieces.push(start..span.end);
    }
    pieces
}

fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut idx = index.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
