//! Citation grounding: markers, statements and references checked against the evidence set

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use super::{Answer, AnswerStatus, Citation, Draft, DraftCitation, EvidenceSet, Reference};
use crate::common::{PmcId, PubMedId};
use crate::text::{floor_char_boundary, normalize_whitespace, query_terms, sentence_spans, tokenize};

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(PMID|PMCID)\s*:\s*([^\]]*)\]")
            .expect("Failed to compile citation marker regex")
    })
}

/// A run of markers written straight after sentence punctuation: `Claim. [PMID:1]`
fn trailing_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([.!?])\s*((?:\[\s*(?:PMID|PMCID)\s*:[^\]]*\]\s*)+)")
            .expect("Failed to compile trailing marker regex")
    })
}

/// Move markers that follow a sentence's closing punctuation in front of it,
/// so they stay with the claim they were written after.
fn pull_markers_before_punctuation(line: &str) -> String {
    let moved = trailing_marker_regex().replace_all(line, |caps: &regex::Captures| {
        format!(" {}{} ", caps[2].trim_end(), &caps[1])
    });
    normalize_whitespace(&moved)
}

/// Inline marker for `pmid`
pub fn citation_marker(pmid: PubMedId) -> String {
    format!("[PMID:{pmid}]")
}

/// PMIDs named by the `[PMID:n]` markers in `text`, in order of appearance,
/// without checking them against any evidence
pub fn cited_pmids(text: &str) -> Vec<PubMedId> {
    let mut pmids = Vec::new();
    for caps in marker_regex().captures_iter(text) {
        if !caps[1].eq_ignore_ascii_case("pmid") {
            continue;
        }
        for part in caps[2].split([',', ';']) {
            if let Ok(pmid) = PubMedId::parse(strip_label(part)) {
                if !pmids.contains(&pmid) {
                    pmids.push(pmid);
                }
            }
        }
    }
    pmids
}

/// Tolerates `[PMID:1, PMID:2]` style lists
fn strip_label(part: &str) -> &str {
    let part = part.trim();
    for label in ["PMID:", "PMCID:", "pmid:", "pmcid:"] {
        if let Some(rest) = part.strip_prefix(label) {
            return rest.trim();
        }
    }
    part
}

/// Evidence PMIDs a marker refers to, and how many of its identifiers did not resolve
fn resolve_marker(kind: &str, body: &str, evidence: &EvidenceSet) -> (Vec<PubMedId>, usize) {
    let mut resolved = Vec::new();
    let mut rejected = 0;
    for part in body.split([',', ';']) {
        let raw = strip_label(part);
        if raw.is_empty() {
            continue;
        }
        let pmid = if kind.eq_ignore_ascii_case("pmcid") {
            PmcId::parse(raw)
                .ok()
                .and_then(|pmcid| evidence.pmid_for_pmcid(pmcid))
        } else {
            PubMedId::parse(raw).ok().filter(|pmid| evidence.contains(*pmid))
        };
        match pmid {
            Some(pmid) if !resolved.contains(&pmid) => resolved.push(pmid),
            Some(_) => {}
            None => rejected += 1,
        }
    }
    (resolved, rejected)
}

/// A statement stripped of its markers, plus the evidence it cites
struct Statement {
    text: String,
    pmids: Vec<PubMedId>,
}

impl Statement {
    /// Markers go before the closing punctuation: `Claim [PMID:1].`
    fn render(&self) -> String {
        let markers: Vec<String> = self.pmids.iter().map(|p| citation_marker(*p)).collect();
        let markers = markers.join(" ");
        match self.text.char_indices().last() {
            Some((idx, ch)) if matches!(ch, '.' | '!' | '?') => {
                format!("{} {}{}", self.text[..idx].trim_end(), markers, ch)
            }
            _ => format!("{} {}", self.text, markers),
        }
    }
}

/// Validate `draft` against `evidence` and build the final answer.
///
/// Each line of the draft is split into sentences. Markers naming documents
/// outside the evidence are removed and sentences left without a valid marker
/// are dropped; a sentence made only of markers attaches them to the sentence
/// before it. Quotes are kept only if they occur in the cited document's
/// excerpts and that document is cited in the text. References follow the
/// order of first citation.
pub fn ground(draft: Draft, evidence: &EvidenceSet, max_quote_chars: usize) -> Answer {
    let mut lines: Vec<String> = Vec::new();
    let mut dropped_statements = 0usize;
    let mut rejected_markers = 0usize;

    for line in draft.answer.lines() {
        let line = pull_markers_before_punctuation(line);
        if line.is_empty() {
            continue;
        }

        let mut statements: Vec<Statement> = Vec::new();
        for span in sentence_spans(&line) {
            let sentence = &line[span];
            let mut pmids = Vec::new();
            for caps in marker_regex().captures_iter(sentence) {
                let (resolved, rejected) = resolve_marker(&caps[1], &caps[2], evidence);
                rejected_markers += rejected;
                for pmid in resolved {
                    if !pmids.contains(&pmid) {
                        pmids.push(pmid);
                    }
                }
            }
            let text = normalize_whitespace(&marker_regex().replace_all(sentence, ""));
            let text = tidy_punctuation(&text);

            if is_punctuation_only(&text) {
                match statements.last_mut() {
                    Some(previous) => {
                        for pmid in pmids {
                            if !previous.pmids.contains(&pmid) {
                                previous.pmids.push(pmid);
                            }
                        }
                    }
                    None if !pmids.is_empty() => dropped_statements += 1,
                    None => {}
                }
                continue;
            }
            statements.push(Statement { text, pmids });
        }

        let kept: Vec<String> = statements
            .into_iter()
            .filter_map(|statement| {
                if statement.pmids.is_empty() {
                    dropped_statements += 1;
                    None
                } else {
                    Some(statement.render())
                }
            })
            .collect();
        if !kept.is_empty() {
            lines.push(kept.join(" "));
        }
    }

    let mut notes: Vec<String> = Vec::new();
    if !draft.notes.trim().is_empty() {
        notes.push(draft.notes.trim().to_string());
    }
    if dropped_statements > 0 {
        notes.push(format!(
            "Removed {dropped_statements} statement(s) without a citation to the retrieved evidence."
        ));
    }
    if rejected_markers > 0 {
        notes.push(format!(
            "Removed {rejected_markers} citation marker(s) referring to documents outside the retrieved evidence."
        ));
    }

    if lines.is_empty() {
        debug!(dropped_statements, rejected_markers, "No grounded statement left");
        notes.push("No statement in the draft was supported by the retrieved evidence.".to_string());
        return Answer::insufficient_evidence(notes.join(" "));
    }

    let text = lines.join("\n");
    let cited = cited_pmids(&text);
    let references = build_references(&cited, evidence);
    let citations = verify_citations(&draft.citations, &cited, evidence, max_quote_chars);
    let discarded = draft.citations.len().saturating_sub(citations.len());
    if discarded > 0 {
        notes.push(format!(
            "Discarded {discarded} quote(s) not found verbatim in the cited evidence."
        ));
    }

    Answer {
        status: AnswerStatus::Answered,
        answer: text,
        citations,
        references,
        notes: notes.join(" "),
    }
}

fn build_references(cited: &[PubMedId], evidence: &EvidenceSet) -> Vec<Reference> {
    cited
        .iter()
        .filter_map(|pmid| evidence.first_for(*pmid))
        .map(|item| Reference {
            pmid: item.pmid,
            pmcid: item.pmcid,
            title: item.title.clone(),
            journal: item.journal.clone(),
            year: item.year,
            url: item.pmid.pubmed_url(),
            pmc_url: item.pmcid.map(|pmcid| pmcid.pmc_url()),
        })
        .collect()
}

fn verify_citations(
    raw: &[DraftCitation],
    cited: &[PubMedId],
    evidence: &EvidenceSet,
    max_quote_chars: usize,
) -> Vec<Citation> {
    let mut seen: HashSet<(PubMedId, String)> = HashSet::new();
    let mut citations = Vec::new();

    for citation in raw {
        let quote = normalize_whitespace(&citation.quote);
        if quote.is_empty() || quote.chars().count() > max_quote_chars {
            continue;
        }
        let pmid = PubMedId::parse(strip_label(&citation.pmid)).ok().or_else(|| {
            PmcId::parse(strip_label(&citation.pmcid))
                .ok()
                .and_then(|pmcid| evidence.pmid_for_pmcid(pmcid))
        });
        let Some(pmid) = pmid else { continue };
        if !cited.contains(&pmid) || !evidence.supports_quote(pmid, &quote) {
            continue;
        }
        if seen.insert((pmid, quote.to_lowercase())) {
            citations.push(Citation {
                pmid,
                pmcid: evidence.first_for(pmid).and_then(|item| item.pmcid),
                quote,
            });
        }
    }
    citations
}

/// Remove the space a deleted marker leaves before punctuation
fn tidy_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '.' | ',' | ';' | ':' | '!' | '?') && out.ends_with(' ') {
            out.pop();
        }
        out.push(ch);
    }
    out.trim().to_string()
}

fn is_punctuation_only(text: &str) -> bool {
    text.chars().all(|ch| !ch.is_alphanumeric())
}

/// One statement per document, in rank order: the excerpt sentence sharing the
/// most terms with the question, followed by its marker. Sentences sharing no
/// term are never used.
pub fn extractive_draft(question: &str, evidence: &EvidenceSet, max_statements: usize) -> Draft {
    let terms = query_terms(question);
    let mut used: Vec<PubMedId> = Vec::new();
    let mut statements = Vec::new();
    let mut citations = Vec::new();

    for item in evidence.items() {
        if statements.len() >= max_statements {
            break;
        }
        if used.contains(&item.pmid) {
            continue;
        }

        let text = normalize_whitespace(&item.text);
        let best = sentence_spans(&text)
            .into_iter()
            .map(|span| {
                let sentence = &text[span];
                let overlap = tokenize(sentence)
                    .into_iter()
                    .filter(|token| terms.contains(token))
                    .collect::<HashSet<_>>()
                    .len();
                (overlap, sentence)
            })
            .fold(None, |best: Option<(usize, &str)>, candidate| match best {
                Some(current) if current.0 >= candidate.0 => Some(current),
                _ => Some(candidate),
            });

        let Some((overlap, sentence)) = best else { continue };
        if overlap == 0 {
            continue;
        }

        used.push(item.pmid);
        statements.push(format!("{} {}", sentence, citation_marker(item.pmid)));
        citations.push(DraftCitation {
            pmid: item.pmid.to_string(),
            pmcid: String::new(),
            quote: sentence[..floor_char_boundary(sentence, 200)].to_string(),
        });
    }

    Draft {
        answer: statements.join("\n"),
        citations,
        notes: "Extractive answer: sentences quoted from the highest-ranked evidence.".to_string(),
    }
}
