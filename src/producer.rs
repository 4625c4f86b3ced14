//! The boundary between document analysis and the index core.
//!
//! The core only ever sees `DocumentTerms`: for each distinct term of a
//! document, how often it occurs and in which zones. How those counts are
//! produced (markup parsing, tokenizing, stemming) is up to the
//! `TokenProducer` implementation.

use std::collections::BTreeMap;

use crate::encoding::{DocId, Zone, ZoneCounts};

/// A document as read from the corpus, before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub id: DocId,
    pub title: String,
    pub text: String,
}

impl RawDocument {
    pub fn new(id: DocId, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    pub frequency: u32,
    pub zones: ZoneCounts,
}

/// Per-document term statistics handed to the block builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTerms {
    pub terms: BTreeMap<String, TermStats>,
    /// Total number of term occurrences in the document.
    pub term_count: u64,
}

impl DocumentTerms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence of `term` in `zone`.
    pub fn add(&mut self, term: &str, zone: Zone) {
        self.add_many(term, zone, 1);
    }

    pub fn add_many(&mut self, term: &str, zone: Zone, count: u32) {
        if count == 0 {
            return;
        }
        let stats = match self.terms.get_mut(term) {
            Some(stats) => stats,
            None => self.terms.entry(term.to_string()).or_default(),
        };
        stats.frequency = stats.frequency.saturating_add(count);
        stats.zones.add(zone, count);
        self.term_count += count as u64;
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }
}

/// Turns documents and query text into normalized terms.
pub trait TokenProducer {
    /// Analyzes a whole document into per-zone term counts.
    fn produce(&self, doc: &RawDocument) -> DocumentTerms;

    /// Normalizes free text (a query) into terms, in order of appearance.
    fn normalize(&self, text: &str) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_terms_accumulate() {
        let mut terms = DocumentTerms::new();
        terms.add("cat", Zone::Title);
        terms.add("cat", Zone::Body);
        terms.add_many("dog", Zone::Body, 2);
        terms.add_many("bird", Zone::Body, 0);

        assert_eq!(terms.len(), 2);
        assert_eq!(terms.term_count, 4);
        let cat = terms.terms["cat"];
        assert_eq!(cat.frequency, 2);
        assert_eq!(cat.zones.get(Zone::Title), 1);
        assert_eq!(cat.zones.get(Zone::Body), 1);
        assert!(!terms.terms.contains_key("bird"));
    }
}
