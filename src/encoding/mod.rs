//! Line-oriented encodings for every file in an index directory.
//!
//! All index files are plain text built from a fixed delimiter grammar:
//!
//! ```text
//! primary / temp block:  term:doc_id|tf|T.2,B.5;doc_id|tf|B.1\n
//! secondary / tertiary:  term=byte_offset\n
//! document metadata:     doc_id=value\n
//! ```
//!
//! The delimiters are reserved: they never appear inside terms or doc ids.
//! Titles are only ever the last field of a line, so they may contain `=`
//! but never a newline.

pub mod entry;
pub mod posting;

use std::fmt;

use thiserror::Error;

pub use entry::{decode_entry, decode_offset_entry, encode_entry};
pub use posting::{decode_line, decode_postings, encode_line, encode_postings};

pub type DocId = u64;

pub const TERM_POSTINGS_SEP: char = ':';
pub const POSTINGS_SEP: char = ';';
pub const POSTING_FIELD_SEP: char = '|';
pub const ZONES_SEP: char = ',';
pub const ZONE_FREQ_SEP: char = '.';
pub const ENTRY_SEP: char = '=';

const RESERVED: [char; 6] = [
    TERM_POSTINGS_SEP,
    POSTINGS_SEP,
    POSTING_FIELD_SEP,
    ZONES_SEP,
    ZONE_FREQ_SEP,
    ENTRY_SEP,
];

/// Errors produced by the line decoders. Callers attach the file name and
/// line number when they surface one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing '{0}' separator")]
    MissingSeparator(char),
    #[error("invalid {0}: {1:?}")]
    InvalidNumber(&'static str, String),
    #[error("unknown zone code {0:?}")]
    UnknownZone(String),
    #[error("empty term")]
    EmptyTerm,
    #[error("term {0:?} contains a reserved character")]
    ReservedCharacter(String),
    #[error("zone {0} listed more than once")]
    DuplicateZone(Zone),
}

/// Checks that a term can be stored without breaking the line grammar.
pub fn validate_term(term: &str) -> Result<(), DecodeError> {
    if term.is_empty() {
        return Err(DecodeError::EmptyTerm);
    }
    if term
        .chars()
        .any(|c| RESERVED.contains(&c) || c.is_whitespace())
    {
        return Err(DecodeError::ReservedCharacter(term.to_string()));
    }
    Ok(())
}

/// A structural field of a document in which a term can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    Title,
    Body,
    Infobox,
    Category,
    Reference,
    Link,
}

impl Zone {
    pub const ALL: [Zone; 6] = [
        Zone::Title,
        Zone::Body,
        Zone::Infobox,
        Zone::Category,
        Zone::Reference,
        Zone::Link,
    ];

    /// Single-letter code used in the postings files.
    pub fn code(self) -> char {
        match self {
            Zone::Title => 'T',
            Zone::Body => 'B',
            Zone::Infobox => 'I',
            Zone::Category => 'C',
            Zone::Reference => 'R',
            Zone::Link => 'L',
        }
    }

    pub fn from_code(code: &str) -> Option<Zone> {
        match code {
            "T" => Some(Zone::Title),
            "B" => Some(Zone::Body),
            "I" => Some(Zone::Infobox),
            "C" => Some(Zone::Category),
            "R" => Some(Zone::Reference),
            "L" => Some(Zone::Link),
            _ => None,
        }
    }

    /// Field name accepted in `field:term` queries.
    pub fn from_field(name: &str) -> Option<Zone> {
        match name.to_ascii_lowercase().as_str() {
            "title" => Some(Zone::Title),
            "body" => Some(Zone::Body),
            "infobox" => Some(Zone::Infobox),
            "category" => Some(Zone::Category),
            "ref" => Some(Zone::Reference),
            "link" => Some(Zone::Link),
            _ => None,
        }
    }

    /// Fixed weight used to rank postings before truncating long lists.
    pub fn weight(self) -> u64 {
        match self {
            Zone::Title => 25,
            Zone::Body => 20,
            Zone::Infobox => 10,
            Zone::Category => 8,
            Zone::Reference => 1,
            Zone::Link => 1,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Per-zone occurrence counts of one term in one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ZoneCounts([u32; 6]);

impl ZoneCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` occurrences in `zone`, saturating at `u32::MAX`.
    pub fn add(&mut self, zone: Zone, count: u32) {
        let slot = &mut self.0[zone.slot()];
        *slot = slot.saturating_add(count);
    }

    pub fn with(mut self, zone: Zone, count: u32) -> Self {
        self.add(zone, count);
        self
    }

    pub fn get(&self, zone: Zone) -> u32 {
        self.0[zone.slot()]
    }

    pub fn contains(&self, zone: Zone) -> bool {
        self.get(zone) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Non-zero zones in code order.
    pub fn iter(&self) -> impl Iterator<Item = (Zone, u32)> + '_ {
        Zone::ALL
            .iter()
            .map(|&zone| (zone, self.get(zone)))
            .filter(|&(_, count)| count > 0)
    }

    /// Sum of zone counts weighted by `Zone::weight`.
    pub fn weighted_score(&self) -> u64 {
        self.iter()
            .map(|(zone, count)| zone.weight() * count as u64)
            .sum()
    }
}

/// One (term, document) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    pub zones: ZoneCounts,
}

impl Posting {
    pub fn new(doc_id: DocId, tf: u32, zones: ZoneCounts) -> Self {
        Self { doc_id, tf, zones }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_codes() {
        for zone in Zone::ALL {
            assert_eq!(Zone::from_code(&zone.code().to_string()), Some(zone));
        }
        assert_eq!(Zone::from_code("X"), None);
        assert_eq!(Zone::from_field("ref"), Some(Zone::Reference));
        assert_eq!(Zone::from_field("Title"), Some(Zone::Title));
        assert_eq!(Zone::from_field("reference"), None);
    }

    #[test]
    fn test_zone_counts() {
        let zones = ZoneCounts::new().with(Zone::Body, 2).with(Zone::Link, 1);
        assert!(zones.contains(Zone::Body));
        assert!(!zones.contains(Zone::Title));
        assert_eq!(zones.total(), 3);
        assert_eq!(
            zones.iter().collect::<Vec<_>>(),
            vec![(Zone::Body, 2), (Zone::Link, 1)]
        );
        assert_eq!(zones.weighted_score(), 2 * 20 + 1);
    }

    #[test]
    fn test_title_outweighs_reference() {
        let title = ZoneCounts::new().with(Zone::Title, 1);
        let refs = ZoneCounts::new().with(Zone::Reference, 5);
        assert!(title.weighted_score() > refs.weighted_score());
    }

    #[test]
    fn test_validate_term() {
        assert!(validate_term("gandhi").is_ok());
        assert_eq!(validate_term(""), Err(DecodeError::EmptyTerm));
        for bad in ["a:b", "a;b", "a|b", "a,b", "a.b", "a=b", "a b", "a\n"] {
            assert!(validate_term(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
