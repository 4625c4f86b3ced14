//! Ranked retrieval over the tiered index.
//!
//! Queries come in three forms:
//!
//! - one word: `gandhi`
//! - free text: `mahatma gandhi salt march`
//! - field: `title:gandhi body:salt march` (bare tokens keep the previous field)

pub mod engine;
pub mod scoring;

pub use engine::{QueryContext, SearchHit};
pub use scoring::ScoreBoard;

use crate::encoding::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    OneWord,
    FreeText,
    Field,
}

pub fn classify(query: &str) -> QueryKind {
    if query.contains(':') {
        QueryKind::Field
    } else if query.split_whitespace().nth(1).is_some() {
        QueryKind::FreeText
    } else {
        QueryKind::OneWord
    }
}

/// Raw text of a field query scoped to one zone. `zone` is `None` for text
/// before the first field name, which matches any zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSegment {
    pub zone: Option<Zone>,
    pub text: String,
}

/// Splits a field query into per-zone segments. Text under an unknown field
/// name is dropped.
pub fn parse_field_query(query: &str) -> Vec<FieldSegment> {
    let mut segments: Vec<FieldSegment> = Vec::new();
    // Outer `None`: inside an unknown field.
    let mut current: Option<Option<Zone>> = Some(None);

    for token in query.split_whitespace() {
        let text = match token.split_once(':') {
            Some((field, rest)) => {
                current = match Zone::from_field(field) {
                    Some(zone) => Some(Some(zone)),
                    None => {
                        tracing::warn!(field = field, "Skipping unknown query field");
                        None
                    }
                };
                rest
            }
            None => token,
        };
        let Some(zone) = current else { continue };
        if text.is_empty() {
            continue;
        }
        match segments.last_mut() {
            Some(last) if last.zone == zone => {
                last.text.push(' ');
                last.text.push_str(text);
            }
            _ => segments.push(FieldSegment {
                zone,
                text: text.to_string(),
            }),
        }
    }
    segments
}
