//! Codec for postings lines: `term:doc_id|tf|zone.ztf,zone.ztf;...`

use std::fmt::Write as _;

use itertools::Itertools as _;

use super::{
    DecodeError, Posting, Zone, ZoneCounts, POSTINGS_SEP, POSTING_FIELD_SEP, TERM_POSTINGS_SEP,
    ZONES_SEP, ZONE_FREQ_SEP,
};

/// Appends the postings part of a line (no term, no newline).
pub fn encode_postings(postings: &[Posting], out: &mut String) {
    for (i, posting) in postings.iter().enumerate() {
        if i > 0 {
            out.push(POSTINGS_SEP);
        }
        let zones = posting
            .zones
            .iter()
            .map(|(zone, count)| format!("{}{}{}", zone.code(), ZONE_FREQ_SEP, count))
            .join(&ZONES_SEP.to_string());
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "{}{sep}{}{sep}{}",
            posting.doc_id,
            posting.tf,
            zones,
            sep = POSTING_FIELD_SEP
        );
    }
}

/// Encodes a full `term:postings\n` line.
pub fn encode_line(term: &str, postings: &[Posting]) -> String {
    let mut line = String::with_capacity(term.len() + 1 + postings.len() * 16);
    line.push_str(term);
    line.push(TERM_POSTINGS_SEP);
    encode_postings(postings, &mut line);
    line.push('\n');
    line
}

/// Splits a postings line into its term and the raw postings text.
pub fn decode_line(line: &str) -> Result<(&str, &str), DecodeError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let (term, postings) = line
        .split_once(TERM_POSTINGS_SEP)
        .ok_or(DecodeError::MissingSeparator(TERM_POSTINGS_SEP))?;
    if term.is_empty() {
        return Err(DecodeError::EmptyTerm);
    }
    Ok((term, postings))
}

/// Decodes one `doc_id|tf|zonepairs` unit.
pub fn decode_posting(unit: &str) -> Result<Posting, DecodeError> {
    let mut fields = unit.splitn(3, POSTING_FIELD_SEP);
    let doc_id = fields.next().unwrap_or_default();
    let tf = fields
        .next()
        .ok_or(DecodeError::MissingSeparator(POSTING_FIELD_SEP))?;
    let zone_pairs = fields
        .next()
        .ok_or(DecodeError::MissingSeparator(POSTING_FIELD_SEP))?;

    let doc_id = doc_id
        .parse()
        .map_err(|_| DecodeError::InvalidNumber("doc id", doc_id.to_string()))?;
    let tf = tf
        .parse()
        .map_err(|_| DecodeError::InvalidNumber("term frequency", tf.to_string()))?;

    let mut zones = ZoneCounts::new();
    for pair in zone_pairs.split(ZONES_SEP).filter(|p| !p.is_empty()) {
        let (code, count) = pair
            .split_once(ZONE_FREQ_SEP)
            .ok_or(DecodeError::MissingSeparator(ZONE_FREQ_SEP))?;
        let zone = Zone::from_code(code).ok_or_else(|| DecodeError::UnknownZone(code.into()))?;
        let count = count
            .parse()
            .map_err(|_| DecodeError::InvalidNumber("zone frequency", count.to_string()))?;
        if zones.contains(zone) {
            return Err(DecodeError::DuplicateZone(zone));
        }
        zones.add(zone, count);
    }

    Ok(Posting { doc_id, tf, zones })
}

/// Decodes every unit, failing on the first malformed one.
pub fn decode_postings(postings: &str) -> Result<Vec<Posting>, DecodeError> {
    postings
        .split(POSTINGS_SEP)
        .filter(|unit| !unit.is_empty())
        .map(decode_posting)
        .collect()
}

/// Decodes every unit, handing malformed ones to `on_error` instead of failing.
pub fn decode_postings_lossy(
    postings: &str,
    mut on_error: impl FnMut(&str, DecodeError),
) -> Vec<Posting> {
    postings
        .split(POSTINGS_SEP)
        .filter(|unit| !unit.is_empty())
        .filter_map(|unit| match decode_posting(unit) {
            Ok(posting) => Some(posting),
            Err(e) => {
                on_error(unit, e);
                None
            }
        })
        .collect()
}
