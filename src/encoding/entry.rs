//! Codec for `key=value` lines used by the offset indexes and the document
//! metadata files.

use super::{DecodeError, DocId, ENTRY_SEP};

pub fn encode_entry(key: impl std::fmt::Display, value: impl std::fmt::Display) -> String {
    format!("{key}{ENTRY_SEP}{value}\n")
}

/// Splits on the first `=`, so the value may itself contain `=`.
pub fn decode_entry(line: &str) -> Result<(&str, &str), DecodeError> {
    let line = line.trim_end_matches(['\n', '\r']);
    line.split_once(ENTRY_SEP)
        .ok_or(DecodeError::MissingSeparator(ENTRY_SEP))
}

/// Decodes a `term=byte_offset` line.
pub fn decode_offset_entry(line: &str) -> Result<(&str, u64), DecodeError> {
    let (term, offset) = decode_entry(line)?;
    if term.is_empty() {
        return Err(DecodeError::EmptyTerm);
    }
    let offset = offset
        .parse()
        .map_err(|_| DecodeError::InvalidNumber("offset", offset.to_string()))?;
    Ok((term, offset))
}

/// Decodes a `doc_id=value` line, leaving the value raw.
pub fn decode_doc_entry(line: &str) -> Result<(DocId, &str), DecodeError> {
    let (doc_id, value) = decode_entry(line)?;
    let doc_id = doc_id
        .parse()
        .map_err(|_| DecodeError::InvalidNumber("doc id", doc_id.to_string()))?;
    Ok((doc_id, value))
}

/// Decodes a `doc_id=number` line.
pub fn decode_doc_number(line: &str, what: &'static str) -> Result<(DocId, u64), DecodeError> {
    let (doc_id, value) = decode_doc_entry(line)?;
    let value = value
        .parse()
        .map_err(|_| DecodeError::InvalidNumber(what, value.to_string()))?;
    Ok((doc_id, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_entry() {
        assert_eq!(encode_entry("gandhi", 1024), "gandhi=1024\n");
        assert_eq!(decode_offset_entry("gandhi=1024\n"), Ok(("gandhi", 1024)));
        assert_eq!(
            decode_offset_entry("gandhi"),
            Err(DecodeError::MissingSeparator('='))
        );
        assert!(matches!(
            decode_offset_entry("gandhi=-1"),
            Err(DecodeError::InvalidNumber("offset", _))
        ));
    }

    #[test]
    fn test_title_may_contain_separator() {
        let (doc_id, title) = decode_doc_entry("42=E=mc2\n").unwrap();
        assert_eq!(doc_id, 42);
        assert_eq!(title, "E=mc2");
    }

    #[test]
    fn test_doc_number() {
        assert_eq!(decode_doc_number("7=310", "term count"), Ok((7, 310)));
        assert!(decode_doc_number("seven=310", "term count").is_err());
    }
}
