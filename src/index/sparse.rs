use std::io::BufRead;

use crate::encoding::decode_offset_entry;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Entry<'a> {
    pub index: usize,   // Position of the entry in the sparse index
    pub term: &'a str,  // Term of the sampled secondary line
    pub offset: u64,    // Offset of that line in the secondary file
}

/// The in-memory tertiary index: every `gap`th secondary entry with its
/// offset in the secondary file.
#[derive(Debug, Clone, Default)]
pub struct SparseIndex {
    entries: Vec<(String, u64)>,
}

impl SparseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Terms and offsets must both strictly increase.
    pub fn push(&mut self, term: String, offset: u64) -> Result<()> {
        if let Some((last_term, last_offset)) = self.entries.last() {
            if term <= *last_term || offset <= *last_offset {
                return Err(Error::IndexCorruption(format!(
                    "tertiary entry {term:?}={offset} does not follow {last_term:?}={last_offset}"
                )));
            }
        }
        self.entries.push((term, offset));
        Ok(())
    }

    /// Loads `term=offset` lines.
    pub fn load(reader: impl BufRead, name: &str) -> Result<Self> {
        let mut index = Self::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::ReadError("tertiary", e))?;
            let (term, offset) =
                decode_offset_entry(&line).map_err(|e| Error::malformed(name, i + 1, e.to_string()))?;
            index.push(term.to_string(), offset)?;
        }
        Ok(index)
    }

    /// Finds the rightmost entry whose term is less than or equal to `term`.
    pub fn find(&self, term: &str) -> Option<Entry<'_>> {
        let mut low = 0;
        let mut high = self.entries.len();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.entries[mid].0.as_str().cmp(term) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.entry(mid)),
            }
        }
        // `low` is the first entry greater than `term`
        if low > 0 {
            Some(self.entry(low - 1))
        } else {
            None
        }
    }

    fn entry(&self, index: usize) -> Entry<'_> {
        Entry {
            index,
            term: &self.entries[index].0,
            offset: self.entries[index].1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, u64)]) -> SparseIndex {
        let mut index = SparseIndex::new();
        for &(term, offset) in entries {
            index.push(term.to_string(), offset).unwrap();
        }
        index
    }

    #[test]
    fn test_find_rightmost_less_or_equal() {
        let index = index(&[("apple", 0), ("grape", 120), ("melon", 260), ("peach", 400)]);

        let exact = index.find("grape").unwrap();
        assert_eq!((exact.index, exact.term, exact.offset), (1, "grape", 120));

        let between = index.find("kiwi").unwrap();
        assert_eq!((between.index, between.offset), (1, 120));

        let after = index.find("zucchini").unwrap();
        assert_eq!(after.term, "peach");

        assert!(index.find("aardvark").is_none());
    }

    #[test]
    fn test_find_on_empty_index() {
        assert!(SparseIndex::new().find("anything").is_none());
    }

    #[test]
    fn test_rejects_unordered_entries() {
        let mut index = index(&[("b", 10)]);
        assert!(index.push("a".to_string(), 20).is_err());
        assert!(index.push("c".to_string(), 5).is_err());
        assert!(index.push("c".to_string(), 20).is_ok());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_load() {
        let data = "apple=0\ngrape=120\n";
        let index = SparseIndex::load(data.as_bytes(), "tertiary").unwrap();
        assert_eq!(index.len(), 2);

        let bad = "apple=0\ngrape\n";
        assert!(matches!(
            SparseIndex::load(bad.as_bytes(), "tertiary"),
            Err(Error::MalformedRecord { line: 2, .. })
        ));
    }
}
