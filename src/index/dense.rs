use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::IndexReader;
use crate::encoding::decode_offset_entry;
use crate::error::{Error, Result};
use crate::manifest::IndexFile;

/// Holds the whole secondary index in memory. Lookups never touch the
/// secondary file, at the cost of memory proportional to the vocabulary.
pub struct DenseReader {
    offsets: HashMap<String, u64>,
}

impl DenseReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let reader = BufReader::new(IndexFile::Secondary.open(dir)?);
        let mut offsets = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::ReadError("secondary", e))?;
            let (term, offset) = decode_offset_entry(&line).map_err(|e| {
                Error::malformed(IndexFile::Secondary.name(), i + 1, e.to_string())
            })?;
            if offsets.insert(term.to_string(), offset).is_some() {
                return Err(Error::IndexCorruption(format!(
                    "term {term:?} appears twice in the secondary index"
                )));
            }
        }
        tracing::debug!(terms = offsets.len(), "Loaded dense secondary index");
        Ok(Self { offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl IndexReader for DenseReader {
    fn resolve_offset(&mut self, term: &str) -> Result<Option<u64>> {
        Ok(self.offsets.get(term).copied())
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}
