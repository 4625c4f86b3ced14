use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use super::sparse::SparseIndex;
use super::IndexReader;
use crate::encoding::decode_offset_entry;
use crate::error::{Error, Result};
use crate::manifest::IndexFile;

/// Resolves terms through the tertiary index held in memory and a bounded
/// scan of the secondary file.
///
/// A lookup costs one in-memory binary search, one seek, and at most
/// `gap + 2` secondary lines, however large the index grows.
pub struct TieredReader {
    tertiary: SparseIndex,
    secondary: BufReader<File>,
    scan_limit: usize,
    line: String,
}

impl TieredReader {
    pub fn open(dir: &Path, tertiary_gap: usize) -> Result<Self> {
        let tertiary = SparseIndex::load(
            BufReader::new(IndexFile::Tertiary.open(dir)?),
            IndexFile::Tertiary.name(),
        )?;
        let secondary = BufReader::new(IndexFile::Secondary.open(dir)?);
        tracing::debug!(
            tertiary_entries = tertiary.len(),
            tertiary_gap = tertiary_gap,
            "Opened tiered index reader"
        );
        Ok(Self {
            tertiary,
            secondary,
            scan_limit: tertiary_gap + 2,
            line: String::new(),
        })
    }

    pub fn tertiary(&self) -> &SparseIndex {
        &self.tertiary
    }
}

impl IndexReader for TieredReader {
    fn resolve_offset(&mut self, term: &str) -> Result<Option<u64>> {
        let Some(start) = self.tertiary.find(term).map(|entry| entry.offset) else {
            return Ok(None);
        };
        self.secondary
            .seek(SeekFrom::Start(start))
            .map_err(|e| Error::ReadError("secondary", e))?;

        for _ in 0..self.scan_limit {
            self.line.clear();
            let read = self
                .secondary
                .read_line(&mut self.line)
                .map_err(|e| Error::ReadError("secondary", e))?;
            if read == 0 {
                break;
            }
            let (found, offset) = match decode_offset_entry(&self.line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(term = term, error = %e, "Skipping malformed secondary entry");
                    continue;
                }
            };
            match found.cmp(term) {
                std::cmp::Ordering::Equal => return Ok(Some(offset)),
                // Secondary is sorted, the term cannot come later.
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "tiered"
    }
}
