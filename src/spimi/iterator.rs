use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::encoding::{decode_line, decode_postings, Posting};
use crate::error::{Error, Result};

/// A decoded temp block line waiting in the merge heap.
pub struct HeapEntry {
    pub term: String,
    pub postings: Vec<Posting>,
    pub block: usize,
}

impl std::fmt::Debug for HeapEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapEntry")
            .field("term", &self.term)
            .field("postings", &self.postings.len())
            .field("block", &self.block)
            .finish()
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.block == other.block
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap; ordering is reversed so the smallest
// (term, block) pair pops first.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.term
            .cmp(&other.term)
            .then(self.block.cmp(&other.block))
            .reverse()
    }
}

/// Sequential reader over one temp block with bounded read-ahead.
pub struct BlockReader {
    index: usize,
    path: PathBuf,
    reader: BufReader<File>,
    line: String,
    line_no: usize,
    last_term: Option<String>,
    exhausted: bool,
}

impl BlockReader {
    pub fn open(index: usize, path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ReadError("temp block", e))?;
        Ok(Self {
            index,
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
            line_no: 0,
            last_term: None,
            exhausted: false,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Reads and decodes up to `limit` lines.
    ///
    /// Any malformed or out-of-order line fails the build: a merged index
    /// built from it could not be trusted.
    pub fn read_ahead(&mut self, limit: usize) -> Result<Vec<HeapEntry>> {
        let mut entries = Vec::new();
        while entries.len() < limit && !self.exhausted {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| Error::ReadError("temp block", e))?;
            if read == 0 {
                self.exhausted = true;
                break;
            }
            self.line_no += 1;
            entries.push(self.decode_current()?);
        }
        Ok(entries)
    }

    fn decode_current(&mut self) -> Result<HeapEntry> {
        let (term, raw) = decode_line(&self.line).map_err(|e| self.malformed(e.to_string()))?;
        if let Some(last) = &self.last_term {
            if term <= last.as_str() {
                return Err(self.malformed(format!(
                    "term {term:?} does not sort after {last:?}"
                )));
            }
        }
        let postings = decode_postings(raw).map_err(|e| self.malformed(e.to_string()))?;
        let term = term.to_string();
        self.last_term = Some(term.clone());
        Ok(HeapEntry {
            term,
            postings,
            block: self.index,
        })
    }

    fn malformed(&self, reason: String) -> Error {
        Error::malformed(self.path.display().to_string(), self.line_no, reason)
    }
}
