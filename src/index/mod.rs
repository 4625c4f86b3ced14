//! Query-time access to the tiered index.
//!
//! A term is resolved to its primary offset by an `IndexReader`, then a
//! single primary line is read and decoded:
//!
//! ```text
//! term ─► tertiary (memory) ─► secondary (≤ gap + 2 lines) ─► primary (1 line)
//! ```

pub mod dense;
pub mod sparse;
pub mod tiered;

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

pub use dense::DenseReader;
pub use sparse::SparseIndex;
pub use tiered::TieredReader;

use crate::config::ReaderStrategy;
use crate::encoding::posting::decode_postings_lossy;
use crate::encoding::{decode_line, Posting, Zone};
use crate::error::{Error, Result};
use crate::manifest::IndexFile;

/// Maps a term to the byte offset of its line in the primary file.
pub trait IndexReader {
    /// Returns `None` when the term is not in the index.
    fn resolve_offset(&mut self, term: &str) -> Result<Option<u64>>;

    fn name(&self) -> &'static str;
}

/// Opens the reader for `strategy`.
pub fn open_reader(
    dir: &Path,
    strategy: ReaderStrategy,
    tertiary_gap: usize,
) -> Result<Box<dyn IndexReader>> {
    Ok(match strategy {
        ReaderStrategy::Tiered => Box::new(TieredReader::open(dir, tertiary_gap)?),
        ReaderStrategy::Dense => Box::new(DenseReader::open(dir)?),
    })
}

/// Postings of one term as seen by the query engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    pub postings: Vec<Posting>,
    /// Number of documents containing the term, before zone filtering or
    /// truncation.
    pub document_frequency: usize,
}

impl PostingList {
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// Fetches postings lists from the primary file.
pub struct PostingsReader {
    reader: Box<dyn IndexReader>,
    primary: BufReader<File>,
    max_postings: usize,
    line: String,
}

impl PostingsReader {
    pub fn open(
        dir: &Path,
        strategy: ReaderStrategy,
        tertiary_gap: usize,
        max_postings: usize,
    ) -> Result<Self> {
        let reader = open_reader(dir, strategy, tertiary_gap)?;
        let primary = BufReader::new(IndexFile::Primary.open(dir)?);
        Ok(Self {
            reader,
            primary,
            max_postings: max_postings.max(1),
            line: String::new(),
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.reader.name()
    }

    /// Returns the postings of `term`, restricted to documents where the term
    /// occurs in `zone` when one is given. Unknown terms yield an empty list.
    pub fn fetch_postings(&mut self, term: &str, zone: Option<Zone>) -> Result<PostingList> {
        let Some(offset) = self.reader.resolve_offset(term)? else {
            return Ok(PostingList::default());
        };

        self.primary
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::ReadError("primary", e))?;
        self.line.clear();
        self.primary
            .read_line(&mut self.line)
            .map_err(|e| Error::ReadError("primary", e))?;

        let (found, raw) = decode_line(&self.line).map_err(|e| {
            Error::IndexCorruption(format!("primary line at offset {offset}: {e}"))
        })?;
        if found != term {
            return Err(Error::IndexCorruption(format!(
                "offset {offset} of term {term:?} points at {found:?}"
            )));
        }

        let mut postings = decode_postings_lossy(raw, |unit, e| {
            tracing::warn!(term = term, posting = unit, error = %e, "Skipping malformed posting");
        });
        let document_frequency = postings.len();

        if let Some(zone) = zone {
            postings.retain(|p| p.zones.contains(zone));
        }
        if postings.len() > self.max_postings {
            // Stable sort: equal scores keep their tf order.
            postings.sort_by(|a, b| b.zones.weighted_score().cmp(&a.zones.weighted_score()));
            postings.truncate(self.max_postings);
        }

        Ok(PostingList {
            postings,
            document_frequency,
        })
    }
}
