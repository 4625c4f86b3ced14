//! In-memory block of the SPIMI build.
//!
//! Postings accumulate in a term-sorted map until the block's estimated size
//! crosses a threshold. The block is then written out as a numbered temp
//! file in primary line format, each postings list ordered by descending term
//! frequency, and cleared. Peak memory is one block regardless of corpus size.

use std::collections::BTreeMap;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use crate::encoding::{encode_line, validate_term, DocId, Posting};
use crate::error::{Error, Result};
use crate::producer::DocumentTerms;
use crate::writer::OffsetWriter;

pub const TEMP_BLOCK_PREFIX: &str = "temp-";

// Rough per-entry bookkeeping cost of the map, on top of the string bytes.
const TERM_OVERHEAD: usize = mem::size_of::<String>() + mem::size_of::<Vec<Posting>>() + 16;
const POSTING_SIZE: usize = mem::size_of::<Posting>();

/// Path of the `n`th temp block (1-based).
pub fn block_path(dir: &Path, n: usize) -> PathBuf {
    dir.join(format!("{TEMP_BLOCK_PREFIX}{n}"))
}

#[derive(Debug)]
pub struct BlockBuilder {
    dir: PathBuf,
    max_bytes: usize,
    max_postings: usize,
    block: BTreeMap<String, Vec<Posting>>,
    size: usize,
    postings: usize,
    flushed: Vec<PathBuf>,
}

impl BlockBuilder {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize, max_postings: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            max_postings: max_postings.max(1),
            block: BTreeMap::new(),
            size: 0,
            postings: 0,
            flushed: Vec::new(),
        }
    }

    /// Estimated bytes held by the current block.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Postings held by the current block.
    pub fn posting_count(&self) -> usize {
        self.postings
    }

    /// Temp blocks written so far, in order.
    pub fn blocks(&self) -> &[PathBuf] {
        &self.flushed
    }

    /// Adds one posting per term of the document, flushing the block if it
    /// grew past its limits.
    ///
    /// Terms are checked before anything is inserted, so a rejected document
    /// leaves the block untouched.
    pub fn ingest(&mut self, doc_id: DocId, doc: &DocumentTerms) -> Result<()> {
        for term in doc.terms.keys() {
            validate_term(term)
                .map_err(|e| Error::malformed(format!("document {doc_id}"), 0, e.to_string()))?;
        }

        for (term, stats) in &doc.terms {
            let posting = Posting::new(doc_id, stats.frequency, stats.zones);
            match self.block.get_mut(term.as_str()) {
                Some(list) => list.push(posting),
                None => {
                    self.size += term.len() + TERM_OVERHEAD;
                    self.block.insert(term.clone(), vec![posting]);
                }
            }
            self.size += POSTING_SIZE;
            self.postings += 1;
        }

        if self.size >= self.max_bytes || self.postings >= self.max_postings {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the current block to the next temp file. Returns `None` when
    /// the block is empty.
    ///
    /// The block is written under a `.partial` name and renamed once synced,
    /// so only complete blocks ever carry a `temp-<n>` name.
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        if self.block.is_empty() {
            return Ok(None);
        }

        let block = mem::take(&mut self.block);
        let terms = block.len();
        let postings = self.postings;
        self.size = 0;
        self.postings = 0;

        let target = block_path(&self.dir, self.flushed.len() + 1);
        let staging = target.with_extension("partial");

        if let Err(e) = write_block(&staging, &target, block) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        tracing::debug!(
            block = %target.display(),
            terms = terms,
            postings = postings,
            "Flushed temp block"
        );
        self.flushed.push(target.clone());
        Ok(Some(target))
    }

    /// Flushes the last block and returns every temp block written.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.flush()?;
        Ok(self.flushed)
    }
}

fn write_block(
    staging: &Path,
    target: &Path,
    block: BTreeMap<String, Vec<Posting>>,
) -> Result<()> {
    let mut writer = OffsetWriter::create("temp block", staging)?;
    for (term, mut postings) in block {
        postings.sort_by(|a, b| b.tf.cmp(&a.tf).then(a.doc_id.cmp(&b.doc_id)));
        writer.append_str(&encode_line(&term, &postings))?;
    }
    writer.persist(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Zone;
    use tempfile::TempDir;

    fn doc(terms: &[(&str, Zone, u32)]) -> DocumentTerms {
        let mut doc = DocumentTerms::new();
        for &(term, zone, count) in terms {
            doc.add_many(term, zone, count);
        }
        doc
    }

    #[test]
    fn test_flush_sorts_terms_and_postings() {
        let dir = TempDir::new().unwrap();
        let mut builder = BlockBuilder::new(dir.path(), usize::MAX, usize::MAX);

        builder
            .ingest(1, &doc(&[("zebra", Zone::Body, 1), ("apple", Zone::Body, 1)]))
            .unwrap();
        builder
            .ingest(2, &doc(&[("apple", Zone::Title, 1), ("apple", Zone::Body, 4)]))
            .unwrap();
        builder.ingest(3, &doc(&[("apple", Zone::Body, 1)])).unwrap();

        let blocks = builder.finish().unwrap();
        assert_eq!(blocks, vec![dir.path().join("temp-1")]);

        let content = fs::read_to_string(&blocks[0]).unwrap();
        assert_eq!(
            content,
            "apple:2|5|T.1,B.4;1|1|B.1;3|1|B.1\nzebra:1|1|B.1\n"
        );
    }

    #[test]
    fn test_threshold_starts_new_block() {
        let dir = TempDir::new().unwrap();
        let mut builder = BlockBuilder::new(dir.path(), usize::MAX, 2);

        builder.ingest(1, &doc(&[("cat", Zone::Body, 1)])).unwrap();
        assert_eq!(builder.posting_count(), 1);
        builder
            .ingest(2, &doc(&[("cat", Zone::Body, 1), ("dog", Zone::Body, 1)]))
            .unwrap();
        // Crossing the limit flushed the block.
        assert_eq!(builder.posting_count(), 0);
        assert_eq!(builder.blocks().len(), 1);

        builder.ingest(3, &doc(&[("cat", Zone::Body, 2)])).unwrap();
        let blocks = builder.finish().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            fs::read_to_string(&blocks[1]).unwrap(),
            "cat:3|2|B.2\n"
        );
    }

    #[test]
    fn test_byte_threshold() {
        let dir = TempDir::new().unwrap();
        let mut builder = BlockBuilder::new(dir.path(), 1, usize::MAX);
        builder.ingest(1, &doc(&[("cat", Zone::Body, 1)])).unwrap();
        assert_eq!(builder.size(), 0);
        assert!(block_path(dir.path(), 1).exists());
    }

    #[test]
    fn test_empty_block_not_written() {
        let dir = TempDir::new().unwrap();
        let mut builder = BlockBuilder::new(dir.path(), usize::MAX, usize::MAX);
        assert_eq!(builder.flush().unwrap(), None);
        builder.ingest(1, &DocumentTerms::new()).unwrap();
        assert!(builder.finish().unwrap().is_empty());
        assert!(!block_path(dir.path(), 1).exists());
    }

    #[test]
    fn test_rejects_reserved_characters() {
        let dir = TempDir::new().unwrap();
        let mut builder = BlockBuilder::new(dir.path(), usize::MAX, usize::MAX);

        let err = builder
            .ingest(9, &doc(&[("ok", Zone::Body, 1), ("bad:term", Zone::Body, 1)]))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
        // Nothing from the rejected document was kept.
        assert_eq!(builder.posting_count(), 0);
    }

    #[test]
    fn test_failed_flush_leaves_no_block() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let mut builder = BlockBuilder::new(&missing, usize::MAX, usize::MAX);
        builder.ingest(1, &doc(&[("cat", Zone::Body, 1)])).unwrap();

        assert!(builder.flush().is_err());
        assert!(builder.blocks().is_empty());
    }
}
