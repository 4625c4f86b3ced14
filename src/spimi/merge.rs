//! External k-way merge of temp blocks into the tiered index.
//!
//! Every temp block is sorted by term, so a min-heap holding a bounded window
//! of lines from each block yields all lines in global term order. Fragments
//! of the same term from different blocks are merged as they pop, and each
//! completed term goes to three files at once:
//!
//! ```text
//! primary     term:postings\n                   one line per term
//! secondary   term=<offset into primary>\n      one line per term
//! tertiary    term=<offset into secondary>\n    one line per `tertiary_gap` terms
//! ```
//!
//! Memory is bounded by `read_buffer` lines per block plus `write_buffer`
//! completed terms, independent of the index size.

use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools as _;

use super::iterator::{BlockReader, HeapEntry};
use crate::config::MergeConfig;
use crate::encoding::{encode_entry, encode_line, Posting};
use crate::error::Result;
use crate::manifest::IndexFile;
use crate::writer::{FileSummary, OffsetWriter};

/// What a merge produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutput {
    pub term_count: u64,
    pub primary: FileSummary,
    pub secondary: FileSummary,
    pub tertiary: FileSummary,
}

/// Merges two postings lists that are each ordered by descending term
/// frequency. On equal frequency `left` goes first.
pub fn merge_by_tf(left: Vec<Posting>, right: Vec<Posting>) -> Vec<Posting> {
    if left.is_empty() {
        return right;
    }
    left.into_iter()
        .merge_by(right, |a, b| a.tf >= b.tf)
        .collect()
}

/// Writes the primary, secondary and tertiary files side by side.
///
/// Files are written under staging names and only renamed into place by
/// `finish`, once all three are complete.
pub struct TieredWriter {
    dir: PathBuf,
    primary: OffsetWriter,
    secondary: OffsetWriter,
    tertiary: OffsetWriter,
    gap: u64,
    terms: u64,
}

impl TieredWriter {
    pub fn create(dir: &Path, tertiary_gap: usize) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            primary: Self::staging(dir, IndexFile::Primary)?,
            secondary: Self::staging(dir, IndexFile::Secondary)?,
            tertiary: Self::staging(dir, IndexFile::Tertiary)?,
            gap: tertiary_gap.max(1) as u64,
            terms: 0,
        })
    }

    fn staging(dir: &Path, file: IndexFile) -> Result<OffsetWriter> {
        OffsetWriter::create(file.name(), file.staging_path(dir))
    }

    /// Appends one term. Terms must arrive in ascending order.
    pub fn write_term(&mut self, term: &str, postings: &[Posting]) -> Result<()> {
        let primary_offset = self.primary.append_str(&encode_line(term, postings))?;
        let secondary_offset = self
            .secondary
            .append_str(&encode_entry(term, primary_offset))?;
        if self.terms % self.gap == 0 {
            self.tertiary
                .append_str(&encode_entry(term, secondary_offset))?;
        }
        self.terms += 1;
        Ok(())
    }

    pub fn term_count(&self) -> u64 {
        self.terms
    }

    /// Syncs all three files and renames them to their final names.
    pub fn finish(self) -> Result<MergeOutput> {
        let dir = self.dir;
        let primary = self.primary.persist(IndexFile::Primary.path(&dir))?;
        let secondary = self.secondary.persist(IndexFile::Secondary.path(&dir))?;
        let tertiary = self.tertiary.persist(IndexFile::Tertiary.path(&dir))?;
        Ok(MergeOutput {
            term_count: self.terms,
            primary,
            secondary,
            tertiary,
        })
    }
}

/// Heap over the read-ahead windows of all blocks.
struct MergeHeap {
    readers: Vec<BlockReader>,
    in_heap: Vec<usize>,
    heap: BinaryHeap<HeapEntry>,
    read_buffer: usize,
}

impl MergeHeap {
    fn open(blocks: &[PathBuf], read_buffer: usize) -> Result<Self> {
        let readers = blocks
            .iter()
            .enumerate()
            .map(|(i, path)| BlockReader::open(i, path))
            .collect::<Result<Vec<_>>>()?;
        let mut heap = Self {
            in_heap: vec![0; readers.len()],
            readers,
            heap: BinaryHeap::new(),
            read_buffer: read_buffer.max(1),
        };
        for block in 0..heap.readers.len() {
            heap.refill(block)?;
        }
        Ok(heap)
    }

    fn refill(&mut self, block: usize) -> Result<()> {
        let reader = &mut self.readers[block];
        if reader.is_exhausted() {
            return Ok(());
        }
        let entries = reader.read_ahead(self.read_buffer)?;
        if entries.is_empty() {
            tracing::debug!(block = block, "Temp block exhausted");
        }
        self.in_heap[block] += entries.len();
        self.heap.extend(entries);
        Ok(())
    }

    /// Pops the smallest (term, block) line, reloading its block's window
    /// when this was the block's last line in the heap.
    fn pop(&mut self) -> Result<Option<HeapEntry>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        self.in_heap[entry.block] -= 1;
        if self.in_heap[entry.block] == 0 {
            self.refill(entry.block)?;
        }
        Ok(Some(entry))
    }
}

/// Merges `blocks` into the tiered index files in `dir`.
pub fn merge_blocks(dir: &Path, blocks: &[PathBuf], config: &MergeConfig) -> Result<MergeOutput> {
    tracing::info!(blocks = blocks.len(), "Merging temp blocks");

    let result = merge_into(dir, blocks, config);
    if result.is_err() {
        for file in [IndexFile::Primary, IndexFile::Secondary, IndexFile::Tertiary] {
            let _ = fs::remove_file(file.staging_path(dir));
        }
    }
    let output = result?;

    tracing::info!(
        blocks = blocks.len(),
        terms = output.term_count,
        primary_bytes = output.primary.len,
        "Merged temp blocks"
    );
    Ok(output)
}

fn merge_into(dir: &Path, blocks: &[PathBuf], config: &MergeConfig) -> Result<MergeOutput> {
    let mut heap = MergeHeap::open(blocks, config.read_buffer)?;
    let mut writer = TieredWriter::create(dir, config.tertiary_gap)?;

    let write_limit = config.write_buffer.max(1);
    let mut write_buffer: Vec<(String, Vec<Posting>)> = Vec::new();
    let mut pending: Option<(String, Vec<Posting>)> = None;

    while let Some(entry) = heap.pop()? {
        match pending.as_mut() {
            Some((term, postings)) if *term == entry.term => {
                let left = std::mem::take(postings);
                *postings = merge_by_tf(left, entry.postings);
            }
            _ => {
                if let Some(done) = pending.replace((entry.term, entry.postings)) {
                    write_buffer.push(done);
                    if write_buffer.len() >= write_limit {
                        flush_buffer(&mut writer, &mut write_buffer)?;
                    }
                }
            }
        }
    }

    if let Some(done) = pending.take() {
        write_buffer.push(done);
    }
    flush_buffer(&mut writer, &mut write_buffer)?;

    writer.finish()
}

fn flush_buffer(
    writer: &mut TieredWriter,
    buffer: &mut Vec<(String, Vec<Posting>)>,
) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        terms = buffer.len(),
        written = writer.term_count(),
        "Flushing merge write buffer"
    );
    for (term, postings) in buffer.drain(..) {
        writer.write_term(&term, &postings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode_line, decode_offset_entry, decode_postings, ZoneCounts};
    use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
    use tempfile::TempDir;

    fn p(doc_id: u64, tf: u32) -> Posting {
        Posting::new(doc_id, tf, ZoneCounts::new().with(crate::encoding::Zone::Body, tf))
    }

    fn write_block(dir: &Path, n: usize, content: &str) -> PathBuf {
        let path = super::super::block::block_path(dir, n);
        fs::write(&path, content).unwrap();
        path
    }

    fn small_config() -> MergeConfig {
        MergeConfig::default()
            .read_buffer(1)
            .write_buffer(2)
            .tertiary_gap(2)
    }

    fn read_primary(dir: &Path) -> Vec<(String, Vec<Posting>)> {
        fs::read_to_string(IndexFile::Primary.path(dir))
            .unwrap()
            .lines()
            .map(|line| {
                let (term, raw) = decode_line(line).unwrap();
                (term.to_string(), decode_postings(raw).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_merge_by_tf() {
        let merged = merge_by_tf(vec![p(1, 9), p(2, 4), p(3, 1)], vec![p(7, 5), p(8, 4)]);
        let order: Vec<_> = merged.iter().map(|p| (p.doc_id, p.tf)).collect();
        assert_eq!(order, vec![(1, 9), (7, 5), (2, 4), (8, 4), (3, 1)]);
    }

    #[test]
    fn test_merge_unions_postings_across_blocks() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![
            write_block(dir.path(), 1, "ant:1|2|B.2\ncat:1|5|B.5;2|1|B.1\n"),
            write_block(dir.path(), 2, "bee:3|1|B.1\ncat:4|3|B.3;3|2|B.2\nzoo:4|1|B.1\n"),
            write_block(dir.path(), 3, "cat:5|7|B.7\n"),
        ];

        let output = merge_blocks(dir.path(), &blocks, &small_config()).unwrap();
        assert_eq!(output.term_count, 4);

        let primary = read_primary(dir.path());
        let terms: Vec<_> = primary.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["ant", "bee", "cat", "zoo"]);

        let cat: Vec<_> = primary[2].1.iter().map(|p| (p.doc_id, p.tf)).collect();
        // 2 + 2 + 1 occurrences, still tf descending.
        assert_eq!(cat, vec![(5, 7), (1, 5), (4, 3), (3, 2), (2, 1)]);

        // Staging files are gone once the output is renamed into place.
        assert!(!IndexFile::Primary.staging_path(dir.path()).exists());
    }

    #[test]
    fn test_secondary_offsets_point_at_primary_lines() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![
            write_block(dir.path(), 1, "a:1|1|B.1\nc:1|1|B.1\ne:1|1|B.1\n"),
            write_block(dir.path(), 2, "b:2|1|B.1\nd:2|1|B.1\n"),
        ];
        merge_blocks(dir.path(), &blocks, &small_config()).unwrap();

        let secondary = fs::read_to_string(IndexFile::Secondary.path(dir.path())).unwrap();
        let mut primary = fs::File::open(IndexFile::Primary.path(dir.path())).unwrap();
        for line in secondary.lines() {
            let (term, offset) = decode_offset_entry(line).unwrap();
            primary.seek(SeekFrom::Start(offset)).unwrap();
            let mut found = String::new();
            BufReader::new(&mut primary).read_line(&mut found).unwrap();
            assert_eq!(decode_line(&found).unwrap().0, term);
        }
    }

    #[test]
    fn test_tertiary_samples_every_gap_terms() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![write_block(
            dir.path(),
            1,
            "a:1|1|B.1\nb:1|1|B.1\nc:1|1|B.1\nd:1|1|B.1\ne:1|1|B.1\n",
        )];
        merge_blocks(dir.path(), &blocks, &small_config()).unwrap();

        let tertiary = fs::read_to_string(IndexFile::Tertiary.path(dir.path())).unwrap();
        let entries: Vec<_> = tertiary
            .lines()
            .map(|l| decode_offset_entry(l).unwrap())
            .map(|(t, o)| (t.to_string(), o))
            .collect();
        let terms: Vec<_> = entries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["a", "c", "e"]);

        let mut secondary = fs::File::open(IndexFile::Secondary.path(dir.path())).unwrap();
        for (term, offset) in &entries {
            secondary.seek(SeekFrom::Start(*offset)).unwrap();
            let mut buf = [0u8; 2];
            secondary.read_exact(&mut buf).unwrap();
            assert_eq!(buf[0] as char, term.chars().next().unwrap());
            assert_eq!(buf[1], b'=');
        }
    }

    #[test]
    fn test_merge_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![
            write_block(dir.path(), 1, "x:1|2|B.2;2|2|B.2\n"),
            write_block(dir.path(), 2, "x:3|2|B.2\n"),
        ];
        merge_blocks(dir.path(), &blocks, &small_config()).unwrap();
        let first = fs::read(IndexFile::Primary.path(dir.path())).unwrap();
        merge_blocks(dir.path(), &blocks, &small_config()).unwrap();
        let second = fs::read(IndexFile::Primary.path(dir.path())).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            String::from_utf8(first).unwrap(),
            "x:1|2|B.2;2|2|B.2;3|2|B.2\n"
        );
    }

    #[test]
    fn test_no_blocks_gives_empty_index() {
        let dir = TempDir::new().unwrap();
        let output = merge_blocks(dir.path(), &[], &MergeConfig::default()).unwrap();
        assert_eq!(output.term_count, 0);
        assert_eq!(output.primary.len, 0);
        assert!(IndexFile::Tertiary.path(dir.path()).exists());
    }

    #[test]
    fn test_failed_merge_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![write_block(dir.path(), 1, "a:1|1|B.1\nbroken line\n")];

        assert!(merge_blocks(dir.path(), &blocks, &small_config()).is_err());
        for file in [IndexFile::Primary, IndexFile::Secondary, IndexFile::Tertiary] {
            assert!(!file.path(dir.path()).exists());
            assert!(!file.staging_path(dir.path()).exists());
        }
    }
}
