//! Document metadata: titles and term counts keyed by document id.
//!
//! Three files are written during the build, one line per document:
//!
//! ```text
//! docid-title-map       doc_id=title
//! docid-title-offset    doc_id=<offset of that line in docid-title-map>
//! docid-termcount-map   doc_id=term_count
//! ```
//!
//! At query time the offset and term-count files are loaded into memory and
//! titles are read on demand with a seek into the title file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::encoding::entry::{decode_doc_entry, decode_doc_number};
use crate::encoding::{encode_entry, DocId};
use crate::error::{Error, Result};
use crate::manifest::IndexFile;
use crate::writer::{FileSummary, OffsetWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub doc_id: DocId,
    pub title: String,
    pub term_count: u64,
    pub title_offset: u64,
}

/// Appends document records during a build. Files are staged and renamed
/// into place by `finish`.
#[derive(Debug)]
pub struct DocumentWriter {
    titles: OffsetWriter,
    offsets: OffsetWriter,
    counts: OffsetWriter,
    written: u64,
}

/// Summaries of the three metadata files, in `IndexFile` order.
pub type DocumentFiles = [(IndexFile, FileSummary); 3];

impl DocumentWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        let staged =
            |file: IndexFile| OffsetWriter::create(file.name(), file.staging_path(dir));
        Ok(Self {
            titles: staged(IndexFile::Titles)?,
            offsets: staged(IndexFile::TitleOffsets)?,
            counts: staged(IndexFile::TermCounts)?,
            written: 0,
        })
    }

    /// Records one document. Line breaks in the title are replaced by spaces.
    pub fn append(&mut self, doc_id: DocId, title: &str, term_count: u64) -> Result<DocumentRecord> {
        let title = sanitize_title(title);
        let title_offset = self.titles.append_str(&encode_entry(doc_id, &title))?;
        self.offsets
            .append_str(&encode_entry(doc_id, title_offset))?;
        self.counts.append_str(&encode_entry(doc_id, term_count))?;
        self.written += 1;
        Ok(DocumentRecord {
            doc_id,
            title,
            term_count,
            title_offset,
        })
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn finish(self, dir: &Path) -> Result<DocumentFiles> {
        Ok([
            (
                IndexFile::Titles,
                self.titles.persist(IndexFile::Titles.path(dir))?,
            ),
            (
                IndexFile::TitleOffsets,
                self.offsets.persist(IndexFile::TitleOffsets.path(dir))?,
            ),
            (
                IndexFile::TermCounts,
                self.counts.persist(IndexFile::TermCounts.path(dir))?,
            ),
        ])
    }
}

fn sanitize_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct DocEntry {
    title_offset: u64,
    term_count: u64,
}

/// Read-only document lookup used by the query engine.
pub struct DocumentStore {
    entries: HashMap<DocId, DocEntry>,
    titles: BufReader<File>,
    line: String,
}

impl DocumentStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut entries: HashMap<DocId, DocEntry> = HashMap::new();

        for_each_line(IndexFile::TitleOffsets, dir, |line_no, line| {
            let (doc_id, title_offset) = decode_doc_number(line, "title offset").map_err(|e| {
                Error::malformed(IndexFile::TitleOffsets.name(), line_no, e.to_string())
            })?;
            entries.insert(
                doc_id,
                DocEntry {
                    title_offset,
                    term_count: 0,
                },
            );
            Ok(())
        })?;

        for_each_line(IndexFile::TermCounts, dir, |line_no, line| {
            let (doc_id, term_count) = decode_doc_number(line, "term count").map_err(|e| {
                Error::malformed(IndexFile::TermCounts.name(), line_no, e.to_string())
            })?;
            match entries.get_mut(&doc_id) {
                Some(entry) => entry.term_count = term_count,
                None => {
                    return Err(Error::IndexCorruption(format!(
                        "document {doc_id} has a term count but no title"
                    )))
                }
            }
            Ok(())
        })?;

        let titles = BufReader::new(IndexFile::Titles.open(dir)?);
        tracing::debug!(documents = entries.len(), "Loaded document metadata");

        Ok(Self {
            entries,
            titles,
            line: String::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn term_count(&self, doc_id: DocId) -> Option<u64> {
        self.entries.get(&doc_id).map(|e| e.term_count)
    }

    /// Reads the title of `doc_id` from the title file.
    pub fn title(&mut self, doc_id: DocId) -> Result<Option<String>> {
        Ok(self.record(doc_id)?.map(|record| record.title))
    }

    pub fn record(&mut self, doc_id: DocId) -> Result<Option<DocumentRecord>> {
        let Some(entry) = self.entries.get(&doc_id).copied() else {
            return Ok(None);
        };
        self.titles
            .seek(SeekFrom::Start(entry.title_offset))
            .map_err(|e| Error::ReadError("docid-title-map", e))?;
        self.line.clear();
        self.titles
            .read_line(&mut self.line)
            .map_err(|e| Error::ReadError("docid-title-map", e))?;

        let (found, title) = decode_doc_entry(&self.line).map_err(|e| {
            Error::IndexCorruption(format!("title line for document {doc_id}: {e}"))
        })?;
        if found != doc_id {
            return Err(Error::IndexCorruption(format!(
                "title offset of document {doc_id} points at document {found}"
            )));
        }
        Ok(Some(DocumentRecord {
            doc_id,
            title: title.to_string(),
            term_count: entry.term_count,
            title_offset: entry.title_offset,
        }))
    }
}

fn for_each_line(
    file: IndexFile,
    dir: &Path,
    mut f: impl FnMut(usize, &str) -> Result<()>,
) -> Result<()> {
    let reader = BufReader::new(file.open(dir)?);
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::ReadError(file.name(), e))?;
        f(i + 1, &line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_docs(dir: &Path, docs: &[(DocId, &str, u64)]) -> DocumentFiles {
        let mut writer = DocumentWriter::create(dir).unwrap();
        for &(id, title, count) in docs {
            writer.append(id, title, count).unwrap();
        }
        assert_eq!(writer.len(), docs.len() as u64);
        writer.finish(dir).unwrap()
    }

    #[test]
    fn test_write_and_lookup() {
        let dir = TempDir::new().unwrap();
        write_docs(
            dir.path(),
            &[(12, "Cat", 3), (7, "E=mc2", 40), (30, "Multi\nline", 1)],
        );

        assert_eq!(
            fs::read_to_string(IndexFile::Titles.path(dir.path())).unwrap(),
            "12=Cat\n7=E=mc2\n30=Multi line\n"
        );
        assert_eq!(
            fs::read_to_string(IndexFile::TitleOffsets.path(dir.path())).unwrap(),
            "12=0\n7=7\n30=15\n"
        );

        let mut store = DocumentStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.term_count(7), Some(40));
        assert_eq!(store.title(7).unwrap().as_deref(), Some("E=mc2"));
        assert_eq!(store.title(30).unwrap().as_deref(), Some("Multi line"));
        assert_eq!(store.title(12).unwrap().as_deref(), Some("Cat"));
        assert_eq!(store.title(99).unwrap(), None);

        let record = store.record(30).unwrap().unwrap();
        assert_eq!(record.title_offset, 15);
        assert_eq!(record.term_count, 1);
    }

    #[test]
    fn test_missing_file_is_named() {
        let dir = TempDir::new().unwrap();
        write_docs(dir.path(), &[(1, "Cat", 1)]);
        fs::remove_file(IndexFile::TermCounts.path(dir.path())).unwrap();

        match DocumentStore::open(dir.path()) {
            Err(Error::MissingFile { name, .. }) => assert_eq!(name, "docid-termcount-map"),
            Err(other) => panic!("expected MissingFile, got {other:?}"),
            Ok(_) => panic!("expected MissingFile"),
        }
    }

    #[test]
    fn test_malformed_metadata_is_reported() {
        let dir = TempDir::new().unwrap();
        write_docs(dir.path(), &[(1, "Cat", 1)]);
        fs::write(IndexFile::TermCounts.path(dir.path()), "1=many\n").unwrap();

        assert!(matches!(
            DocumentStore::open(dir.path()),
            Err(Error::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_wrong_offset_is_corruption() {
        let dir = TempDir::new().unwrap();
        write_docs(dir.path(), &[(1, "Cat", 1), (2, "Dog", 1)]);
        fs::write(IndexFile::TitleOffsets.path(dir.path()), "1=6\n2=0\n").unwrap();

        let mut store = DocumentStore::open(dir.path()).unwrap();
        assert!(matches!(store.title(1), Err(Error::IndexCorruption(_))));
    }
}
