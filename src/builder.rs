//! The build pipeline: documents in, committed index out.
//!
//! ```text
//! RawDocument ─► TokenProducer ─► BlockBuilder ─► temp blocks ─┐
//!      └──────────────────────► DocumentWriter ───────────────┤
//!                                                  merge_blocks + commit
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::analyzer::Analyzer;
use crate::config::IndexConfig;
use crate::docs::DocumentWriter;
use crate::encoding::DocId;
use crate::error::{Error, Result};
use crate::flock::DirLock;
use crate::manifest::{IndexFile, Manifest, MANIFEST_FILE};
use crate::memory::MemoryGuard;
use crate::producer::{DocumentTerms, RawDocument, TokenProducer};
use crate::spimi::{merge_blocks, BlockBuilder, TEMP_BLOCK_PREFIX};

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: u64,
    pub terms: u64,
    pub blocks: usize,
    pub elapsed: Duration,
}

/// Owns an index directory for the duration of one build.
pub struct IndexerContext<P: TokenProducer = Analyzer> {
    config: IndexConfig,
    producer: P,
    blocks: BlockBuilder,
    docs: DocumentWriter,
    seen: HashSet<DocId>,
    memory: Option<MemoryGuard>,
    started: Instant,
    _lock: DirLock,
}

impl IndexerContext<Analyzer> {
    /// Starts a build with the default analyzer.
    pub fn create(config: IndexConfig) -> Result<Self> {
        Self::with_producer(config, Analyzer::new()?)
    }
}

impl<P: TokenProducer> IndexerContext<P> {
    /// Creates the index directory if needed, locks it, and discards the
    /// previous index's manifest along with any leftovers of a crashed build.
    pub fn with_producer(config: IndexConfig, producer: P) -> Result<Self> {
        let dir = config.dir.clone();
        fs::create_dir_all(&dir).map_err(|e| Error::WriteError("index directory", e))?;

        let lock = DirLock::acquire(&dir).map_err(Error::LockError)?;
        Manifest::remove(&dir)?;
        remove_stale_files(&dir)?;

        let memory = config.memory_limit.map(MemoryGuard::new);
        if let Some(guard) = &memory {
            tracing::info!(limit = guard.limit(), "Memory guard enabled");
        }

        let blocks = BlockBuilder::new(&dir, config.max_block_bytes, config.max_block_postings);
        let docs = DocumentWriter::create(&dir)?;

        tracing::info!(dir = %dir.display(), "Started index build");
        Ok(Self {
            config,
            producer,
            blocks,
            docs,
            seen: HashSet::new(),
            memory,
            started: Instant::now(),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Documents indexed so far.
    pub fn documents(&self) -> u64 {
        self.docs.len()
    }

    /// Analyzes and indexes one document.
    pub fn add_document(&mut self, doc: &RawDocument) -> Result<()> {
        let terms = self.producer.produce(doc);
        self.add_terms(doc.id, &doc.title, &terms)
    }

    /// Indexes a document whose terms were produced elsewhere. A repeated
    /// document id is skipped.
    pub fn add_terms(&mut self, doc_id: DocId, title: &str, terms: &DocumentTerms) -> Result<()> {
        if !self.seen.insert(doc_id) {
            tracing::warn!(doc_id = doc_id, title = title, "Skipping duplicate document id");
            return Ok(());
        }

        self.blocks.ingest(doc_id, terms)?;
        self.docs.append(doc_id, title, terms.term_count)?;

        let documents = self.docs.len();
        if documents % self.config.memory_check_interval.max(1) as u64 == 0 {
            if let Some(guard) = &self.memory {
                guard.check()?;
            }
            tracing::debug!(
                documents = documents,
                blocks = self.blocks.blocks().len(),
                block_bytes = self.blocks.size(),
                "Indexing progress"
            );
        }
        Ok(())
    }

    /// Flushes the last block, merges all blocks, and commits the index.
    pub fn finish(self) -> Result<BuildSummary> {
        let dir = self.config.dir.clone();
        let blocks = self.blocks.finish()?;
        tracing::info!(
            documents = self.docs.len(),
            blocks = blocks.len(),
            "Indexed all documents"
        );

        let merged = merge_blocks(&dir, &blocks, &self.config.merge)?;
        let documents = self.docs.len();
        let doc_files = self.docs.finish(&dir)?;

        let mut manifest = Manifest::new(
            documents,
            merged.term_count,
            self.config.merge.tertiary_gap.max(1) as u32,
        );
        manifest.set_file(IndexFile::Primary, merged.primary);
        manifest.set_file(IndexFile::Secondary, merged.secondary);
        manifest.set_file(IndexFile::Tertiary, merged.tertiary);
        for (file, summary) in doc_files {
            manifest.set_file(file, summary);
        }
        manifest.commit(&dir)?;

        if !self.config.keep_temp_blocks {
            for block in &blocks {
                if let Err(e) = fs::remove_file(block) {
                    tracing::warn!(block = %block.display(), error = %e, "Failed to remove temp block");
                }
            }
        }

        let summary = BuildSummary {
            documents,
            terms: merged.term_count,
            blocks: blocks.len(),
            elapsed: self.started.elapsed(),
        };
        tracing::info!(
            documents = summary.documents,
            terms = summary.terms,
            blocks = summary.blocks,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Committed index"
        );
        Ok(summary)
    }
}

/// Builds an index in `config.dir` from `docs` with `producer`.
pub fn build_index<P, I>(config: IndexConfig, producer: P, docs: I) -> Result<BuildSummary>
where
    P: TokenProducer,
    I: IntoIterator<Item = Result<RawDocument>>,
{
    let mut context = IndexerContext::with_producer(config, producer)?;
    for doc in docs {
        context.add_document(&doc?)?;
    }
    context.finish()
}

/// Removes temp blocks and staging files left behind by an interrupted build.
fn remove_stale_files(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| Error::ReadError("index directory", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::ReadError("index directory", e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_stale(name) {
            tracing::debug!(file = name, "Removing stale build file");
            fs::remove_file(entry.path()).map_err(|e| Error::WriteError("stale build file", e))?;
        }
    }
    Ok(())
}

fn is_stale(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix(TEMP_BLOCK_PREFIX) {
        let number = rest.strip_suffix(".partial").unwrap_or(rest);
        return !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
    }
    match name.strip_suffix(".tmp") {
        Some(base) => {
            base == MANIFEST_FILE || IndexFile::ALL.iter().any(|file| file.name() == base)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Zone;
    use crate::spimi::block_path;
    use tempfile::TempDir;

    fn terms(words: &[&str]) -> DocumentTerms {
        let mut terms = DocumentTerms::new();
        for word in words {
            terms.add(word, Zone::Body);
        }
        terms
    }

    #[test]
    fn test_is_stale() {
        assert!(is_stale("temp-1"));
        assert!(is_stale("temp-12.partial"));
        assert!(is_stale("primary.tmp"));
        assert!(is_stale("docid-title-map.tmp"));
        assert!(is_stale("manifest.tmp"));
        assert!(!is_stale("temp-"));
        assert!(!is_stale("temp-notes"));
        assert!(!is_stale("primary"));
        assert!(!is_stale("notes.tmp"));
    }

    #[test]
    fn test_build_commits_manifest() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).max_block_postings(2);
        let mut context = IndexerContext::create(config).unwrap();

        context.add_terms(1, "One", &terms(&["cat", "dog"])).unwrap();
        context.add_terms(2, "Two", &terms(&["dog"])).unwrap();
        context.add_terms(2, "Two again", &terms(&["bird"])).unwrap();
        assert_eq!(context.documents(), 2);

        let summary = context.finish().unwrap();
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.terms, 2);
        assert_eq!(summary.blocks, 2);

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.doc_count, 2);
        assert_eq!(manifest.term_count, 2);
        manifest.check_files(dir.path()).unwrap();
        manifest.verify_checksums(dir.path()).unwrap();

        assert!(!block_path(dir.path(), 1).exists());
        assert!(!IndexFile::Primary.staging_path(dir.path()).exists());
    }

    #[test]
    fn test_keep_temp_blocks() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).keep_temp_blocks(true);
        let mut context = IndexerContext::create(config).unwrap();
        context.add_terms(1, "One", &terms(&["cat"])).unwrap();
        context.finish().unwrap();

        assert!(block_path(dir.path(), 1).exists());
    }

    #[test]
    fn test_rebuild_removes_old_manifest_and_leftovers() {
        let dir = TempDir::new().unwrap();
        let mut context = IndexerContext::create(IndexConfig::new(dir.path())).unwrap();
        context.add_terms(1, "One", &terms(&["cat"])).unwrap();
        context.finish().unwrap();
        fs::write(block_path(dir.path(), 7), "stale:1|1|B.1\n").unwrap();

        let context = IndexerContext::create(IndexConfig::new(dir.path())).unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(Error::MissingFile { name: MANIFEST_FILE, .. })
        ));
        assert!(!block_path(dir.path(), 7).exists());
        drop(context);
    }

    #[test]
    fn test_second_builder_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let _first = IndexerContext::create(IndexConfig::new(dir.path())).unwrap();
        assert!(matches!(
            IndexerContext::create(IndexConfig::new(dir.path())),
            Err(Error::LockError(_))
        ));
    }

    #[test]
    fn test_memory_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path())
            .memory_limit(Some(1))
            .memory_check_interval(1);
        let mut context = IndexerContext::create(config).unwrap();

        let result = context.add_terms(1, "One", &terms(&["cat"]));
        if cfg!(target_os = "linux") {
            assert!(matches!(result, Err(Error::ResourceExhausted { .. })));
        }
    }

    #[test]
    fn test_build_index_propagates_corpus_errors() {
        let dir = TempDir::new().unwrap();
        let docs = vec![
            Ok(RawDocument::new(1, "Cat", "cat")),
            Err(Error::Corpus("truncated dump".to_string())),
        ];
        let result = build_index(IndexConfig::new(dir.path()), Analyzer::new().unwrap(), docs);
        assert!(matches!(result, Err(Error::Corpus(_))));
        assert!(Manifest::load(dir.path()).is_err());
    }
}
