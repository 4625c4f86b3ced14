use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use itertools::Itertools as _;

use super::scoring::{idf, normalized_tf, one_word_score, ScoreBoard};
use super::{classify, parse_field_query, QueryKind};
use crate::analyzer::Analyzer;
use crate::config::QueryConfig;
use crate::docs::DocumentStore;
use crate::encoding::{DocId, Zone};
use crate::error::{Error, Result};
use crate::index::PostingsReader;
use crate::manifest::Manifest;
use crate::producer::TokenProducer;

/// A ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
}

/// A query session over one committed index directory.
///
/// Every session owns its file handles; open one per thread.
pub struct QueryContext<P: TokenProducer = Analyzer> {
    config: QueryConfig,
    manifest: Manifest,
    postings: PostingsReader,
    docs: DocumentStore,
    producer: P,
}

impl QueryContext<Analyzer> {
    pub fn open(config: QueryConfig) -> Result<Self> {
        Self::with_producer(config, Analyzer::new()?)
    }
}

impl<P: TokenProducer> QueryContext<P> {
    /// Opens the index with a custom term normalizer. It must match the one
    /// the index was built with.
    pub fn with_producer(config: QueryConfig, producer: P) -> Result<Self> {
        let dir = config.dir.as_path();
        let manifest = Manifest::load(dir)?;
        manifest.check_files(dir)?;
        if config.verify_checksums {
            manifest.verify_checksums(dir)?;
            tracing::info!("Index checksums verified");
        }

        let postings = PostingsReader::open(
            dir,
            config.strategy,
            manifest.tertiary_gap as usize,
            config.max_postings,
        )?;
        let docs = DocumentStore::open(dir)?;
        if docs.len() as u64 != manifest.doc_count {
            return Err(Error::IndexCorruption(format!(
                "manifest records {} documents, metadata holds {}",
                manifest.doc_count,
                docs.len()
            )));
        }

        tracing::info!(
            dir = %dir.display(),
            documents = manifest.doc_count,
            terms = manifest.term_count,
            reader = postings.strategy_name(),
            "Opened index"
        );
        Ok(Self {
            config,
            manifest,
            postings,
            docs,
            producer,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn search(&mut self, query: &str) -> Result<Vec<SearchHit>> {
        let board = match classify(query) {
            QueryKind::OneWord => {
                let terms = self.producer.normalize(query);
                match terms.as_slice() {
                    [] => ScoreBoard::new(),
                    [term] => self.one_word(term)?,
                    _ => self.free_text(terms)?,
                }
            }
            QueryKind::FreeText => {
                let terms = self.producer.normalize(query);
                self.free_text(terms)?
            }
            QueryKind::Field => self.field(query)?,
        };

        let mut hits = Vec::new();
        for (doc_id, score) in board.top_k(self.config.top_k) {
            let Some(title) = self.docs.title(doc_id)? else {
                continue;
            };
            hits.push(SearchHit {
                doc_id,
                score,
                title,
            });
        }
        Ok(hits)
    }

    fn term_count(&self, doc_id: DocId) -> Option<u64> {
        let count = self.docs.term_count(doc_id);
        if count.is_none() {
            tracing::warn!(doc_id = doc_id, "Skipping posting without document metadata");
        }
        count
    }

    fn one_word(&mut self, term: &str) -> Result<ScoreBoard> {
        let mut board = ScoreBoard::new();
        let list = self.postings.fetch_postings(term, None)?;
        let Some(idf) = idf(self.manifest.doc_count, list.document_frequency) else {
            return Ok(board);
        };
        for posting in &list.postings {
            if let Some(count) = self.term_count(posting.doc_id) {
                board.add(posting.doc_id, one_word_score(posting.tf, idf, count));
            }
        }
        Ok(board)
    }

    fn free_text(&mut self, terms: Vec<String>) -> Result<ScoreBoard> {
        let scoped = terms.into_iter().unique().map(|term| (None, term)).collect();
        self.score_terms(scoped)
    }

    fn field(&mut self, query: &str) -> Result<ScoreBoard> {
        let mut scoped = Vec::new();
        for segment in parse_field_query(query) {
            for term in self.producer.normalize(&segment.text) {
                scoped.push((segment.zone, term));
            }
        }
        let scoped = scoped.into_iter().unique().collect();
        self.score_terms(scoped)
    }

    /// Sums `normalized_tf * idf * w_q` over the query terms, where `w_q`
    /// weighs every term equally. A zone-scoped term counts its occurrences in
    /// that zone only.
    fn score_terms(&mut self, terms: Vec<(Option<Zone>, String)>) -> Result<ScoreBoard> {
        let mut board = ScoreBoard::new();
        if terms.is_empty() {
            return Ok(board);
        }
        let query_weight = 1.0 / terms.len() as f64;

        for (zone, term) in &terms {
            let list = self.postings.fetch_postings(term, *zone)?;
            let Some(idf) = idf(self.manifest.doc_count, list.document_frequency) else {
                tracing::debug!(term = term.as_str(), "Term not in index");
                continue;
            };
            for posting in &list.postings {
                let Some(count) = self.term_count(posting.doc_id) else {
                    continue;
                };
                let tf = match zone {
                    Some(zone) => posting.zones.get(*zone),
                    None => posting.tf,
                };
                board.add(
                    posting.doc_id,
                    normalized_tf(tf, count) * idf * query_weight,
                );
            }
        }
        Ok(board)
    }

    /// Answers every line of `query_path`, writing the result titles of each
    /// query to `output_path` followed by a blank line. Returns the number of
    /// queries answered.
    pub fn run_file(&mut self, query_path: &Path, output_path: &Path) -> Result<usize> {
        let queries = File::open(query_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingFile {
                name: "query file",
                path: query_path.to_path_buf(),
            },
            _ => Error::ReadError("query file", e),
        })?;
        let output = File::create(output_path).map_err(|e| Error::WriteError("output file", e))?;
        let mut output = BufWriter::new(output);

        let mut answered = 0;
        for line in BufReader::new(queries).lines() {
            let query = line.map_err(|e| Error::ReadError("query file", e))?;
            let start = Instant::now();
            let hits = self.search_logged(&query)?;
            for hit in &hits {
                writeln!(output, "{}", hit.title).map_err(|e| Error::WriteError("output file", e))?;
            }
            writeln!(output).map_err(|e| Error::WriteError("output file", e))?;
            tracing::info!(
                query = query.trim(),
                results = hits.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Answered query"
            );
            answered += 1;
        }
        output
            .flush()
            .map_err(|e| Error::WriteError("output file", e))?;
        Ok(answered)
    }

    /// Reads queries from `input` until EOF or `:q`, printing ranked titles
    /// and timing to `output`.
    pub fn run_interactive(&mut self, mut input: impl BufRead, mut output: impl Write) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(output, "> ").map_err(|e| Error::WriteError("stdout", e))?;
            output.flush().map_err(|e| Error::WriteError("stdout", e))?;

            line.clear();
            if input
                .read_line(&mut line)
                .map_err(|e| Error::ReadError("stdin", e))?
                == 0
            {
                break;
            }
            let query = line.trim();
            if query == ":q" {
                break;
            }
            if query.is_empty() {
                continue;
            }

            let start = Instant::now();
            let hits = self.search_logged(query)?;
            for (rank, hit) in hits.iter().enumerate() {
                writeln!(output, "{:>2}. {}", rank + 1, hit.title)
                    .map_err(|e| Error::WriteError("stdout", e))?;
            }
            writeln!(
                output,
                "({} results in {:.3}s)",
                hits.len(),
                start.elapsed().as_secs_f64()
            )
            .map_err(|e| Error::WriteError("stdout", e))?;
        }
        Ok(())
    }

    /// Runs one query inside a session. Failures of a single query are
    /// logged and yield no results; I/O failures end the session.
    fn search_logged(&mut self, query: &str) -> Result<Vec<SearchHit>> {
        match self.search(query) {
            Ok(hits) => Ok(hits),
            Err(e @ (Error::ReadError(..) | Error::Io(_))) => Err(e),
            Err(e) => {
                tracing::error!(query = query.trim(), error = %e, "Query failed");
                Ok(Vec::new())
            }
        }
    }
}
