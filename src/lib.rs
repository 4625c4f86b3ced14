pub mod analyzer;
pub mod builder;
pub mod config;
pub mod corpus;
pub mod docs;
pub mod encoding;
pub mod error;
pub mod flock;
pub mod index;
pub mod manifest;
pub mod memory;
pub mod producer;
pub mod query;
pub mod spimi;
pub mod writer;

pub use analyzer::Analyzer;
pub use builder::{build_index, BuildSummary, IndexerContext};
pub use config::{IndexConfig, MergeConfig, QueryConfig, ReaderStrategy};
pub use error::{Error, Result};
pub use producer::{DocumentTerms, RawDocument, TokenProducer};
pub use query::{QueryContext, SearchHit};
