use std::path::PathBuf;

/// Configuration for building an index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Index directory, created if absent
    pub dir: PathBuf,

    /// Estimated in-memory size at which a block is flushed (default: 10MB)
    pub max_block_bytes: usize,

    /// Posting count at which a block is flushed regardless of size (default: 1M)
    pub max_block_postings: usize,

    /// Merge configuration
    pub merge: MergeConfig,

    /// Cap on the process resident set in bytes. `None` disables the guard.
    pub memory_limit: Option<u64>,

    /// How many documents are ingested between memory checks (default: 1000)
    pub memory_check_interval: usize,

    /// Keep the temp blocks after a successful merge (default: false)
    pub keep_temp_blocks: bool,
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Lines read ahead from each temp block (default: 10_000)
    pub read_buffer: usize,

    /// Merged terms held before they are written out (default: 100_000)
    pub write_buffer: usize,

    /// One tertiary entry is written per this many secondary entries (default: 100)
    pub tertiary_gap: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            read_buffer: 10_000,
            write_buffer: 100_000,
            tertiary_gap: 100,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./indexes"),
            max_block_bytes: 10 * 1024 * 1024, // 10MB
            max_block_postings: 1_000_000,
            merge: MergeConfig::default(),
            memory_limit: None,
            memory_check_interval: 1000,
            keep_temp_blocks: false,
        }
    }
}

impl IndexConfig {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn max_block_bytes(mut self, size: usize) -> Self {
        self.max_block_bytes = size;
        self
    }

    pub fn max_block_postings(mut self, count: usize) -> Self {
        self.max_block_postings = count;
        self
    }

    pub fn merge(mut self, config: MergeConfig) -> Self {
        self.merge = config;
        self
    }

    pub fn memory_limit(mut self, limit: Option<u64>) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn memory_check_interval(mut self, docs: usize) -> Self {
        self.memory_check_interval = docs.max(1);
        self
    }

    pub fn keep_temp_blocks(mut self, keep: bool) -> Self {
        self.keep_temp_blocks = keep;
        self
    }
}

impl MergeConfig {
    pub fn read_buffer(mut self, lines: usize) -> Self {
        self.read_buffer = lines.max(1);
        self
    }

    pub fn write_buffer(mut self, terms: usize) -> Self {
        self.write_buffer = terms.max(1);
        self
    }

    pub fn tertiary_gap(mut self, gap: usize) -> Self {
        self.tertiary_gap = gap.max(1);
        self
    }
}

/// Which `IndexReader` implementation resolves terms at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderStrategy {
    /// Sparse tertiary index in memory, bounded scan of the secondary file.
    #[default]
    Tiered,
    /// Whole secondary index in memory.
    Dense,
}

/// Configuration for a query session.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub dir: PathBuf,

    pub strategy: ReaderStrategy,

    /// Results returned per query (default: 10)
    pub top_k: usize,

    /// Postings kept per term after zone-weighted truncation (default: 20_000)
    pub max_postings: usize,

    /// Check file checksums against the manifest on open (default: false)
    pub verify_checksums: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./indexes"),
            strategy: ReaderStrategy::Tiered,
            top_k: 10,
            max_postings: 20_000,
            verify_checksums: false,
        }
    }
}

impl QueryConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn strategy(mut self, strategy: ReaderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn max_postings(mut self, max: usize) -> Self {
        self.max_postings = max.max(1);
        self
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.dir, PathBuf::from("./indexes"));
        assert_eq!(config.max_block_bytes, 10 * 1024 * 1024);
        assert!(config.memory_limit.is_none());
        assert!(!config.keep_temp_blocks);

        assert_eq!(config.merge.read_buffer, 10_000);
        assert_eq!(config.merge.write_buffer, 100_000);
        assert_eq!(config.merge.tertiary_gap, 100);

        let query = QueryConfig::default();
        assert_eq!(query.top_k, 10);
        assert_eq!(query.strategy, ReaderStrategy::Tiered);
    }

    #[test]
    fn test_config_builder() {
        let config = IndexConfig::new("/tmp/test")
            .max_block_bytes(4096)
            .max_block_postings(10)
            .memory_limit(Some(1 << 30))
            .memory_check_interval(0)
            .keep_temp_blocks(true)
            .merge(
                MergeConfig::default()
                    .read_buffer(2)
                    .write_buffer(3)
                    .tertiary_gap(0),
            );

        assert_eq!(config.dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.max_block_bytes, 4096);
        assert_eq!(config.max_block_postings, 10);
        assert_eq!(config.memory_limit, Some(1 << 30));
        assert_eq!(config.memory_check_interval, 1);
        assert!(config.keep_temp_blocks);

        assert_eq!(config.merge.read_buffer, 2);
        assert_eq!(config.merge.write_buffer, 3);
        // A zero gap would never sample the secondary index.
        assert_eq!(config.merge.tertiary_gap, 1);
    }
}
