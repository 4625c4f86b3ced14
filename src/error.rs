use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read {0}: {1}")]
    ReadError(&'static str, io::Error),

    #[error("Failed to write {0}: {1}")]
    WriteError(&'static str, io::Error),

    /// A line violates the delimiter grammar of the index files.
    #[error("Malformed record in {source_name} at line {line}: {reason}")]
    MalformedRecord {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// A required index file is absent. `name` is the logical file name.
    #[error("Missing index file '{name}' at {}", path.display())]
    MissingFile { name: &'static str, path: PathBuf },

    #[error("Memory limit exceeded: {used} bytes in use, limit is {limit} bytes")]
    ResourceExhausted { used: u64, limit: u64 },

    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    #[error("Lock error: {0}")]
    LockError(io::Error),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    pub(crate) fn malformed(
        source_name: impl Into<String>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Error::MalformedRecord {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Process exit status used by the binaries for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ResourceExhausted { .. } => 3,
            Error::MissingFile { .. } => 4,
            Error::MalformedRecord { .. } | Error::IndexCorruption(_) => 5,
            _ => 1,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Corpus(err.to_string())
    }
}
