use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, Digest, CRC_32_ISCSI};

use crate::error::{Error, Result};

pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Length and checksum of a finished index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSummary {
    pub len: u64,
    pub crc: u32,
}

/// Buffered append-only writer that tracks the byte offset of the next write
/// and a running CRC32 of everything written.
///
/// The offset is what the secondary and tertiary indexes point at, so it is
/// counted here rather than asked of the file.
pub struct OffsetWriter {
    name: &'static str,
    path: PathBuf,
    writer: BufWriter<File>,
    digest: Digest<'static, u32>,
    offset: u64,
}

impl fmt::Debug for OffsetWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffsetWriter")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("offset", &self.offset)
            .finish()
    }
}

impl OffsetWriter {
    /// Creates (truncating) the file at `path`. `name` is the logical file
    /// name used in errors.
    pub fn create(name: &'static str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| Error::WriteError(name, e))?;
        Ok(Self {
            name,
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            digest: CRC32.digest(),
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `data` and returns the offset it was written at.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        let at = self.offset;
        self.writer
            .write_all(data)
            .map_err(|e| Error::WriteError(self.name, e))?;
        self.digest.update(data);
        self.offset += data.len() as u64;
        Ok(at)
    }

    pub fn append_str(&mut self, data: &str) -> Result<u64> {
        self.append(data.as_bytes())
    }

    /// Flushes, syncs to disk and returns the file summary.
    pub fn finish(self) -> Result<FileSummary> {
        let name = self.name;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| Error::WriteError(name, e.into_error()))?;
        file.sync_all().map_err(|e| Error::WriteError(name, e))?;
        Ok(FileSummary {
            len: self.offset,
            crc: self.digest.finalize(),
        })
    }

    /// Finishes the file and renames it to `target`.
    pub fn persist(self, target: impl AsRef<Path>) -> Result<FileSummary> {
        let name = self.name;
        let from = self.path.clone();
        let summary = self.finish()?;
        fs::rename(&from, target.as_ref()).map_err(|e| Error::WriteError(name, e))?;
        Ok(summary)
    }
}

/// Streams a file through CRC32, returning its summary.
pub fn summarize(path: &Path) -> io::Result<FileSummary> {
    let mut file = io::BufReader::new(File::open(path)?);
    let mut digest = CRC32.digest();
    let mut len = 0u64;
    loop {
        let buf = io::BufRead::fill_buf(&mut file)?;
        if buf.is_empty() {
            break;
        }
        digest.update(buf);
        let n = buf.len();
        len += n as u64;
        io::BufRead::consume(&mut file, n);
    }
    Ok(FileSummary {
        len,
        crc: digest.finalize(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_offsets_track_writes() {
        let dir = TempDir::new().unwrap();
        let mut writer = OffsetWriter::create("primary", dir.path().join("p")).unwrap();
        assert_eq!(writer.append_str("cat:1|1|B.1\n").unwrap(), 0);
        assert_eq!(writer.append_str("dog:2|1|B.1\n").unwrap(), 12);
        assert_eq!(writer.append_str("").unwrap(), 24);
        let summary = writer.finish().unwrap();
        assert_eq!(summary.len, 24);
    }

    #[test]
    fn test_incremental_checksum_matches_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p");
        let mut writer = OffsetWriter::create("primary", &path).unwrap();
        writer.append(b"hello ").unwrap();
        writer.append(b"world").unwrap();
        let summary = writer.finish().unwrap();

        assert_eq!(summary.crc, CRC32.checksum(b"hello world"));
        assert_eq!(summarize(&path).unwrap(), summary);
    }

    #[test]
    fn test_persist_renames() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("primary.tmp");
        let target = dir.path().join("primary");
        let mut writer = OffsetWriter::create("primary", &staging).unwrap();
        writer.append_str("x\n").unwrap();
        writer.persist(&target).unwrap();

        assert!(!staging.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "x\n");
    }
}
