//! Commit record for an index directory.
//!
//! The index is six plain-text files written by different stages of a build.
//! None of them is queryable until the manifest exists: it is written last,
//! via a temp file and a rename, after every file it describes has been synced
//! and moved into place. A build removes the previous manifest before touching
//! anything, so a crashed build leaves a directory the reader refuses.
//!
//! # File Format
//!
//! ```text
//! +-------------+-------------+---------------+---------------+------------------+
//! | magic:u32   | version:u16 | doc_count:u64 | term_count:u64| tertiary_gap:u32 |
//! +-------------+-------------+---------------+---------------+------------------+
//! | 6 x (len:u64, crc32:u32) in IndexFile order                                  |
//! +------------------------------------------------------------------------------+
//! | crc32:u32 over all preceding bytes                                           |
//! +------------------------------------------------------------------------------+
//! ```
//!
//! All integers are big-endian.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::writer::{summarize, FileSummary, CRC32};

pub const MANIFEST_FILE: &str = "manifest";
const MAGIC: u32 = 0x5444_5831; // "TDX1"
const VERSION: u16 = 1;

/// The files making up a committed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFile {
    Primary,
    Secondary,
    Tertiary,
    Titles,
    TitleOffsets,
    TermCounts,
}

impl IndexFile {
    pub const ALL: [IndexFile; 6] = [
        IndexFile::Primary,
        IndexFile::Secondary,
        IndexFile::Tertiary,
        IndexFile::Titles,
        IndexFile::TitleOffsets,
        IndexFile::TermCounts,
    ];

    /// Logical name, which is also the file name inside the index directory.
    pub fn name(self) -> &'static str {
        match self {
            IndexFile::Primary => "primary",
            IndexFile::Secondary => "secondary",
            IndexFile::Tertiary => "tertiary",
            IndexFile::Titles => "docid-title-map",
            IndexFile::TitleOffsets => "docid-title-offset",
            IndexFile::TermCounts => "docid-termcount-map",
        }
    }

    pub fn path(self, dir: &Path) -> PathBuf {
        dir.join(self.name())
    }

    /// Staging path used while the file is being written.
    pub fn staging_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.tmp", self.name()))
    }

    /// Opens the file for reading, mapping absence to `MissingFile`.
    pub fn open(self, dir: &Path) -> Result<File> {
        let path = self.path(dir);
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingFile {
                name: self.name(),
                path,
            },
            _ => Error::ReadError(self.name(), e),
        })
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub doc_count: u64,
    pub term_count: u64,
    pub tertiary_gap: u32,
    files: [FileSummary; 6],
}

impl Manifest {
    pub fn new(doc_count: u64, term_count: u64, tertiary_gap: u32) -> Self {
        Self {
            doc_count,
            term_count,
            tertiary_gap,
            files: [FileSummary::default(); 6],
        }
    }

    pub fn set_file(&mut self, file: IndexFile, summary: FileSummary) {
        self.files[file.slot()] = summary;
    }

    pub fn file(&self, file: IndexFile) -> FileSummary {
        self.files[file.slot()]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 2 + 8 + 8 + 4 + 6 * 12 + 4);
        // Writes into a Vec cannot fail.
        buf.write_u32::<BigEndian>(MAGIC).unwrap();
        buf.write_u16::<BigEndian>(VERSION).unwrap();
        buf.write_u64::<BigEndian>(self.doc_count).unwrap();
        buf.write_u64::<BigEndian>(self.term_count).unwrap();
        buf.write_u32::<BigEndian>(self.tertiary_gap).unwrap();
        for summary in &self.files {
            buf.write_u64::<BigEndian>(summary.len).unwrap();
            buf.write_u32::<BigEndian>(summary.crc).unwrap();
        }
        let crc = CRC32.checksum(&buf);
        buf.write_u32::<BigEndian>(crc).unwrap();
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::IndexCorruption("manifest is truncated".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let stored = Cursor::new(trailer)
            .read_u32::<BigEndian>()
            .map_err(|e| Error::ReadError("manifest checksum", e))?;
        if CRC32.checksum(body) != stored {
            return Err(Error::IndexCorruption("manifest checksum mismatch".into()));
        }

        let mut cursor = Cursor::new(body);
        let magic = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| Error::ReadError("manifest magic", e))?;
        if magic != MAGIC {
            return Err(Error::IndexCorruption(format!(
                "bad manifest magic {magic:#x}"
            )));
        }
        let version = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| Error::ReadError("manifest version", e))?;
        if version != VERSION {
            return Err(Error::IndexCorruption(format!(
                "unsupported manifest version {version}"
            )));
        }

        let doc_count = cursor
            .read_u64::<BigEndian>()
            .map_err(|e| Error::ReadError("document count", e))?;
        let term_count = cursor
            .read_u64::<BigEndian>()
            .map_err(|e| Error::ReadError("term count", e))?;
        let tertiary_gap = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| Error::ReadError("tertiary gap", e))?;

        let mut manifest = Self::new(doc_count, term_count, tertiary_gap);
        for file in IndexFile::ALL {
            let len = cursor
                .read_u64::<BigEndian>()
                .map_err(|e| Error::ReadError("file length", e))?;
            let crc = cursor
                .read_u32::<BigEndian>()
                .map_err(|e| Error::ReadError("file checksum", e))?;
            manifest.set_file(file, FileSummary { len, crc });
        }
        Ok(manifest)
    }

    /// Atomically writes the manifest into `dir`.
    pub fn commit(&self, dir: &Path) -> Result<()> {
        let staging = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let mut file = File::create(&staging).map_err(|e| Error::WriteError("manifest", e))?;
        file.write_all(&self.encode())
            .map_err(|e| Error::WriteError("manifest", e))?;
        file.sync_all()
            .map_err(|e| Error::WriteError("manifest", e))?;
        fs::rename(&staging, dir.join(MANIFEST_FILE))
            .map_err(|e| Error::WriteError("manifest", e))?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingFile {
                name: MANIFEST_FILE,
                path: path.clone(),
            },
            _ => Error::ReadError(MANIFEST_FILE, e),
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| Error::ReadError(MANIFEST_FILE, e))?;
        Self::decode(&bytes)
    }

    /// Removes a previous commit so the directory is not queryable while a
    /// new build rewrites it.
    pub fn remove(dir: &Path) -> Result<()> {
        match fs::remove_file(dir.join(MANIFEST_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::WriteError(MANIFEST_FILE, e)),
        }
    }

    /// Checks that every file exists with the recorded length.
    pub fn check_files(&self, dir: &Path) -> Result<()> {
        for file in IndexFile::ALL {
            let path = file.path(dir);
            let len = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::MissingFile {
                        name: file.name(),
                        path,
                    })
                }
                Err(e) => return Err(Error::ReadError(file.name(), e)),
            };
            let expected = self.file(file).len;
            if len != expected {
                return Err(Error::IndexCorruption(format!(
                    "{} is {len} bytes, manifest records {expected}",
                    file.name()
                )));
            }
        }
        Ok(())
    }

    /// Recomputes every file checksum. Reads the whole index.
    pub fn verify_checksums(&self, dir: &Path) -> Result<()> {
        for file in IndexFile::ALL {
            let actual = summarize(&file.path(dir)).map_err(|e| Error::ReadError(file.name(), e))?;
            if actual != self.file(file) {
                return Err(Error::IndexCorruption(format!(
                    "{} checksum mismatch",
                    file.name()
                )));
            }
        }
        Ok(())
    }
}
