// src/dbpf/mod.rs

//! DBPF package container parsing
//!
//! Sims 4 content ships in DBPF containers: a fixed 96-byte header, an
//! index table of (type, group, instance) entries, and payload blobs.
//! This module decodes the header and the full index eagerly and stops
//! there. Payloads are treated as opaque byte ranges; their offsets are
//! validated against the file length but the bytes are never read, so
//! opening a package costs one header read plus one index read no matter
//! how large the payloads are.

mod header;
mod index;
pub mod types;

pub use header::{DbpfHeader, HEADER_SIZE, MAGIC, SUPPORTED_MAJOR};
pub use index::{
    COMPRESSION_NONE, COMPRESSION_REFPACK, COMPRESSION_REFPACK_ALT, COMPRESSION_ZLIB, IndexEntry,
};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

/// Decode failures for a single container. Wrapped with the offending
/// path at the scan layer.
#[derive(Debug, Error)]
pub enum DbpfError {
    #[error("file too short for a package header")]
    Truncated,

    #[error("invalid magic bytes {0:02X?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported package version {major}.{minor}, only 2.x is readable")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("entry {index} payload range {offset}..{end} exceeds file length {file_len}")]
    OutOfBounds {
        index: usize,
        offset: u64,
        end: u64,
        file_len: u64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An opened package: header fields plus the decoded index.
#[derive(Debug)]
pub struct Package {
    path: PathBuf,
    file_len: u64,
    header: DbpfHeader,
    entries: Vec<IndexEntry>,
}

impl Package {
    /// Open a package file and decode its header and index table.
    ///
    /// Every entry's payload range is checked against the file length up
    /// front, so a `Package` value always describes ranges that exist.
    pub fn open(path: &Path) -> Result<Self, DbpfError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let header = header::parse_header(&mut file)?;

        let index_start = header.index_position as u64;
        let index_end = index_start + header.index_size as u64;
        if index_end > file_len {
            return Err(DbpfError::CorruptIndex(format!(
                "index table {}..{} exceeds file length {}",
                index_start, index_end, file_len
            )));
        }

        file.seek(SeekFrom::Start(index_start))?;
        let mut table = vec![0u8; header.index_size as usize];
        file.read_exact(&mut table)?;
        let entries = index::parse_index(&table, header.entry_count)?;

        for (i, entry) in entries.iter().enumerate() {
            let offset = entry.offset as u64;
            let end = offset + entry.compressed_size as u64;
            if end > file_len {
                return Err(DbpfError::OutOfBounds {
                    index: i,
                    offset,
                    end,
                    file_len,
                });
            }
        }

        trace!(
            "Opened {} (v{}, {} entries)",
            path.display(),
            header.version(),
            entries.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file_len,
            header,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn header(&self) -> &DbpfHeader {
        &self.header
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }
}
