// src/dbpf/header.rs

//! Fixed 96-byte package header
//!
//! All fields are little-endian u32s at fixed offsets. Only the handful
//! of fields the index reader needs are decoded; the rest of the header
//! (timestamps, hole table bookkeeping) is skipped.

use super::DbpfError;
use std::io::Read;

/// Magic bytes at offset 0.
pub const MAGIC: &[u8; 4] = b"DBPF";

/// Total header size in bytes. Files shorter than this are rejected
/// before any field is decoded.
pub const HEADER_SIZE: usize = 96;

/// Supported major format version.
pub const SUPPORTED_MAJOR: u32 = 2;

// Field offsets within the header.
const OFFSET_MAJOR: usize = 4;
const OFFSET_MINOR: usize = 8;
const OFFSET_ENTRY_COUNT: usize = 36;
const OFFSET_INDEX_SIZE: usize = 44;
const OFFSET_INDEX_POSITION: usize = 64;

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbpfHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub entry_count: u32,
    pub index_size: u32,
    pub index_position: u32,
}

impl DbpfHeader {
    pub fn version(&self) -> String {
        format!("{}.{}", self.major_version, self.minor_version)
    }
}

fn field_u32(buf: &[u8; HEADER_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Read and validate a header from the start of `reader`.
///
/// Checks, in order: enough bytes for a full header, the magic, then the
/// major version. A wrong magic is reported before an unsupported
/// version so that non-package files are never called "unsupported".
pub fn parse_header<R: Read>(reader: &mut R) -> Result<DbpfHeader, DbpfError> {
    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DbpfError::Truncated
        } else {
            DbpfError::Io(err)
        }
    })?;

    if &buf[0..4] != MAGIC {
        return Err(DbpfError::InvalidMagic([buf[0], buf[1], buf[2], buf[3]]));
    }

    let major_version = field_u32(&buf, OFFSET_MAJOR);
    let minor_version = field_u32(&buf, OFFSET_MINOR);
    if major_version != SUPPORTED_MAJOR {
        return Err(DbpfError::UnsupportedVersion {
            major: major_version,
            minor: minor_version,
        });
    }

    Ok(DbpfHeader {
        major_version,
        minor_version,
        entry_count: field_u32(&buf, OFFSET_ENTRY_COUNT),
        index_size: field_u32(&buf, OFFSET_INDEX_SIZE),
        index_position: field_u32(&buf, OFFSET_INDEX_POSITION),
    })
}
