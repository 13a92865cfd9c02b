// src/dbpf/index.rs

//! Resource index table decoding
//!
//! The index starts with a flags word. Each of the low four bits marks
//! one identity field (type, group, instance-high, instance-low) as
//! constant for the whole table; a constant field's value is stored once
//! after the flags and omitted from every entry. Remaining per-entry
//! fields are the non-constant identity parts followed by offset, sizes,
//! and the compression tag. All integers are little-endian.

use super::DbpfError;
use crate::tgi::Tgi;

/// Payload stored as-is.
pub const COMPRESSION_NONE: u16 = 0x0000;
/// Deflate-compressed payload.
pub const COMPRESSION_ZLIB: u16 = 0x5A42;
/// RefPack-compressed payload.
pub const COMPRESSION_REFPACK: u16 = 0xFFFF;
/// RefPack variant used by newer game builds.
pub const COMPRESSION_REFPACK_ALT: u16 = 0xFFFE;

const FLAG_CONST_TYPE: u32 = 0b0001;
const FLAG_CONST_GROUP: u32 = 0b0010;
const FLAG_CONST_INSTANCE_HI: u32 = 0b0100;
const FLAG_CONST_INSTANCE_LO: u32 = 0b1000;

/// The high bit of the stored size is a flag, not part of the length.
const SIZE_MASK: u32 = 0x7FFF_FFFF;

/// One decoded index entry. Identity plus the byte range and compression
/// tag of the payload; the payload itself is never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub tgi: Tgi,
    /// Payload offset from the start of the file.
    pub offset: u32,
    /// Stored payload length in bytes.
    pub compressed_size: u32,
    /// Payload length after decompression.
    pub uncompressed_size: u32,
    /// Compression tag, one of the `COMPRESSION_*` constants.
    pub compression: u16,
}

impl IndexEntry {
    pub fn is_compressed(&self) -> bool {
        self.compression != COMPRESSION_NONE
    }

    /// Human-readable compression tag for diagnostics.
    pub fn compression_name(&self) -> &'static str {
        match self.compression {
            COMPRESSION_NONE => "none",
            COMPRESSION_ZLIB => "zlib",
            COMPRESSION_REFPACK => "refpack",
            COMPRESSION_REFPACK_ALT => "refpack-alt",
            _ => "unknown",
        }
    }
}

fn take_u32(buf: &[u8], pos: &mut usize) -> Result<u32, DbpfError> {
    let end = *pos + 4;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| DbpfError::CorruptIndex("unexpected end of index table".to_string()))?;
    *pos = end;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take_u16(buf: &[u8], pos: &mut usize) -> Result<u16, DbpfError> {
    let end = *pos + 2;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| DbpfError::CorruptIndex("unexpected end of index table".to_string()))?;
    *pos = end;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Decode `entry_count` entries from the raw index table bytes.
///
/// A count of zero is a valid, empty package. Tables that end before the
/// promised count is reached are corrupt; the flags word is only present
/// when at least one entry is.
pub fn parse_index(buf: &[u8], entry_count: u32) -> Result<Vec<IndexEntry>, DbpfError> {
    let mut entries = Vec::with_capacity(entry_count as usize);
    if entry_count == 0 {
        return Ok(entries);
    }

    let mut pos = 0usize;
    let flags = take_u32(buf, &mut pos)?;

    // Constant fields appear once, in field order, directly after the flags.
    let const_type = if flags & FLAG_CONST_TYPE != 0 {
        Some(take_u32(buf, &mut pos)?)
    } else {
        None
    };
    let const_group = if flags & FLAG_CONST_GROUP != 0 {
        Some(take_u32(buf, &mut pos)?)
    } else {
        None
    };
    let const_instance_hi = if flags & FLAG_CONST_INSTANCE_HI != 0 {
        Some(take_u32(buf, &mut pos)?)
    } else {
        None
    };
    let const_instance_lo = if flags & FLAG_CONST_INSTANCE_LO != 0 {
        Some(take_u32(buf, &mut pos)?)
    } else {
        None
    };

    for _ in 0..entry_count {
        let type_id = match const_type {
            Some(value) => value,
            None => take_u32(buf, &mut pos)?,
        };
        let group_id = match const_group {
            Some(value) => value,
            None => take_u32(buf, &mut pos)?,
        };
        let instance_hi = match const_instance_hi {
            Some(value) => value,
            None => take_u32(buf, &mut pos)?,
        };
        let instance_lo = match const_instance_lo {
            Some(value) => value,
            None => take_u32(buf, &mut pos)?,
        };

        let offset = take_u32(buf, &mut pos)?;
        let compressed_size = take_u32(buf, &mut pos)? & SIZE_MASK;
        let uncompressed_size = take_u32(buf, &mut pos)?;
        let compression = take_u16(buf, &mut pos)?;
        let _committed = take_u16(buf, &mut pos)?;

        let instance_id = ((instance_hi as u64) << 32) | instance_lo as u64;
        entries.push(IndexEntry {
            tgi: Tgi::new(type_id, group_id, instance_id),
            offset,
            compressed_size,
            uncompressed_size,
            compression,
        });
    }

    Ok(entries)
}
