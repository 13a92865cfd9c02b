// src/db/models.rs

//! Data models for simdex database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting
//! records. Instance ids cross the SQL boundary as bit-preserving i64
//! casts, see [`crate::tgi::Tgi::to_sql`].

use crate::error::Result;
use crate::tgi::Tgi;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which side of the index a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Content shipped with the game install
    Base,
    /// Content added by the user (Mods folder)
    User,
}

impl Partition {
    pub fn as_str(&self) -> &str {
        match self {
            Partition::Base => "base",
            Partition::User => "user",
        }
    }

    /// Resource table backing this partition
    pub fn table(&self) -> &'static str {
        match self {
            Partition::Base => "base_resources",
            Partition::User => "user_resources",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "base" => Ok(Partition::Base),
            "user" => Ok(Partition::User),
            _ => Err(format!("Invalid partition: {}", s)),
        }
    }
}

/// One resource identity with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub tgi: Tgi,
    /// Display name of the owning container (file name)
    pub origin_name: String,
    /// Pack label for base content ("BaseGame", "EP01", ...), None for mods
    pub origin_pack: Option<String>,
    /// Container path relative to the scanned root. Unique per container,
    /// unlike `origin_name`.
    pub origin_path: String,
}

impl ResourceRecord {
    pub fn new(
        tgi: Tgi,
        origin_name: impl Into<String>,
        origin_pack: Option<String>,
        origin_path: impl Into<String>,
    ) -> Self {
        Self {
            tgi,
            origin_name: origin_name.into(),
            origin_pack,
            origin_path: origin_path.into(),
        }
    }

    /// Convert a database row to a ResourceRecord. Expects the columns
    /// (type_id, group_id, instance_id, origin_name, origin_pack,
    /// origin_path) in that order.
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_id: i64 = row.get(0)?;
        let group_id: i64 = row.get(1)?;
        let instance_id: i64 = row.get(2)?;
        Ok(Self {
            tgi: Tgi::from_sql(type_id, group_id, instance_id),
            origin_name: row.get(3)?,
            origin_pack: row.get(4)?,
            origin_path: row.get(5)?,
        })
    }
}

/// Metadata for the last completed scan of one partition
#[derive(Debug, Clone)]
pub struct ScanInfo {
    pub partition: Partition,
    pub root_path: String,
    pub scan_id: String,
    pub scanned_at: String,
    pub file_count: u64,
    pub record_count: u64,
}

impl ScanInfo {
    /// Create info for a scan starting now, with a fresh scan id
    pub fn new(partition: Partition, root_path: impl Into<String>) -> Self {
        Self {
            partition,
            root_path: root_path.into(),
            scan_id: Uuid::new_v4().to_string(),
            scanned_at: Utc::now().to_rfc3339(),
            file_count: 0,
            record_count: 0,
        }
    }

    /// Insert or replace the row for this partition
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO scan_info (part, root_path, scan_id, scanned_at, file_count, record_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(part) DO UPDATE SET
                root_path = excluded.root_path,
                scan_id = excluded.scan_id,
                scanned_at = excluded.scanned_at,
                file_count = excluded.file_count,
                record_count = excluded.record_count",
            params![
                self.partition.as_str(),
                self.root_path,
                self.scan_id,
                self.scanned_at,
                self.file_count as i64,
                self.record_count as i64,
            ],
        )?;
        Ok(())
    }

    /// Find the scan info for a partition
    pub fn find(conn: &Connection, partition: Partition) -> Result<Option<Self>> {
        let info = conn
            .query_row(
                "SELECT part, root_path, scan_id, scanned_at, file_count, record_count
                 FROM scan_info WHERE part = ?1",
                params![partition.as_str()],
                Self::from_row,
            )
            .optional()?;
        Ok(info)
    }

    /// Convert a database row to a ScanInfo
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let part_str: String = row.get(0)?;
        let partition = part_str.parse::<Partition>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            partition,
            root_path: row.get(1)?,
            scan_id: row.get(2)?,
            scanned_at: row.get(3)?,
            file_count: row.get::<_, i64>(4)? as u64,
            record_count: row.get::<_, i64>(5)? as u64,
        })
    }
}

/// Bookkeeping for one container in the user partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFile {
    /// Path relative to the scanned Mods folder. Primary key.
    pub path: String,
    pub file_name: String,
    pub size: u64,
    pub mtime_ms: i64,
    pub sha256: Option<String>,
    /// Creator attribution extracted from the file name, when recognisable
    pub creator: Option<String>,
    pub record_count: u64,
    /// The container could not be parsed on the last pass
    pub broken: bool,
    pub note: Option<String>,
    pub scanned_at: String,
}

impl UserFile {
    pub fn new(
        path: impl Into<String>,
        file_name: impl Into<String>,
        size: u64,
        mtime_ms: i64,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            size,
            mtime_ms,
            sha256: None,
            creator: None,
            record_count: 0,
            broken: false,
            note: None,
            scanned_at: Utc::now().to_rfc3339(),
        }
    }

    /// Insert or refresh the row for this path. A successful re-parse
    /// clears any previous broken flag and note.
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO user_files
                (path, file_name, size, mtime_ms, sha256, creator,
                 record_count, broken, note, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(path) DO UPDATE SET
                file_name = excluded.file_name,
                size = excluded.size,
                mtime_ms = excluded.mtime_ms,
                sha256 = excluded.sha256,
                creator = excluded.creator,
                record_count = excluded.record_count,
                broken = excluded.broken,
                note = excluded.note,
                scanned_at = excluded.scanned_at",
            params![
                self.path,
                self.file_name,
                self.size as i64,
                self.mtime_ms,
                self.sha256,
                self.creator,
                self.record_count as i64,
                self.broken,
                self.note,
                self.scanned_at,
            ],
        )?;
        Ok(())
    }

    /// Find a file by its relative path
    pub fn find_by_path(conn: &Connection, path: &str) -> Result<Option<Self>> {
        let file = conn
            .query_row(
                "SELECT path, file_name, size, mtime_ms, sha256, creator,
                        record_count, broken, note, scanned_at
                 FROM user_files WHERE path = ?1",
                params![path],
                Self::from_row,
            )
            .optional()?;
        Ok(file)
    }

    /// List every known file, broken ones included
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT path, file_name, size, mtime_ms, sha256, creator,
                    record_count, broken, note, scanned_at
             FROM user_files ORDER BY path",
        )?;
        let files = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Delete the row for a path
    pub fn delete(conn: &Connection, path: &str) -> Result<()> {
        conn.execute("DELETE FROM user_files WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Convert a database row to a UserFile
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            file_name: row.get(1)?,
            size: row.get::<_, i64>(2)? as u64,
            mtime_ms: row.get(3)?,
            sha256: row.get(4)?,
            creator: row.get(5)?,
            record_count: row.get::<_, i64>(6)? as u64,
            broken: row.get(7)?,
            note: row.get(8)?,
            scanned_at: row.get(9)?,
        })
    }
}

/// Modification time of a file as milliseconds since the epoch. Files
/// with unreadable or pre-epoch timestamps report zero, which still
/// changes when the file is rewritten under a sane clock.
pub fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
