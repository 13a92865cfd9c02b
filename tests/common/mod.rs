// tests/common/mod.rs

//! Shared fixture builders for integration tests.

use simdex::db;
use simdex::dbpf::{COMPRESSION_NONE, HEADER_SIZE, MAGIC};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Serialize a well-formed v2.1 package declaring the given
/// (type, group, instance) identities, with empty payloads.
pub fn package_bytes(identities: &[(u32, u32, u64)]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(MAGIC);
    buf[4..8].copy_from_slice(&2u32.to_le_bytes());
    buf[8..12].copy_from_slice(&1u32.to_le_bytes());
    buf[36..40].copy_from_slice(&(identities.len() as u32).to_le_bytes());

    let mut table = Vec::new();
    if !identities.is_empty() {
        table.extend_from_slice(&0u32.to_le_bytes()); // flags: nothing constant
        for (type_id, group_id, instance_id) in identities {
            table.extend_from_slice(&type_id.to_le_bytes());
            table.extend_from_slice(&group_id.to_le_bytes());
            table.extend_from_slice(&((instance_id >> 32) as u32).to_le_bytes());
            table.extend_from_slice(&(*instance_id as u32).to_le_bytes());
            table.extend_from_slice(&0u32.to_le_bytes()); // payload offset
            table.extend_from_slice(&0u32.to_le_bytes()); // compressed size
            table.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size
            table.extend_from_slice(&COMPRESSION_NONE.to_le_bytes());
            table.extend_from_slice(&1u16.to_le_bytes()); // committed
        }
    }
    buf[44..48].copy_from_slice(&(table.len() as u32).to_le_bytes());
    buf[64..68].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&table);
    buf
}

/// Write a parseable package file at `path`.
pub fn write_package(path: &Path, identities: &[(u32, u32, u64)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, package_bytes(identities)).unwrap();
}

/// Write a file that will fail container parsing.
pub fn write_garbage_package(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"definitely not a dbpf container, not even close").unwrap();
}

/// Create an initialized index database in a fresh temp directory.
///
/// Returns (TempDir, db_path) - keep the TempDir alive to prevent cleanup.
pub fn setup_db() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir
        .path()
        .join("simdex.db")
        .to_str()
        .unwrap()
        .to_string();
    db::init(&db_path).unwrap();
    (dir, db_path)
}
