// src/cache.rs

//! Memoized per-item results keyed by file-metadata signatures
//!
//! A cached entry is valid only while every file that contributed to it
//! is unchanged on disk. The signature digests the sorted (path, mtime,
//! size) tuples of the contributing files, so edits, additions, and
//! removals all miss. Concurrent requests for the same key are
//! single-flighted: one caller computes, the rest wait and reuse the
//! stored result.

use crate::db;
use crate::db::models::mtime_millis;
use crate::error::Result;
use crate::hash::{HashAlgorithm, Hasher};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Digest over the metadata of every contributing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSignature(String);

impl FileSignature {
    /// Compute the signature for a file set.
    ///
    /// Tuples are sorted before hashing so the signature is independent
    /// of input order. Any unreadable file fails the whole computation;
    /// callers treat that as uncacheable.
    pub fn compute(files: &[PathBuf]) -> std::io::Result<Self> {
        let mut entries: Vec<(String, i64, u64)> = Vec::with_capacity(files.len());
        for path in files {
            let meta = std::fs::metadata(path)?;
            entries.push((
                path.to_string_lossy().into_owned(),
                mtime_millis(&meta),
                meta.len(),
            ));
        }
        entries.sort();

        let mut hasher = Hasher::new(HashAlgorithm::Xxh128);
        for (path, mtime_ms, size) in &entries {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&mtime_ms.to_le_bytes());
            hasher.update(&size.to_le_bytes());
        }
        Ok(Self(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Persistent result cache with per-key in-flight deduplication.
pub struct ResultCache {
    conn: Mutex<Connection>,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResultCache {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Open a cache backed by the database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self::new(db::open(db_path)?))
    }

    /// Fetch the cached value for `item_key`, or compute and store it.
    ///
    /// The stored entry is reused only when its signature matches the
    /// current state of `files`. A failed signature (a contributing file
    /// vanished mid-check) computes fresh and skips the store, so the
    /// cache never holds a result no file set can validate. Entries
    /// whose payload no longer deserializes are discarded and replaced.
    pub fn get_or_compute<T, F>(&self, item_key: &str, files: &[PathBuf], compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let flight = self.flight(item_key);
        let _in_flight = flight.lock().unwrap();

        let signature = match FileSignature::compute(files) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(
                    "Signature for '{}' failed ({}); computing without cache",
                    item_key, err
                );
                return compute();
            }
        };

        if let Some(payload) = self.fetch(item_key, &signature)? {
            match serde_json::from_str(&payload) {
                Ok(value) => {
                    debug!("Cache hit for '{}'", item_key);
                    return Ok(value);
                }
                Err(err) => {
                    warn!("Discarding unreadable cache entry for '{}': {}", item_key, err);
                }
            }
        }

        debug!("Cache miss for '{}'", item_key);
        let value = compute()?;
        self.store(item_key, &signature, &serde_json::to_string(&value)?)?;
        Ok(value)
    }

    /// Drop the entry for one key.
    pub fn invalidate(&self, item_key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM result_cache WHERE item_key = ?1",
            params![item_key],
        )?;
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM result_cache", [])?;
        Ok(())
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn flight(&self, item_key: &str) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().unwrap();
        flights
            .entry(item_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn fetch(&self, item_key: &str, signature: &FileSignature) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let payload = conn
            .query_row(
                "SELECT payload FROM result_cache WHERE item_key = ?1 AND signature = ?2",
                params![item_key, signature.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn store(&self, item_key: &str, signature: &FileSignature, payload: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO result_cache (item_key, signature, payload, computed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_key) DO UPDATE SET
                signature = excluded.signature,
                payload = excluded.payload,
                computed_at = excluded.computed_at",
            params![
                item_key,
                signature.as_str(),
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_cache() -> ResultCache {
        ResultCache::new(crate::db::open_in_memory().unwrap())
    }

    #[test]
    fn test_signature_is_order_independent() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"aaa").unwrap();
        fs::write(&b, b"bbb").unwrap();

        let forward = FileSignature::compute(&[a.clone(), b.clone()]).unwrap();
        let backward = FileSignature::compute(&[b, a]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_signature_changes_with_content_size() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, b"aaa").unwrap();
        let before = FileSignature::compute(std::slice::from_ref(&file)).unwrap();

        fs::write(&file, b"aaaa").unwrap();
        let after = FileSignature::compute(std::slice::from_ref(&file)).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_signature_fails_on_missing_file() {
        let result = FileSignature::compute(&[PathBuf::from("/does/not/exist.bin")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_second_call_hits_cache() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("item.bin");
        fs::write(&file, b"payload").unwrap();
        let files = vec![file];

        let cache = test_cache();
        let mut calls = 0;
        let first: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(41)
            })
            .unwrap();
        let second: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(99)
            })
            .unwrap();

        assert_eq!(first, 41);
        assert_eq!(second, 41);
        assert_eq!(calls, 1);
        assert_eq!(cache.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_changed_file_recomputes_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("item.bin");
        fs::write(&file, b"v1").unwrap();
        let files = vec![file.clone()];

        let cache = test_cache();
        let mut calls = 0;
        let _: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(1)
            })
            .unwrap();

        fs::write(&file, b"v2-longer").unwrap();
        let after: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(2)
            })
            .unwrap();
        let again: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(3)
            })
            .unwrap();

        assert_eq!(after, 2);
        assert_eq!(again, 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_vanished_file_bypasses_store() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.bin");
        let files = vec![file];

        let cache = test_cache();
        let mut calls = 0;
        let value: u64 = cache
            .get_or_compute("gone", &files, || {
                calls += 1;
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls, 1);
        // Nothing was stored, so the next call computes again.
        let _: u64 = cache
            .get_or_compute("gone", &files, || {
                calls += 1;
                Ok(8)
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("item.bin");
        fs::write(&file, b"x").unwrap();
        let files = vec![file];

        let cache = test_cache();
        let _: u64 = cache.get_or_compute("one", &files, || Ok(1)).unwrap();
        let _: u64 = cache.get_or_compute("two", &files, || Ok(2)).unwrap();
        assert_eq!(cache.entry_count().unwrap(), 2);

        cache.invalidate("one").unwrap();
        assert_eq!(cache.entry_count().unwrap(), 1);
        cache.clear().unwrap();
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_payload_is_replaced() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("item.bin");
        fs::write(&file, b"x").unwrap();
        let files = vec![file];

        let cache = test_cache();
        let _: u64 = cache.get_or_compute("item", &files, || Ok(5)).unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute(
                "UPDATE result_cache SET payload = 'not json' WHERE item_key = 'item'",
                [],
            )
            .unwrap();
        }

        let mut calls = 0;
        let value: u64 = cache
            .get_or_compute("item", &files, || {
                calls += 1;
                Ok(6)
            })
            .unwrap();
        assert_eq!(value, 6);
        assert_eq!(calls, 1);
    }
}
