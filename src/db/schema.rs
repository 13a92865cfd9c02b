// src/db/schema.rs

//! Database schema definitions and migrations for simdex
//!
//! This module defines the SQLite schema for the two resource partitions
//! and their bookkeeping tables, and provides a migration system to
//! evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    // Apply migrations in order
    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables for simdex:
/// - base_resources: identity index of shipped game content
/// - user_resources: identity index of installed mod content
/// - scan_info: one row per partition describing the last completed scan
/// - user_files: per-container bookkeeping for incremental mod scans
/// - result_cache: memoized classification results keyed by file signatures
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Base-game partition: one row per resource index entry
        CREATE TABLE base_resources (
            type_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            instance_id INTEGER NOT NULL,
            origin_name TEXT NOT NULL,
            origin_pack TEXT,
            origin_path TEXT NOT NULL
        );

        CREATE INDEX idx_base_resources_tgi
            ON base_resources(type_id, group_id, instance_id);

        -- User-content partition, same shape as the base partition
        CREATE TABLE user_resources (
            type_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            instance_id INTEGER NOT NULL,
            origin_name TEXT NOT NULL,
            origin_pack TEXT,
            origin_path TEXT NOT NULL
        );

        CREATE INDEX idx_user_resources_tgi
            ON user_resources(type_id, group_id, instance_id);
        CREATE INDEX idx_user_resources_origin
            ON user_resources(origin_path);

        -- Last completed scan per partition
        CREATE TABLE scan_info (
            part TEXT PRIMARY KEY CHECK(part IN ('base', 'user')),
            root_path TEXT NOT NULL,
            scan_id TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            file_count INTEGER NOT NULL,
            record_count INTEGER NOT NULL
        );

        -- Containers seen in the user partition, keyed by relative path.
        -- Drives change detection for incremental scans; broken files are
        -- kept so they are not re-parsed until they change on disk.
        CREATE TABLE user_files (
            path TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            size INTEGER NOT NULL,
            mtime_ms INTEGER NOT NULL,
            sha256 TEXT,
            creator TEXT,
            record_count INTEGER NOT NULL DEFAULT 0,
            broken INTEGER NOT NULL DEFAULT 0,
            note TEXT,
            scanned_at TEXT NOT NULL
        );

        -- Memoized per-item results. The signature digests the metadata
        -- of every file that contributed to the payload.
        CREATE TABLE result_cache (
            item_key TEXT PRIMARY KEY,
            signature TEXT NOT NULL,
            payload TEXT NOT NULL,
            computed_at TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}
