// src/error.rs

//! Error types for simdex

use crate::dbpf::DbpfError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Failed to read package {path}: {source}")]
    Package {
        path: PathBuf,
        #[source]
        source: DbpfError,
    },

    #[error("Tray item error: {0}")]
    TrayItem(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan deadline of {0:?} exceeded")]
    Timeout(std::time::Duration),

    #[error("Another scan holds the ingest lock at {0}")]
    Locked(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
