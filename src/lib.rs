// src/lib.rs

//! Simdex
//!
//! Resource indexer and conflict analyzer for Sims 4 DBPF packages.
//! Builds a SQLite index of every resource identity shipped by the game
//! and installed in the Mods folder, then answers questions about it:
//! which file owns an identity, which mods collide, whether a tray item
//! has all of its custom content, and what a package most likely is.
//!
//! # Architecture
//!
//! - Database-first: the index lives in SQLite, rebuilt by scanning
//! - Two partitions: base (game + packs) and user (Mods), compared for
//!   override and conflict detection
//! - Incremental: user files are re-read only when size or mtime change
//! - Classification is derived from the index, never stored

pub mod cache;
pub mod category;
pub mod classify;
pub mod config;
pub mod db;
pub mod dbpf;
mod error;
pub mod hash;
pub mod progress;
pub mod scan;
pub mod store;
pub mod tgi;
pub mod tray;

pub use cache::{FileSignature, ResultCache};
pub use category::{Category, CategoryEngine, CategoryResult, CategoryTables};
pub use classify::{Classification, Classifier, ItemReport, Verdict, classify_item_cached};
pub use config::SimdexConfig;
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, Hasher};
pub use progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
pub use scan::{CancelToken, ParseMode, ScanOptions, ScanOutcome, scan_game, scan_mods};
pub use store::{IndexStore, PackageRecords};
pub use tgi::Tgi;
pub use tray::{Extraction, ReferenceTable, TrayItem, extract_item};
