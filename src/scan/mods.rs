// src/scan/mods.rs
//! Scanner for the user Mods folder.
//!
//! Walks the Mods tree for `.package` files, skipping editor droppings
//! and macOS metadata, and indexes them into the user partition. Repeat
//! scans are incremental: files whose size and mtime both match the
//! stored row are not re-read, vanished files are deleted from the
//! index, and everything else is re-hashed and re-parsed.
//!
//! Files that cannot be parsed still get a row. A broken package is a
//! finding the user needs surfaced (it usually means a truncated
//! download), not something to silently drop, so the scanner records it
//! with `broken = true` and the parse error as its note.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use glob::Pattern;
use regex::Regex;
use tracing::info;
use walkdir::WalkDir;

use crate::db::models::{Partition, ScanInfo, UserFile, mtime_millis};
use crate::dbpf::Package;
use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, hash_file};
use crate::progress::ProgressTracker;
use crate::store::{IndexStore, PackageRecords};
use crate::tgi::Tgi;

use super::{CancelToken, ScanOptions, ScanOutcome, WorkerMessage, acquire_ingest_lock, run_parse_pool};

/// Directory and file names excluded from discovery.
///
/// `__MACOSX` folders and `._*` resource forks appear when a mod zip
/// was packed on macOS; neither holds a real package.
pub const IGNORE_PATTERNS: [&str; 3] = ["__MACOSX", ".DS_Store", "._*"];

static IGNORE_GLOBS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    IGNORE_PATTERNS
        .iter()
        .map(|p| Pattern::new(p).unwrap())
        .collect()
});

/// Creator-prefix conventions, most specific first.
static CREATOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^TS4[-_]([A-Za-z0-9]+)[-_]",
        r"^([A-Za-z0-9]+)_",
        r"^([A-Za-z0-9]+)-",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// A `.package` file found under the Mods root.
#[derive(Debug, Clone)]
pub struct ModFile {
    /// Absolute path on disk.
    pub abs: PathBuf,
    /// Path relative to the Mods root; the file's identity in the index.
    pub rel: String,
    pub size: u64,
    pub mtime_ms: i64,
}

/// Extract a creator name from a mod file name.
///
/// Tries the common naming conventions in order: a `TS4-Creator-...`
/// prefix, then `Creator_...`, then `Creator-...`. The captured name is
/// title-cased so `simsyCREATOR_hair` and `SimsyCreator_dress` land
/// under the same creator. Returns `None` when no convention matches.
pub fn creator_from_name(file_name: &str) -> Option<String> {
    for pattern in CREATOR_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(file_name) {
            if let Some(name) = captures.get(1) {
                return Some(title_case(name.as_str()));
            }
        }
    }
    None
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn is_ignored(rel: &Path) -> bool {
    rel.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        IGNORE_GLOBS.iter().any(|glob| glob.matches(&name))
    })
}

/// Find every indexable `.package` file under the Mods root.
///
/// Results are sorted by relative path so scan order and index output
/// are stable across runs.
pub fn discover_mod_packages(mods_root: &Path) -> Vec<ModFile> {
    let mut files: Vec<ModFile> = WalkDir::new(mods_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("package"))
        })
        .filter_map(|entry| {
            let abs = entry.path().to_path_buf();
            let rel_path = abs.strip_prefix(mods_root).unwrap_or(&abs);
            if is_ignored(rel_path) {
                return None;
            }
            let (size, mtime_ms) = entry
                .metadata()
                .map(|meta| (meta.len(), mtime_millis(&meta)))
                .unwrap_or((0, 0));
            Some(ModFile {
                rel: rel_path.to_string_lossy().into_owned(),
                abs,
                size,
                mtime_ms,
            })
        })
        .collect();
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    files
}

/// Difference between the indexed user partition and the Mods tree.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// New files, plus files whose size or mtime no longer match.
    pub changed: Vec<ModFile>,
    /// Indexed paths that are no longer on disk.
    pub deleted: Vec<String>,
    pub unchanged: u64,
}

/// Compare indexed rows against the files currently on disk.
///
/// A file counts as unchanged only when both size and mtime match its
/// row; content hashes are deliberately not consulted here, so an
/// unchanged verdict costs one `stat` and no reads.
pub fn detect_changes(previous: &[UserFile], current: &[ModFile]) -> ChangeSet {
    let known: std::collections::HashMap<&str, &UserFile> = previous
        .iter()
        .map(|file| (file.path.as_str(), file))
        .collect();
    let on_disk: std::collections::HashSet<&str> =
        current.iter().map(|file| file.rel.as_str()).collect();

    let mut changes = ChangeSet::default();
    for file in current {
        match known.get(file.rel.as_str()) {
            Some(row) if row.size == file.size && row.mtime_ms == file.mtime_ms => {
                changes.unchanged += 1;
            }
            _ => changes.changed.push(file.clone()),
        }
    }
    for row in previous {
        if !on_disk.contains(row.path.as_str()) {
            changes.deleted.push(row.path.clone());
        }
    }
    changes
}

/// Hash and parse one mod package.
///
/// The sha256 is computed before the container is opened so a package
/// that fails to parse still gets a content hash when the bytes are
/// readable. Any failure produces a fallback record with `broken` set
/// and zero resources; its size and mtime are recorded, so the file is
/// not re-read on the next pass unless it changes.
fn parse_mod_file(file: &ModFile) -> WorkerMessage {
    let file_name = file
        .abs
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.rel.clone());
    let creator = creator_from_name(&file_name);
    let sha256 = hash_file(HashAlgorithm::Sha256, &file.abs).ok();

    match Package::open(&file.abs) {
        Ok(package) => {
            let identities: Vec<Tgi> = package
                .into_entries()
                .into_iter()
                .map(|entry| entry.tgi)
                .collect();
            let mut record = UserFile::new(&file.rel, &file_name, file.size, file.mtime_ms);
            record.sha256 = sha256;
            record.creator = creator;
            record.record_count = identities.len() as u64;
            WorkerMessage::Parsed(PackageRecords {
                origin_name: file_name,
                origin_pack: None,
                origin_path: file.rel.clone(),
                identities,
                file: Some(record),
            })
        }
        Err(source) => {
            let error = Error::Package {
                path: file.abs.clone(),
                source,
            };
            let mut record = UserFile::new(&file.rel, &file_name, file.size, file.mtime_ms);
            record.sha256 = sha256;
            record.creator = creator;
            record.broken = true;
            record.note = Some(error.to_string());
            let fallback = PackageRecords {
                origin_name: file_name,
                origin_pack: None,
                origin_path: file.rel.clone(),
                identities: Vec::new(),
                file: Some(record),
            };
            WorkerMessage::Failed {
                path: file.rel.clone(),
                error,
                fallback: Some(fallback),
            }
        }
    }
}

/// Scan the Mods folder into the user partition.
///
/// The first scan (or `full = true`) re-indexes every discovered file.
/// Later scans diff the tree against the stored rows and only re-read
/// what changed; deletions are applied in the same transaction. Either
/// way the scan metadata row is refreshed, so a pass over an unchanged
/// tree still updates the scan timestamp.
pub fn scan_mods(
    store: &mut IndexStore,
    mods_root: &Path,
    options: &ScanOptions,
    full: bool,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<ScanOutcome> {
    let start = Instant::now();
    if !mods_root.is_dir() {
        return Err(Error::NotFound(format!(
            "Mods folder {}",
            mods_root.display()
        )));
    }
    let _lock = acquire_ingest_lock(store.db_path())?;

    let current = discover_mod_packages(mods_root);
    let scan = ScanInfo::new(Partition::User, mods_root.to_string_lossy());
    let full = full || store.scan_info(Partition::User)?.is_none();

    if full {
        info!(
            "Indexing {} mod packages under {}",
            current.len(),
            mods_root.display()
        );
        progress.set_length(current.len() as u64);
        let (stats, skipped) = run_parse_pool(
            &current,
            options,
            cancel,
            progress,
            parse_mod_file,
            |sources| store.ingest(Partition::User, sources, scan),
        )?;
        progress.finish_with_message(&format!(
            "Indexed {} resources from {} mod packages",
            stats.records, stats.files
        ));
        return Ok(ScanOutcome {
            partition: Partition::User,
            files_seen: current.len() as u64,
            files_indexed: stats.files,
            records: stats.records,
            deleted: 0,
            skipped,
            duration: start.elapsed(),
        });
    }

    let previous = store.user_files()?;
    let changes = detect_changes(&previous, &current);
    info!(
        "Mods delta: {} changed, {} deleted, {} unchanged",
        changes.changed.len(),
        changes.deleted.len(),
        changes.unchanged
    );
    progress.set_length(changes.changed.len() as u64);
    let deleted = changes.deleted.len() as u64;
    let (stats, skipped) = run_parse_pool(
        &changes.changed,
        options,
        cancel,
        progress,
        parse_mod_file,
        |sources| store.apply_user_changes(sources, &changes.deleted, scan),
    )?;
    progress.finish_with_message(&format!(
        "Updated {} mod packages, removed {}",
        stats.files, deleted
    ));
    Ok(ScanOutcome {
        partition: Partition::User,
        files_seen: current.len() as u64,
        files_indexed: stats.files,
        records: stats.records,
        deleted,
        skipped,
        duration: start.elapsed(),
    })
}
