// src/scan/game.rs

//! Full scan of the game install into the base partition
//!
//! Discovery mirrors the install layout: the base game keeps its
//! containers under `Data/`, and every DLC lives in a sibling directory
//! named after its pack kind (`EP01`, `GP05`, ...) with its own `Data/`
//! subtree. Each record carries the pack label it came from so reports
//! can say "this is from Cats & Dogs" rather than a bare path.

use crate::db::models::{Partition, ScanInfo};
use crate::dbpf::Package;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::scan::{
    CancelToken, ScanOptions, ScanOutcome, WorkerMessage, acquire_ingest_lock, run_parse_pool,
};
use crate::store::{IndexStore, PackageRecords};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use walkdir::WalkDir;

/// Directory name prefixes marking DLC packs: expansion, game, stuff,
/// and free packs.
pub const PACK_PREFIXES: [&str; 4] = ["EP", "GP", "SP", "FP"];

/// Find every container file the game install ships.
///
/// Scans `Data/` under the install root plus the `Data/` subtree of
/// every pack directory. Returns a sorted list so passes visit files in
/// a stable order.
pub fn discover_game_packages(game_root: &Path) -> Vec<PathBuf> {
    let mut packages = Vec::new();

    let data_dir = game_root.join("Data");
    if data_dir.is_dir() {
        collect_packages(&data_dir, &mut packages);
    }

    if let Ok(entries) = std::fs::read_dir(game_root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if PACK_PREFIXES.iter().any(|p| name.starts_with(p)) {
                let dlc_data = path.join("Data");
                if dlc_data.is_dir() {
                    collect_packages(&dlc_data, &mut packages);
                }
            }
        }
    }

    packages.sort();
    packages
}

fn collect_packages(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("package"))
        {
            out.push(entry.into_path());
        }
    }
}

/// Pack label for a container, from its position in the install tree.
///
/// Containers under a pack directory get that directory's name (`EP01`,
/// `GP05`, ...); everything else under the root is `"BaseGame"`. Paths
/// outside the root label as `"Unknown"`.
pub fn pack_label(package_path: &Path, game_root: &Path) -> String {
    let Ok(relative) = package_path.strip_prefix(game_root) else {
        return "Unknown".to_string();
    };
    if let Some(first) = relative.components().next() {
        let name = first.as_os_str().to_string_lossy();
        if PACK_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return name.into_owned();
        }
    }
    "BaseGame".to_string()
}

fn parse_game_package(game_root: &Path, path: &Path) -> Result<PackageRecords> {
    let package = Package::open(path).map_err(|source| Error::Package {
        path: path.to_path_buf(),
        source,
    })?;

    let origin_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let origin_path = path
        .strip_prefix(game_root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();
    let label = pack_label(path, game_root);
    let identities = package.into_entries().into_iter().map(|e| e.tgi).collect();

    Ok(PackageRecords {
        origin_name,
        origin_pack: Some(label),
        origin_path,
        identities,
        file: None,
    })
}

/// Scan the game install and replace the base partition.
///
/// The whole pass commits atomically: on any abort (strict-mode parse
/// failure, cancellation, deadline, storage error) the previously
/// committed base index stays untouched.
pub fn scan_game(
    store: &mut IndexStore,
    game_root: &Path,
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<ScanOutcome> {
    let start = Instant::now();
    if !game_root.is_dir() {
        return Err(Error::NotFound(format!(
            "game folder {}",
            game_root.display()
        )));
    }
    let _lock = acquire_ingest_lock(store.db_path())?;

    let files = discover_game_packages(game_root);
    info!(
        "Discovered {} game packages under {}",
        files.len(),
        game_root.display()
    );
    progress.set_length(files.len() as u64);

    let scan = ScanInfo::new(Partition::Base, game_root.to_string_lossy());
    let (stats, skipped) = run_parse_pool(
        &files,
        options,
        cancel,
        progress,
        |path| match parse_game_package(game_root, path) {
            Ok(records) => WorkerMessage::Parsed(records),
            Err(error) => WorkerMessage::Failed {
                path: path.display().to_string(),
                error,
                fallback: None,
            },
        },
        |sources| store.ingest(Partition::Base, sources, scan),
    )?;

    progress.finish_with_message(&format!(
        "Indexed {} resources from {} packages",
        stats.records, stats.files
    ));
    Ok(ScanOutcome {
        partition: Partition::Base,
        files_seen: files.len() as u64,
        files_indexed: stats.files,
        records: stats.records,
        deleted: 0,
        skipped,
        duration: start.elapsed(),
    })
}
