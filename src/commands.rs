// src/commands.rs
//! Command handlers for the simdex CLI

use anyhow::{Context, Result};
use simdex::cache::ResultCache;
use simdex::category::{CategoryEngine, CategoryResult};
use simdex::classify::{Classifier, ItemReport, Verdict, classify_item_cached};
use simdex::config::SimdexConfig;
use simdex::db;
use simdex::db::models::{Partition, ResourceRecord};
use simdex::dbpf::{Package, types};
use simdex::progress::CliProgress;
use simdex::scan::{self, CancelToken, ParseMode, ScanOptions, ScanOutcome};
use simdex::store::{IndexStore, Severity};
use simdex::tgi::Tgi;
use simdex::tray::{TrayItem, discover_tray_items};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Parse a `TYPE:GROUP:INSTANCE` identity argument, hex with or without
/// `0x` prefixes.
pub fn parse_identity(raw: &str) -> Result<Tgi> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [type_part, group_part, instance_part] = parts.as_slice() else {
        anyhow::bail!(
            "Invalid identity '{}': expected TYPE:GROUP:INSTANCE in hex",
            raw
        );
    };
    let type_id = u32::from_str_radix(type_part.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid type id in '{}'", raw))?;
    let group_id = u32::from_str_radix(group_part.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid group id in '{}'", raw))?;
    let instance_id = u64::from_str_radix(instance_part.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid instance id in '{}'", raw))?;
    Ok(Tgi::new(type_id, group_id, instance_id))
}

/// Pick the folder for a scan: explicit argument first, then the config.
fn resolve_root(arg: Option<PathBuf>, configured: &Option<PathBuf>, what: &str) -> Result<PathBuf> {
    arg.or_else(|| configured.clone()).ok_or_else(|| {
        anyhow::anyhow!(
            "No {} folder given; pass a path or set paths.{} in the config",
            what,
            what
        )
    })
}

/// Build scan options from CLI flags, falling back to the config.
fn scan_options(config: &SimdexConfig, strict: bool, timeout_secs: Option<u64>) -> ScanOptions {
    let mode = if strict || config.scan.strict {
        ParseMode::Strict
    } else {
        ParseMode::Lenient
    };
    let timeout = match timeout_secs.unwrap_or(config.scan.timeout_secs) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    ScanOptions { mode, timeout }
}

fn print_outcome(outcome: &ScanOutcome) {
    println!(
        "Indexed {} of {} files ({} resources) in {:.1}s",
        outcome.files_indexed,
        outcome.files_seen,
        outcome.records,
        outcome.duration.as_secs_f64()
    );
    if outcome.deleted > 0 {
        println!("  Removed {} files no longer on disk", outcome.deleted);
    }
    if !outcome.skipped.is_empty() {
        println!("  {} files could not be parsed:", outcome.skipped.len());
        for diagnostic in &outcome.skipped {
            println!("    [SKIPPED] {}: {}", diagnostic.path, diagnostic.reason);
        }
    }
}

/// Create the index database and its schema
pub fn cmd_init(db_path: &str) -> Result<()> {
    info!("Initializing index database at {}", db_path);
    db::init(db_path).with_context(|| format!("Failed to initialize database at {}", db_path))?;
    println!("Initialized index database: {}", db_path);
    Ok(())
}

/// Scan the game install into the base partition
pub fn cmd_scan_game(
    config: &SimdexConfig,
    db_path: &str,
    game_path: Option<PathBuf>,
    strict: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let game_root = resolve_root(game_path, &config.paths.game, "game")?;
    info!("Scanning game install at {}", game_root.display());

    let mut store = IndexStore::open(db_path)?;
    let options = scan_options(config, strict, timeout_secs);
    let progress = CliProgress::bar("Scanning game packages", 0);
    let outcome = scan::scan_game(
        &mut store,
        &game_root,
        &options,
        &CancelToken::new(),
        &progress,
    )?;
    print_outcome(&outcome);
    Ok(())
}

/// Scan the Mods folder into the user partition
pub fn cmd_scan_mods(
    config: &SimdexConfig,
    db_path: &str,
    mods_path: Option<PathBuf>,
    strict: bool,
    timeout_secs: Option<u64>,
    full: bool,
) -> Result<()> {
    let mods_root = resolve_root(mods_path, &config.paths.mods, "mods")?;
    info!("Scanning Mods folder at {}", mods_root.display());

    let mut store = IndexStore::open(db_path)?;
    let options = scan_options(config, strict, timeout_secs);
    let progress = CliProgress::bar("Scanning mod packages", 0);
    let outcome = scan::scan_mods(
        &mut store,
        &mods_root,
        &options,
        full,
        &CancelToken::new(),
        &progress,
    )?;
    print_outcome(&outcome);
    Ok(())
}

/// Classify identities against both partitions
pub fn cmd_classify(db_path: &str, identities: &[String]) -> Result<()> {
    let mut wanted = BTreeSet::new();
    for raw in identities {
        wanted.insert(parse_identity(raw)?);
    }
    info!("Classifying {} identities", wanted.len());

    let store = IndexStore::open(db_path)?;
    let classified = Classifier::new(&store).classify(&wanted)?;

    let mut base = 0;
    let mut cc = 0;
    let mut missing = 0;
    for (tgi, classification) in &classified {
        match classification.verdict {
            Verdict::Base => {
                base += 1;
                let pack = classification
                    .matches
                    .first()
                    .and_then(|m| m.origin_pack.as_deref())
                    .unwrap_or("BaseGame");
                println!("{}  base     {}", tgi, pack);
            }
            Verdict::Cc => {
                cc += 1;
                let owner = classification.owner.as_deref().unwrap_or("?");
                if classification.conflict {
                    let origins: BTreeSet<&str> = classification
                        .matches
                        .iter()
                        .map(|m| m.origin_name.as_str())
                        .collect();
                    let origins: Vec<&str> = origins.into_iter().collect();
                    println!("{}  cc       {} [CONFLICT: {}]", tgi, owner, origins.join(", "));
                } else {
                    println!("{}  cc       {}", tgi, owner);
                }
            }
            Verdict::Missing => {
                missing += 1;
                println!("{}  missing", tgi);
            }
        }
    }
    println!(
        "{} identities: {} base, {} cc, {} missing",
        classified.len(),
        base,
        cc,
        missing
    );
    Ok(())
}

/// Check tray items for missing or conflicting custom content
pub fn cmd_check_tray(
    config: &SimdexConfig,
    db_path: &str,
    tray_path: Option<PathBuf>,
    item_id: Option<String>,
    no_cache: bool,
) -> Result<()> {
    let tray_root = resolve_root(tray_path, &config.paths.tray, "tray")?;
    let store = IndexStore::open(db_path)?;
    let cache = ResultCache::open(db_path)?;
    let table = config.reference_table();

    let items = match item_id {
        Some(id) => vec![TrayItem::from_dir(&tray_root, &id)?],
        None => discover_tray_items(&tray_root)?,
    };
    if items.is_empty() {
        println!("No tray items found in {}", tray_root.display());
        return Ok(());
    }
    info!("Checking {} tray items", items.len());

    let mut incomplete = 0;
    for item in &items {
        let key = format!("tray:{}", item.id);
        if no_cache {
            cache.invalidate(&key)?;
        }
        let files: Vec<PathBuf> = item
            .reference_files()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();
        let report = classify_item_cached(&store, &cache, &table, &key, &files)?;
        if report.missing_count > 0 {
            incomplete += 1;
        }
        print_item_report(item, &report);
    }
    if incomplete > 0 {
        println!(
            "{} of {} items reference content that is not installed",
            incomplete,
            items.len()
        );
    } else {
        println!("All {} items have their content installed", items.len());
    }
    Ok(())
}

fn print_item_report(item: &TrayItem, report: &ItemReport) {
    println!("{} ({})", item.display_name(), item.kind);
    println!(
        "  {} references: {} base, {} cc, {} missing",
        report.total, report.base_count, report.cc_count, report.missing_count
    );
    if report.partial {
        println!("  [WARN] {} files could not be read:", report.notes.len());
        for note in &report.notes {
            println!("    {}: {}", note.path, note.reason);
        }
    }
    for (owner, identities) in &report.owners {
        if owner == simdex::classify::MISSING_OWNER {
            continue;
        }
        println!("  requires {} ({} identities)", owner, identities.len());
    }
    if let Some(lost) = report.owners.get(simdex::classify::MISSING_OWNER) {
        println!("  [MISSING] {} identities found nowhere:", lost.len());
        for tgi in lost.iter().take(10) {
            println!("    {}  {}", tgi, types::describe(tgi.type_id));
        }
        if lost.len() > 10 {
            println!("    ... and {} more", lost.len() - 10);
        }
    }
    if report.conflict_count > 0 {
        println!(
            "  [WARN] {} identities are claimed by more than one mod",
            report.conflict_count
        );
    }
    if report.is_base_only() {
        println!("  [OK] needs nothing beyond the game install");
    }
}

/// Infer the content category of one package file
pub fn cmd_categorize(config: &SimdexConfig, db_path: &str, package_path: &Path) -> Result<()> {
    // Script archives declare themselves by extension; there is nothing
    // to vote on inside.
    let is_script = package_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ts4script"));
    if is_script {
        println!("{}: script", package_path.display());
        return Ok(());
    }

    let store = IndexStore::open(db_path)?;
    let cache = ResultCache::open(db_path)?;
    let engine = CategoryEngine::new(config.category_tables());

    let key = format!("category:{}", package_path.display());
    let files = [package_path.to_path_buf()];
    let result: CategoryResult = cache.get_or_compute(&key, &files, || {
        let package = Package::open(package_path).map_err(|source| simdex::Error::Package {
            path: package_path.to_path_buf(),
            source,
        })?;
        let name = package_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| package_path.display().to_string());
        let identities: Vec<Tgi> = package
            .into_entries()
            .into_iter()
            .map(|entry| entry.tgi)
            .collect();
        let base = store.lookup_many(Partition::Base, &identities)?;
        let base_hits: BTreeSet<Tgi> = base.keys().copied().collect();
        let records: Vec<ResourceRecord> = identities
            .into_iter()
            .map(|tgi| ResourceRecord::new(tgi, &name, None, &name))
            .collect();
        Ok(engine.infer(&records, &base_hits))
    })?;

    println!("{}: {}", package_path.display(), result.category);
    if result.override_applied {
        println!("  most identities shadow base-game content");
    }
    let mut votes: Vec<_> = result.votes.iter().collect();
    votes.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    for (category, count) in votes {
        println!("  {}: {} votes", category, count);
    }
    Ok(())
}

/// List identities claimed by more than one mod
pub fn cmd_conflicts(db_path: &str) -> Result<()> {
    let store = IndexStore::open(db_path)?;
    let mut groups = store.conflicts()?;
    if groups.is_empty() {
        println!("No conflicting identities between mods");
        return Ok(());
    }

    groups.sort_by(|a, b| {
        b.severity()
            .cmp(&a.severity())
            .then_with(|| a.tgi.cmp(&b.tgi))
    });
    let high = groups
        .iter()
        .filter(|g| g.severity() == Severity::High)
        .count();

    println!("Found {} conflicting identities:", groups.len());
    for group in &groups {
        println!(
            "  [{}] {}  {}",
            group.severity().as_str().to_uppercase(),
            group.tgi,
            types::describe(group.tgi.type_id)
        );
        for origin in &group.origins {
            println!("      {}", origin);
        }
    }
    if high > 0 {
        println!("{} conflicts touch meshes or textures and will be visible in game", high);
    }

    let clusters = IndexStore::conflict_clusters(&groups);
    println!("{} conflict clusters:", clusters.len());
    for (index, cluster) in clusters.iter().enumerate() {
        // A group's origins all share one cluster.
        let shared = groups
            .iter()
            .filter(|g| g.origins.first().is_some_and(|o| cluster.contains(o)))
            .count();
        println!(
            "  {}: {} ({} shared identities)",
            index + 1,
            cluster.join(", "),
            shared
        );
    }
    Ok(())
}

/// Show the header and index summary of one package file
pub fn cmd_info(package_path: &Path) -> Result<()> {
    let package = Package::open(package_path)
        .with_context(|| format!("Failed to read package {}", package_path.display()))?;
    let header = *package.header();

    println!("{}", package_path.display());
    println!("  DBPF version: {}", header.version());
    println!("  File size: {} bytes", package.file_len());
    println!(
        "  Index: {} entries, {} bytes at offset {}",
        header.entry_count, header.index_size, header.index_position
    );

    let entries = package.into_entries();
    let compressed = entries.iter().filter(|e| e.is_compressed()).count();
    println!("  Compressed payloads: {} of {}", compressed, entries.len());

    let mut by_type: BTreeMap<u32, usize> = BTreeMap::new();
    for entry in &entries {
        *by_type.entry(entry.tgi.type_id).or_insert(0) += 1;
    }
    let mut counts: Vec<_> = by_type.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("  Resource types:");
    for (type_id, count) in counts {
        println!("    {:>6}  {}", count, types::describe(type_id));
    }
    Ok(())
}

/// Summarize the index: partitions, scan times, broken files, cache
pub fn cmd_status(db_path: &str) -> Result<()> {
    let store = IndexStore::open(db_path)?;
    println!("Index: {}", db_path);

    for partition in [Partition::Base, Partition::User] {
        match store.scan_info(partition)? {
            Some(scan) => {
                println!("  {} partition:", partition);
                println!("    Root: {}", scan.root_path);
                println!("    Scanned: {}", scan.scanned_at);
                println!(
                    "    {} files, {} resources",
                    store.origin_count(partition)?,
                    store.record_count(partition)?
                );
            }
            None => println!("  {} partition: never scanned", partition),
        }
    }

    let broken: Vec<_> = store
        .user_files()?
        .into_iter()
        .filter(|file| file.broken)
        .collect();
    if !broken.is_empty() {
        println!("  [WARN] {} broken files in Mods:", broken.len());
        for file in &broken {
            let note = file.note.as_deref().unwrap_or("unreadable");
            println!("    {}: {}", file.path, note);
        }
    }

    let cache = ResultCache::open(db_path)?;
    println!("  Cached reports: {}", cache.entry_count()?);
    Ok(())
}
