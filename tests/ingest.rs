// tests/ingest.rs

//! End-to-end scan and ingest tests: game and Mods trees on disk,
//! through discovery and parsing, into the SQLite index.

mod common;

use common::{setup_db, write_garbage_package, write_package};
use simdex::db::models::Partition;
use simdex::progress::SilentProgress;
use simdex::scan::{CancelToken, ParseMode, ScanOptions, scan_game, scan_mods};
use simdex::store::IndexStore;
use simdex::{Error, Tgi};
use std::time::Duration;

fn lenient() -> ScanOptions {
    ScanOptions::default()
}

fn strict() -> ScanOptions {
    ScanOptions {
        mode: ParseMode::Strict,
        timeout: None,
    }
}

#[test]
fn test_game_scan_indexes_base_partition() {
    let game_dir = tempfile::tempdir().unwrap();
    let root = game_dir.path();
    write_package(
        &root.join("Data/Simulation/Base.package"),
        &[(0x0333406C, 0, 100), (0x034AEECB, 0, 101)],
    );
    write_package(&root.join("EP01/Data/Pack.package"), &[(0x0333406C, 0, 200)]);
    // Outside Data/ and pack directories, never discovered.
    write_package(&root.join("Support/Tool.package"), &[(0x0333406C, 0, 999)]);
    std::fs::write(root.join("Data/readme.txt"), b"not a package").unwrap();

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let outcome = scan_game(
        &mut store,
        root,
        &lenient(),
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    assert_eq!(outcome.partition, Partition::Base);
    assert_eq!(outcome.files_seen, 2);
    assert_eq!(outcome.files_indexed, 2);
    assert_eq!(outcome.records, 3);
    assert!(outcome.skipped.is_empty());

    assert_eq!(store.record_count(Partition::Base).unwrap(), 3);
    assert_eq!(store.origin_count(Partition::Base).unwrap(), 2);

    let base = store
        .lookup(Partition::Base, &Tgi::new(0x0333406C, 0, 100))
        .unwrap();
    assert_eq!(base.len(), 1);
    assert_eq!(base[0].origin_pack.as_deref(), Some("BaseGame"));

    let pack = store
        .lookup(Partition::Base, &Tgi::new(0x0333406C, 0, 200))
        .unwrap();
    assert_eq!(pack[0].origin_pack.as_deref(), Some("EP01"));
    assert_eq!(pack[0].origin_name, "Pack.package");

    let scan = store.scan_info(Partition::Base).unwrap().unwrap();
    assert_eq!(scan.root_path, root.to_string_lossy());
    assert_eq!(scan.file_count, 2);
    assert_eq!(scan.record_count, 3);
}

#[test]
fn test_game_scan_requires_existing_root() {
    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let err = scan_game(
        &mut store,
        std::path::Path::new("/no/such/game"),
        &lenient(),
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_mods_first_scan_indexes_everything() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("TS4_Bobby_Hair.package"), &[(0x034AEECB, 0, 1)]);
    write_package(
        &root.join("cc/plain.package"),
        &[(0x0333406C, 0, 2), (0x0333406C, 0, 3)],
    );

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    // full = false still indexes everything on the first pass.
    let outcome = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    assert_eq!(outcome.partition, Partition::User);
    assert_eq!(outcome.files_indexed, 2);
    assert_eq!(outcome.records, 3);
    assert_eq!(outcome.deleted, 0);

    let files = store.user_files().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "TS4_Bobby_Hair.package");
    assert_eq!(files[0].creator.as_deref(), Some("Bobby"));
    assert_eq!(files[0].record_count, 1);
    assert!(files[0].sha256.is_some());
    assert_eq!(files[1].path, "cc/plain.package");
    assert_eq!(files[1].creator, None);
    assert_eq!(files[1].record_count, 2);
}

#[test]
fn test_mods_lenient_scan_records_broken_file() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("good.package"), &[(0x0333406C, 0, 1)]);
    write_garbage_package(&root.join("Maker-Broke.package"));

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let outcome = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    assert_eq!(outcome.files_seen, 2);
    assert_eq!(outcome.files_indexed, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].path, "Maker-Broke.package");

    // The broken file still gets a bookkeeping row, with no index rows.
    let files = store.user_files().unwrap();
    assert_eq!(files.len(), 2);
    let broke = files.iter().find(|f| f.path == "Maker-Broke.package").unwrap();
    assert!(broke.broken);
    assert_eq!(broke.record_count, 0);
    assert!(broke.note.is_some());
    assert_eq!(broke.creator.as_deref(), Some("Maker"));
    assert_eq!(store.record_count(Partition::User).unwrap(), 1);
}

#[test]
fn test_mods_strict_scan_aborts_and_keeps_previous_index() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("good.package"), &[(0x0333406C, 0, 1)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();
    assert_eq!(store.record_count(Partition::User).unwrap(), 1);

    write_garbage_package(&root.join("broke.package"));
    let err = scan_mods(
        &mut store,
        root,
        &strict(),
        true,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Package { .. }));

    // The failed pass rolled back; the index still reflects the first scan.
    assert_eq!(store.record_count(Partition::User).unwrap(), 1);
    assert_eq!(store.user_files().unwrap().len(), 1);
}

#[test]
fn test_mods_incremental_add_modify_delete() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("a.package"), &[(0x0333406C, 0, 10)]);
    write_package(&root.join("b.package"), &[(0x0333406C, 0, 20)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    // Modify a (two identities changes the byte size), remove b, add c.
    write_package(
        &root.join("a.package"),
        &[(0x0333406C, 0, 11), (0x0333406C, 0, 12)],
    );
    std::fs::remove_file(root.join("b.package")).unwrap();
    write_package(&root.join("c.package"), &[(0x0333406C, 0, 30)]);

    let outcome = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    assert_eq!(outcome.files_seen, 2);
    assert_eq!(outcome.files_indexed, 2);
    assert_eq!(outcome.records, 3);
    assert_eq!(outcome.deleted, 1);

    let paths: Vec<String> = store
        .user_files()
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(paths, vec!["a.package".to_string(), "c.package".to_string()]);

    // The old identity of a and all of b are gone.
    assert!(store
        .lookup(Partition::User, &Tgi::new(0x0333406C, 0, 10))
        .unwrap()
        .is_empty());
    assert!(store
        .lookup(Partition::User, &Tgi::new(0x0333406C, 0, 20))
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .lookup(Partition::User, &Tgi::new(0x0333406C, 0, 11))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(store.record_count(Partition::User).unwrap(), 3);
}

#[test]
fn test_mods_unchanged_pass_reads_nothing() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("a.package"), &[(0x0333406C, 0, 10)]);
    write_package(&root.join("b.package"), &[(0x0333406C, 0, 20)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    let outcome = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();
    assert_eq!(outcome.files_seen, 2);
    assert_eq!(outcome.files_indexed, 0);
    assert_eq!(outcome.records, 0);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(store.record_count(Partition::User).unwrap(), 2);
}

#[test]
fn test_mods_scan_skips_macos_droppings() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("real.package"), &[(0x0333406C, 0, 1)]);
    write_package(&root.join("__MACOSX/real.package"), &[(0x0333406C, 0, 2)]);
    write_package(&root.join("._real.package"), &[(0x0333406C, 0, 3)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let outcome = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap();

    assert_eq!(outcome.files_seen, 1);
    assert_eq!(store.user_files().unwrap().len(), 1);
    assert_eq!(store.user_files().unwrap()[0].path, "real.package");
}

#[test]
fn test_cancelled_scan_commits_nothing() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("a.package"), &[(0x0333406C, 0, 1)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = scan_mods(
        &mut store,
        root,
        &lenient(),
        false,
        &cancel,
        &SilentProgress::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    assert!(store.scan_info(Partition::User).unwrap().is_none());
    assert_eq!(store.record_count(Partition::User).unwrap(), 0);
    assert!(store.user_files().unwrap().is_empty());
}

#[test]
fn test_expired_deadline_commits_nothing() {
    let mods_dir = tempfile::tempdir().unwrap();
    let root = mods_dir.path();
    write_package(&root.join("a.package"), &[(0x0333406C, 0, 1)]);

    let (_db_dir, db_path) = setup_db();
    let mut store = IndexStore::open(&db_path).unwrap();
    let options = ScanOptions {
        mode: ParseMode::Lenient,
        timeout: Some(Duration::ZERO),
    };

    let err = scan_mods(
        &mut store,
        root,
        &options,
        false,
        &CancelToken::new(),
        &SilentProgress::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(store.record_count(Partition::User).unwrap(), 0);
}
