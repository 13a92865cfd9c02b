// src/scan/mod.rs

//! Ingestion passes over the game install and the Mods folder
//!
//! Both passes share one pipeline: discover container files, parse them
//! on a worker pool, and stream the parsed batches into a single
//! transactional writer. Workers never touch the store. A cancellation
//! or deadline check sits between containers, never mid-container, and
//! surfaces as a final `Err` through the writer so an interrupted pass
//! rolls back instead of committing a partial partition. A cross-process
//! advisory lock serializes writers on the same database file.

pub mod game;
pub mod mods;

pub use game::{PACK_PREFIXES, discover_game_packages, pack_label, scan_game};
pub use mods::{IGNORE_PATTERNS, ModFile, creator_from_name, discover_mod_packages, scan_mods};

use crate::db::models::Partition;
use crate::db::paths::ingest_lock_path;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::store::PackageRecords;
use fs2::FileExt;
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::warn;

/// How a pass reacts to a malformed or unreadable container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Record a diagnostic and continue with the remaining files.
    #[default]
    Lenient,
    /// Abort the whole pass on the first bad file; nothing is committed.
    Strict,
}

/// Cooperative cancellation flag, checked between containers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One file a pass could not index.
#[derive(Debug, Clone)]
pub struct FileDiagnostic {
    pub path: String,
    pub reason: String,
}

/// Options for one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub mode: ParseMode,
    /// Wall-clock deadline for the whole pass.
    pub timeout: Option<Duration>,
}

/// Counters and diagnostics from a completed pass.
#[derive(Debug)]
pub struct ScanOutcome {
    pub partition: Partition,
    /// Container files present under the root at discovery time.
    pub files_seen: u64,
    /// Containers parsed and indexed during this pass.
    pub files_indexed: u64,
    /// Resource rows written during this pass.
    pub records: u64,
    /// Origins removed from the index (incremental passes only).
    pub deleted: u64,
    /// Files skipped as malformed or unreadable.
    pub skipped: Vec<FileDiagnostic>,
    pub duration: Duration,
}

impl ScanOutcome {
    pub fn skipped_count(&self) -> u64 {
        self.skipped.len() as u64
    }
}

/// Advisory cross-process lock held for the duration of a pass.
///
/// Stores without a backing file (in-memory tests) have no lock path;
/// the guard is then a no-op.
pub struct IngestLock {
    file: Option<File>,
}

const LOCK_RETRIES: u32 = 5;

/// Acquire the writer lock beside the database file.
///
/// Retries with backoff (100ms doubling, ~1.5s total) before giving up,
/// so back-to-back passes do not fail on the previous pass's teardown.
pub fn acquire_ingest_lock(db_path: Option<&str>) -> Result<IngestLock> {
    let Some(db_path) = db_path else {
        return Ok(IngestLock { file: None });
    };
    let lock_path = ingest_lock_path(db_path);
    let file = File::create(&lock_path)?;

    let mut last_error = None;
    for attempt in 0..LOCK_RETRIES {
        match file.try_lock_exclusive() {
            Ok(()) => {
                last_error = None;
                break;
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < LOCK_RETRIES - 1 {
                    std::thread::sleep(Duration::from_millis(100 * (1 << attempt)));
                }
            }
        }
    }

    if last_error.is_some() {
        return Err(Error::Locked(lock_path.display().to_string()));
    }
    Ok(IngestLock { file: Some(file) })
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = FileExt::unlock(file);
        }
    }
}

/// Outcome of parsing one container on the worker pool.
pub(crate) enum WorkerMessage {
    Parsed(PackageRecords),
    Failed {
        path: String,
        error: Error,
        /// Batch to index in place of the unparseable container so the
        /// bookkeeping remembers the failure (user partition only).
        fallback: Option<PackageRecords>,
    },
}

/// Parse `files` on the rayon pool and feed the batches into `consume`.
///
/// `consume` receives a fallible iterator: in strict mode the first
/// parse failure surfaces as `Err`, and cancellation or deadline expiry
/// appends a final `Err` after the parsed batches drain. Handing that
/// iterator to a transactional writer therefore rolls the pass back
/// rather than committing a partial partition. Lenient-mode failures
/// become diagnostics, returned alongside the writer's result.
pub(crate) fn run_parse_pool<T, P, C, R>(
    files: &[T],
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
    parse: P,
    consume: C,
) -> Result<(R, Vec<FileDiagnostic>)>
where
    T: Sync,
    P: Fn(&T) -> WorkerMessage + Sync,
    C: FnOnce(&mut dyn Iterator<Item = Result<PackageRecords>>) -> Result<R>,
{
    use rayon::prelude::*;

    let deadline = options.timeout.map(|t| Instant::now() + t);
    let timed_out = AtomicBool::new(false);
    let strict = options.mode == ParseMode::Strict;

    let (sender, receiver) = mpsc::channel();
    let mut diagnostics: Vec<FileDiagnostic> = Vec::new();

    let result = std::thread::scope(|scope| {
        let timed_out = &timed_out;
        let parse = &parse;
        scope.spawn(move || {
            files.par_iter().for_each_with(sender, |tx, file| {
                if cancel.is_cancelled() || timed_out.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        timed_out.store(true, Ordering::Relaxed);
                        return;
                    }
                }
                let message = parse(file);
                progress.increment(1);
                let _ = tx.send(message);
            });
        });

        let mut sources = receiver
            .iter()
            .filter_map(|message| match message {
                WorkerMessage::Parsed(records) => Some(Ok(records)),
                WorkerMessage::Failed {
                    path,
                    error,
                    fallback,
                } => {
                    if strict {
                        cancel.cancel();
                        Some(Err(error))
                    } else {
                        warn!("Skipping {}: {}", path, error);
                        diagnostics.push(FileDiagnostic {
                            path,
                            reason: error.to_string(),
                        });
                        fallback.map(Ok)
                    }
                }
            })
            .chain(std::iter::from_fn(|| {
                if timed_out.load(Ordering::Relaxed) {
                    Some(Err(Error::Timeout(options.timeout.unwrap_or_default())))
                } else if cancel.is_cancelled() {
                    Some(Err(Error::Cancelled))
                } else {
                    None
                }
            }));

        consume(&mut sources)
    })?;

    Ok((result, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;

    fn batch(name: &str, path: &str) -> PackageRecords {
        PackageRecords {
            origin_name: name.to_string(),
            origin_pack: None,
            origin_path: path.to_string(),
            identities: Vec::new(),
            file: None,
        }
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_pool_delivers_every_batch() {
        let files: Vec<u32> = (0..50).collect();
        let progress = SilentProgress::new();
        let (count, diagnostics) = run_parse_pool(
            &files,
            &ScanOptions::default(),
            &CancelToken::new(),
            &progress,
            |n| WorkerMessage::Parsed(batch(&format!("{n}.package"), &format!("{n}"))),
            |sources| {
                let mut count = 0u64;
                for source in sources {
                    source?;
                    count += 1;
                }
                Ok(count)
            },
        )
        .unwrap();

        assert_eq!(count, 50);
        assert!(diagnostics.is_empty());
        assert_eq!(progress.position(), 50);
    }

    #[test]
    fn test_lenient_failure_becomes_diagnostic() {
        let files = vec![1u32, 2, 3];
        let (count, diagnostics) = run_parse_pool(
            &files,
            &ScanOptions::default(),
            &CancelToken::new(),
            &SilentProgress::new(),
            |n| {
                if *n == 2 {
                    WorkerMessage::Failed {
                        path: "2.package".to_string(),
                        error: Error::NotFound("2.package".to_string()),
                        fallback: None,
                    }
                } else {
                    WorkerMessage::Parsed(batch(&format!("{n}.package"), &format!("{n}")))
                }
            },
            |sources| {
                let mut count = 0u64;
                for source in sources {
                    source?;
                    count += 1;
                }
                Ok(count)
            },
        )
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path, "2.package");
    }

    #[test]
    fn test_strict_failure_aborts() {
        let files = vec![1u32, 2, 3];
        let options = ScanOptions {
            mode: ParseMode::Strict,
            timeout: None,
        };
        let result = run_parse_pool(
            &files,
            &options,
            &CancelToken::new(),
            &SilentProgress::new(),
            |n| {
                if *n == 2 {
                    WorkerMessage::Failed {
                        path: "2.package".to_string(),
                        error: Error::NotFound("2.package".to_string()),
                        fallback: None,
                    }
                } else {
                    WorkerMessage::Parsed(batch(&format!("{n}.package"), &format!("{n}")))
                }
            },
            |sources| {
                for source in sources {
                    source?;
                }
                Ok(())
            },
        );

        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_pre_cancelled_pass_fails_without_parsing() {
        let files = vec![1u32, 2, 3];
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = run_parse_pool(
            &files,
            &ScanOptions::default(),
            &cancel,
            &SilentProgress::new(),
            |n| WorkerMessage::Parsed(batch(&format!("{n}.package"), &format!("{n}"))),
            |sources| {
                for source in sources {
                    source?;
                }
                Ok(())
            },
        );

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_expired_deadline_fails_pass() {
        let files = vec![1u32, 2, 3];
        let options = ScanOptions {
            mode: ParseMode::Lenient,
            timeout: Some(Duration::ZERO),
        };
        let result = run_parse_pool(
            &files,
            &options,
            &CancelToken::new(),
            &SilentProgress::new(),
            |n| WorkerMessage::Parsed(batch(&format!("{n}.package"), &format!("{n}"))),
            |sources| {
                for source in sources {
                    source?;
                }
                Ok(())
            },
        );

        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_lock_is_exclusive_per_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("simdex.db");
        let db_str = db_path.to_string_lossy().into_owned();

        let first = acquire_ingest_lock(Some(&db_str)).unwrap();
        assert!(acquire_ingest_lock(Some(&db_str)).is_err());
        drop(first);
        assert!(acquire_ingest_lock(Some(&db_str)).is_ok());
    }

    #[test]
    fn test_lock_noop_without_path() {
        let guard = acquire_ingest_lock(None).unwrap();
        drop(guard);
    }
}
