// src/store.rs

//! Persistent resource index over the two partitions
//!
//! The store owns the database connection and is the only component that
//! writes resource rows. Ingestion replaces a whole partition (or a set
//! of origins) inside a single transaction; readers either see the old
//! index or the new one, never a mix. Batch lookups stage the probe set
//! in an indexed temporary table and join against the partition, so
//! classifying thousands of identities stays a fixed number of queries.

use crate::db::{
    self,
    models::{Partition, ResourceRecord, ScanInfo, UserFile},
};
use crate::error::Result;
use crate::tgi::Tgi;
use rusqlite::{Connection, params};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// One parsed container ready for ingestion.
#[derive(Debug, Clone)]
pub struct PackageRecords {
    /// Display name (file name) of the container.
    pub origin_name: String,
    /// Pack label for base content, None for user content.
    pub origin_pack: Option<String>,
    /// Path relative to the scanned root. Unique per container.
    pub origin_path: String,
    /// Every identity the container's index declares.
    pub identities: Vec<Tgi>,
    /// Bookkeeping row, present for user-partition scans.
    pub file: Option<UserFile>,
}

impl PackageRecords {
    /// Whether this container failed to parse and only carries its
    /// broken-file bookkeeping row.
    pub fn is_broken(&self) -> bool {
        self.file.as_ref().is_some_and(|f| f.broken)
    }
}

/// Counters reported by a completed ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Containers parsed and indexed in this pass.
    pub files: u64,
    /// Resource rows written in this pass.
    pub records: u64,
}

/// Identities claimed by more than one user-content container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    pub tgi: Tgi,
    /// Names of the claiming containers, sorted and deduplicated.
    pub origins: Vec<String>,
}

/// How visibly a conflict is likely to break content in game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

// Colliding meshes and textures corrupt what the player sees; colliding
// tuning usually degrades to last-loaded-wins.
const HIGH_SEVERITY_TYPES: &[u32] = &[0x034AEECB, 0x015A1849, 0x00B2D882, 0x3C1AF1F2, 0x2F7D0004];
const MEDIUM_SEVERITY_TYPES: &[u32] = &[0x0333406C, 0x025ED6F4, 0x545AC67A];

impl ConflictGroup {
    pub fn severity(&self) -> Severity {
        if HIGH_SEVERITY_TYPES.contains(&self.tgi.type_id) {
            Severity::High
        } else if MEDIUM_SEVERITY_TYPES.contains(&self.tgi.type_id) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// The resource index. All reads and writes go through here.
pub struct IndexStore {
    conn: Connection,
    db_path: Option<String>,
}

impl IndexStore {
    /// Wrap an existing connection. Used by tests and ephemeral runs;
    /// stores created this way have no on-disk lock path.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            db_path: None,
        }
    }

    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = db::open(db_path)?;
        Ok(Self {
            conn,
            db_path: Some(db_path.to_string()),
        })
    }

    /// Path of the backing database file, if the store is file-backed.
    pub fn db_path(&self) -> Option<&str> {
        self.db_path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace a partition wholesale from a stream of parsed containers.
    ///
    /// Runs in one transaction: the partition is cleared, every source
    /// is inserted, and the scan metadata row is refreshed. The first
    /// `Err` yielded by `sources` aborts and rolls back, leaving the
    /// previous index intact. For the user partition the bookkeeping
    /// table is cleared and rebuilt alongside the resources.
    pub fn ingest<I>(
        &mut self,
        partition: Partition,
        sources: I,
        mut scan: ScanInfo,
    ) -> Result<IngestStats>
    where
        I: IntoIterator<Item = Result<PackageRecords>>,
    {
        let stats = db::transaction(&mut self.conn, |tx| {
            tx.execute(&format!("DELETE FROM {}", partition.table()), [])?;
            if partition == Partition::User {
                tx.execute("DELETE FROM user_files", [])?;
            }

            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (type_id, group_id, instance_id, origin_name, origin_pack, origin_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                partition.table()
            ))?;

            let mut stats = IngestStats::default();
            for source in sources {
                let package = source?;
                for tgi in &package.identities {
                    let (t, g, i) = tgi.to_sql();
                    insert.execute(params![
                        t,
                        g,
                        i,
                        package.origin_name,
                        package.origin_pack,
                        package.origin_path,
                    ])?;
                    stats.records += 1;
                }
                if let Some(file) = &package.file {
                    file.upsert(tx)?;
                }
                if !package.is_broken() {
                    stats.files += 1;
                }
            }

            scan.file_count = stats.files;
            scan.record_count = stats.records;
            scan.upsert(tx)?;
            Ok(stats)
        })?;

        info!(
            "Ingested {} records from {} containers into the {} partition",
            stats.records, stats.files, partition
        );
        Ok(stats)
    }

    /// Apply an incremental update to the user partition.
    ///
    /// One transaction: rows and bookkeeping for `deleted` paths are
    /// dropped, each changed container has its old rows replaced, and the
    /// scan metadata is refreshed with whole-partition totals. The first
    /// `Err` from `changed` rolls everything back.
    pub fn apply_user_changes<I>(
        &mut self,
        changed: I,
        deleted: &[String],
        mut scan: ScanInfo,
    ) -> Result<IngestStats>
    where
        I: IntoIterator<Item = Result<PackageRecords>>,
    {
        let stats = db::transaction(&mut self.conn, |tx| {
            for path in deleted {
                tx.execute(
                    "DELETE FROM user_resources WHERE origin_path = ?1",
                    params![path],
                )?;
                UserFile::delete(tx, path)?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO user_resources
                    (type_id, group_id, instance_id, origin_name, origin_pack, origin_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            let mut stats = IngestStats::default();
            for source in changed {
                let package = source?;
                tx.execute(
                    "DELETE FROM user_resources WHERE origin_path = ?1",
                    params![package.origin_path],
                )?;
                for tgi in &package.identities {
                    let (t, g, i) = tgi.to_sql();
                    insert.execute(params![
                        t,
                        g,
                        i,
                        package.origin_name,
                        package.origin_pack,
                        package.origin_path,
                    ])?;
                    stats.records += 1;
                }
                if let Some(file) = &package.file {
                    file.upsert(tx)?;
                }
                if !package.is_broken() {
                    stats.files += 1;
                }
            }

            let file_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM user_files WHERE broken = 0",
                [],
                |row| row.get(0),
            )?;
            let record_count: i64 =
                tx.query_row("SELECT COUNT(*) FROM user_resources", [], |row| row.get(0))?;
            scan.file_count = file_count as u64;
            scan.record_count = record_count as u64;
            scan.upsert(tx)?;
            Ok(stats)
        })?;

        info!(
            "Applied user-content changes: {} containers re-indexed, {} removed",
            stats.files,
            deleted.len()
        );
        Ok(stats)
    }

    /// All records matching one identity, ordered by origin name then
    /// origin path.
    pub fn lookup(&self, partition: Partition, tgi: &Tgi) -> Result<Vec<ResourceRecord>> {
        let (t, g, i) = tgi.to_sql();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT type_id, group_id, instance_id, origin_name, origin_pack, origin_path
             FROM {}
             WHERE type_id = ?1 AND group_id = ?2 AND instance_id = ?3
             ORDER BY origin_name, origin_path",
            partition.table()
        ))?;
        let records = stmt
            .query_map(params![t, g, i], ResourceRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Batch lookup: all records matching any of `identities`, grouped
    /// by identity. Identities with no match are absent from the result.
    ///
    /// The probe set is staged in a keyed temporary table and joined,
    /// which keeps large batches at two statements instead of one query
    /// per identity. Per-identity record order matches [`Self::lookup`].
    pub fn lookup_many(
        &self,
        partition: Partition,
        identities: &[Tgi],
    ) -> Result<BTreeMap<Tgi, Vec<ResourceRecord>>> {
        let mut results: BTreeMap<Tgi, Vec<ResourceRecord>> = BTreeMap::new();
        if identities.is_empty() {
            return Ok(results);
        }

        self.conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS probe_identities (
                type_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                instance_id INTEGER NOT NULL,
                PRIMARY KEY (type_id, group_id, instance_id)
            ) WITHOUT ROWID;
            DELETE FROM probe_identities;",
        )?;

        {
            let mut stage = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO probe_identities VALUES (?1, ?2, ?3)")?;
            for tgi in identities {
                let (t, g, i) = tgi.to_sql();
                stage.execute(params![t, g, i])?;
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.type_id, r.group_id, r.instance_id,
                    r.origin_name, r.origin_pack, r.origin_path
             FROM {} r
             JOIN probe_identities p
               ON r.type_id = p.type_id
              AND r.group_id = p.group_id
              AND r.instance_id = p.instance_id
             ORDER BY r.origin_name, r.origin_path",
            partition.table()
        ))?;
        let rows = stmt.query_map([], ResourceRecord::from_row)?;
        for row in rows {
            let record = row?;
            results.entry(record.tgi).or_default().push(record);
        }
        drop(stmt);

        self.conn.execute("DELETE FROM probe_identities", [])?;
        debug!(
            "Batch lookup of {} identities hit {} in the {} partition",
            identities.len(),
            results.len(),
            partition
        );
        Ok(results)
    }

    /// Identities claimed by more than one user-content container,
    /// ordered by identity.
    pub fn conflicts(&self) -> Result<Vec<ConflictGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.type_id, r.group_id, r.instance_id, r.origin_name
             FROM user_resources r
             JOIN (SELECT type_id, group_id, instance_id
                   FROM user_resources
                   GROUP BY type_id, group_id, instance_id
                   HAVING COUNT(DISTINCT origin_path) > 1) c
               ON r.type_id = c.type_id
              AND r.group_id = c.group_id
              AND r.instance_id = c.instance_id
             ORDER BY r.type_id, r.group_id, r.instance_id, r.origin_name, r.origin_path",
        )?;

        let mut groups: Vec<ConflictGroup> = Vec::new();
        let rows = stmt.query_map([], |row| {
            let t: i64 = row.get(0)?;
            let g: i64 = row.get(1)?;
            let i: i64 = row.get(2)?;
            let name: String = row.get(3)?;
            Ok((Tgi::from_sql(t, g, i), name))
        })?;
        for row in rows {
            let (tgi, name) = row?;
            match groups.last_mut() {
                Some(group) if group.tgi == tgi => {
                    if !group.origins.contains(&name) {
                        group.origins.push(name);
                    }
                }
                _ => groups.push(ConflictGroup {
                    tgi,
                    origins: vec![name],
                }),
            }
        }
        Ok(groups)
    }

    /// Group conflicting containers into connected clusters: two
    /// containers land in the same cluster when any chain of shared
    /// identities links them.
    pub fn conflict_clusters(groups: &[ConflictGroup]) -> Vec<Vec<String>> {
        let mut cluster_of: BTreeMap<String, usize> = BTreeMap::new();
        let mut clusters: Vec<BTreeSet<String>> = Vec::new();

        for group in groups {
            let mut target: Option<usize> = None;
            for origin in &group.origins {
                if let Some(&index) = cluster_of.get(origin) {
                    target = Some(match target {
                        None => index,
                        Some(existing) if existing == index => existing,
                        Some(existing) => {
                            // Merge the later cluster into the earlier one.
                            let (keep, merge) =
                                (existing.min(index), existing.max(index));
                            let absorbed = std::mem::take(&mut clusters[merge]);
                            for name in &absorbed {
                                cluster_of.insert(name.clone(), keep);
                            }
                            clusters[keep].extend(absorbed);
                            keep
                        }
                    });
                }
            }
            let index = target.unwrap_or_else(|| {
                clusters.push(BTreeSet::new());
                clusters.len() - 1
            });
            for origin in &group.origins {
                cluster_of.insert(origin.clone(), index);
                clusters[index].insert(origin.clone());
            }
        }

        clusters
            .into_iter()
            .filter(|c| !c.is_empty())
            .map(|c| c.into_iter().collect())
            .collect()
    }

    /// Total resource rows in a partition.
    pub fn record_count(&self, partition: Partition) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", partition.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Distinct containers contributing to a partition.
    pub fn origin_count(&self, partition: Partition) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT origin_path) FROM {}",
                partition.table()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Metadata of the last completed scan of a partition.
    pub fn scan_info(&self, partition: Partition) -> Result<Option<ScanInfo>> {
        ScanInfo::find(&self.conn, partition)
    }

    /// Bookkeeping rows for every known user container.
    pub fn user_files(&self) -> Result<Vec<UserFile>> {
        UserFile::list_all(&self.conn)
    }
}
