// src/classify.rs

//! Identity classification against the two index partitions
//!
//! Every identity resolves to one of three verdicts: base-game content,
//! user-added content (with an owning container), or missing entirely.
//! Base matches always win over user matches, so content that shadows a
//! shipped resource still reads as available without the mod installed.

use crate::cache::ResultCache;
use crate::db::models::Partition;
use crate::db::models::ResourceRecord;
use crate::error::Result;
use crate::store::IndexStore;
use crate::tgi::Tgi;
use crate::tray::{Extraction, ExtractionNote, ReferenceTable, extract_item};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Reserved owner key for identities found in neither partition.
pub const MISSING_OWNER: &str = "missing";

/// Three-way verdict for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Shipped with the game or an official pack.
    Base,
    /// Provided by user-installed content.
    Cc,
    /// Referenced but present in neither partition.
    Missing,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Base => "base",
            Verdict::Cc => "cc",
            Verdict::Missing => "missing",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification outcome for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: Verdict,
    /// Owning container name when the verdict is [`Verdict::Cc`].
    pub owner: Option<String>,
    /// Every record matching the identity in the winning partition,
    /// ordered by origin name then origin path.
    pub matches: Vec<ResourceRecord>,
    /// More than one user container claims this identity.
    pub conflict: bool,
}

/// Read-only classification over a store.
pub struct Classifier<'a> {
    store: &'a IndexStore,
}

impl<'a> Classifier<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Resolve each identity to a verdict.
    ///
    /// Both partitions are probed with one batch lookup each. An
    /// identity claimed by several user containers gets the lexically
    /// first container as owner and the conflict flag raised; the full
    /// match list is kept for callers that need the losers too.
    pub fn classify(
        &self,
        identities: &BTreeSet<Tgi>,
    ) -> Result<BTreeMap<Tgi, Classification>> {
        let probe: Vec<Tgi> = identities.iter().copied().collect();
        let base = self.store.lookup_many(Partition::Base, &probe)?;
        let user = self.store.lookup_many(Partition::User, &probe)?;

        let mut classified = BTreeMap::new();
        for tgi in identities {
            let classification = if let Some(matches) = base.get(tgi) {
                Classification {
                    verdict: Verdict::Base,
                    owner: None,
                    matches: matches.clone(),
                    conflict: false,
                }
            } else if let Some(matches) = user.get(tgi) {
                let distinct_containers: BTreeSet<&str> =
                    matches.iter().map(|m| m.origin_path.as_str()).collect();
                Classification {
                    verdict: Verdict::Cc,
                    owner: matches.first().map(|m| m.origin_name.clone()),
                    conflict: distinct_containers.len() > 1,
                    matches: matches.clone(),
                }
            } else {
                Classification {
                    verdict: Verdict::Missing,
                    owner: None,
                    matches: Vec::new(),
                    conflict: false,
                }
            };
            classified.insert(*tgi, classification);
        }

        debug!(
            "Classified {} identities: {} base, {} cc, {} missing",
            classified.len(),
            classified
                .values()
                .filter(|c| c.verdict == Verdict::Base)
                .count(),
            classified
                .values()
                .filter(|c| c.verdict == Verdict::Cc)
                .count(),
            classified
                .values()
                .filter(|c| c.verdict == Verdict::Missing)
                .count(),
        );
        Ok(classified)
    }

    /// Classify and regroup by owner. See [`summarize_classifications`].
    pub fn summarize(&self, identities: &BTreeSet<Tgi>) -> Result<BTreeMap<String, Vec<Tgi>>> {
        let classified = self.classify(identities)?;
        Ok(summarize_classifications(&classified))
    }
}

/// Regroup classifications by owning container.
///
/// `Cc` identities fall under their owner's name, `Missing` ones under
/// the reserved "missing" key. Base identities have no owner and are not
/// listed. Identity lists inherit the map's identity order.
pub fn summarize_classifications(
    classified: &BTreeMap<Tgi, Classification>,
) -> BTreeMap<String, Vec<Tgi>> {
    let mut summary: BTreeMap<String, Vec<Tgi>> = BTreeMap::new();
    for (tgi, classification) in classified {
        match classification.verdict {
            Verdict::Base => {}
            Verdict::Cc => {
                if let Some(owner) = &classification.owner {
                    summary.entry(owner.clone()).or_default().push(*tgi);
                }
            }
            Verdict::Missing => {
                summary
                    .entry(MISSING_OWNER.to_string())
                    .or_default()
                    .push(*tgi);
            }
        }
    }
    summary
}

/// Aggregated classification of one item's reference set. This is the
/// payload stored in the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_key: String,
    /// Distinct identities examined.
    pub total: usize,
    pub base_count: usize,
    pub cc_count: usize,
    pub missing_count: usize,
    /// Identities contested by more than one user container.
    pub conflict_count: usize,
    /// Identities the item's own packages define.
    pub defined_count: usize,
    /// Owner name to the identities it provides, "missing" reserved.
    pub owners: BTreeMap<String, Vec<Tgi>>,
    /// Some of the item's files could not be read; counts cover only
    /// what was extracted.
    pub partial: bool,
    pub notes: Vec<ExtractionNote>,
}

impl ItemReport {
    pub fn new(
        item_key: impl Into<String>,
        classified: &BTreeMap<Tgi, Classification>,
        extraction: &Extraction,
    ) -> Self {
        let mut base_count = 0;
        let mut cc_count = 0;
        let mut missing_count = 0;
        let mut conflict_count = 0;
        for classification in classified.values() {
            match classification.verdict {
                Verdict::Base => base_count += 1,
                Verdict::Cc => cc_count += 1,
                Verdict::Missing => missing_count += 1,
            }
            if classification.conflict {
                conflict_count += 1;
            }
        }
        Self {
            item_key: item_key.into(),
            total: classified.len(),
            base_count,
            cc_count,
            missing_count,
            conflict_count,
            defined_count: extraction.defined.len(),
            owners: summarize_classifications(classified),
            partial: extraction.is_partial(),
            notes: extraction.notes.clone(),
        }
    }

    /// The item needs nothing beyond the game install.
    pub fn is_base_only(&self) -> bool {
        self.cc_count == 0 && self.missing_count == 0
    }
}

/// Classify one item's references with memoization.
///
/// The cache key is `item_key`; the signature covers every file in
/// `files`, so editing, adding, or removing any contributing file
/// invalidates the entry. References defined by the item's own packages
/// are resolved against those packages first and never reported missing.
pub fn classify_item_cached(
    store: &IndexStore,
    cache: &ResultCache,
    table: &ReferenceTable,
    item_key: &str,
    files: &[PathBuf],
) -> Result<ItemReport> {
    cache.get_or_compute(item_key, files, || {
        let extraction = extract_item(table, files);
        let external: BTreeSet<Tgi> = extraction
            .references
            .difference(&extraction.defined)
            .copied()
            .collect();
        let classified = Classifier::new(store).classify(&external)?;
        Ok(ItemReport::new(item_key, &classified, &extraction))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ScanInfo;
    use crate::store::PackageRecords;

    fn seeded_store() -> IndexStore {
        let mut store = IndexStore::new(crate::db::open_in_memory().unwrap());
        store
            .ingest(
                Partition::Base,
                vec![Ok(PackageRecords {
                    origin_name: "FullBuild0.package".to_string(),
                    origin_pack: Some("BaseGame".to_string()),
                    origin_path: "Data/FullBuild0.package".to_string(),
                    identities: vec![Tgi::new(1, 1, 100), Tgi::new(1, 1, 101)],
                    file: None,
                })],
                ScanInfo::new(Partition::Base, "/game"),
            )
            .unwrap();
        store
            .ingest(
                Partition::User,
                vec![
                    Ok(PackageRecords {
                        origin_name: "Hair.package".to_string(),
                        origin_pack: None,
                        origin_path: "Hair.package".to_string(),
                        identities: vec![Tgi::new(1, 1, 200), Tgi::new(1, 1, 101)],
                        file: None,
                    }),
                    Ok(PackageRecords {
                        origin_name: "Zed.package".to_string(),
                        origin_pack: None,
                        origin_path: "Zed.package".to_string(),
                        identities: vec![Tgi::new(2, 2, 50)],
                        file: None,
                    }),
                    Ok(PackageRecords {
                        origin_name: "Abc.package".to_string(),
                        origin_pack: None,
                        origin_path: "Abc.package".to_string(),
                        identities: vec![Tgi::new(2, 2, 50)],
                        file: None,
                    }),
                ],
                ScanInfo::new(Partition::User, "/mods"),
            )
            .unwrap();
        store
    }

    fn classify_one(store: &IndexStore, tgi: Tgi) -> Classification {
        let mut wanted = BTreeSet::new();
        wanted.insert(tgi);
        Classifier::new(store)
            .classify(&wanted)
            .unwrap()
            .remove(&tgi)
            .unwrap()
    }

    #[test]
    fn test_base_verdict() {
        let store = seeded_store();
        let c = classify_one(&store, Tgi::new(1, 1, 100));
        assert_eq!(c.verdict, Verdict::Base);
        assert!(c.owner.is_none());
        assert!(!c.conflict);
        assert_eq!(c.matches.len(), 1);
    }

    #[test]
    fn test_cc_verdict_with_owner() {
        let store = seeded_store();
        let c = classify_one(&store, Tgi::new(1, 1, 200));
        assert_eq!(c.verdict, Verdict::Cc);
        assert_eq!(c.owner.as_deref(), Some("Hair.package"));
        assert!(!c.conflict);
    }

    #[test]
    fn test_missing_verdict() {
        let store = seeded_store();
        let c = classify_one(&store, Tgi::new(1, 1, 300));
        assert_eq!(c.verdict, Verdict::Missing);
        assert!(c.owner.is_none());
        assert!(c.matches.is_empty());
    }

    #[test]
    fn test_base_wins_over_cc() {
        // 1:1:101 exists in both partitions; base takes precedence.
        let store = seeded_store();
        let c = classify_one(&store, Tgi::new(1, 1, 101));
        assert_eq!(c.verdict, Verdict::Base);
        assert!(c.owner.is_none());
    }

    #[test]
    fn test_conflict_reports_first_owner() {
        let store = seeded_store();
        let c = classify_one(&store, Tgi::new(2, 2, 50));
        assert_eq!(c.verdict, Verdict::Cc);
        assert!(c.conflict);
        assert_eq!(c.owner.as_deref(), Some("Abc.package"));
        assert_eq!(c.matches.len(), 2);
    }

    #[test]
    fn test_summarize_groups_by_owner() {
        let store = seeded_store();
        let wanted: BTreeSet<Tgi> = [
            Tgi::new(1, 1, 100), // base
            Tgi::new(1, 1, 200), // Hair.package
            Tgi::new(1, 1, 300), // missing
            Tgi::new(2, 2, 50),  // conflicted, owner Abc.package
        ]
        .into_iter()
        .collect();

        let summary = Classifier::new(&store).summarize(&wanted).unwrap();
        assert_eq!(summary.len(), 3);
        assert_eq!(summary["Hair.package"], vec![Tgi::new(1, 1, 200)]);
        assert_eq!(summary["Abc.package"], vec![Tgi::new(2, 2, 50)]);
        assert_eq!(summary[MISSING_OWNER], vec![Tgi::new(1, 1, 300)]);
        // Base identities are never listed under an owner.
        assert!(summary.values().flatten().all(|t| *t != Tgi::new(1, 1, 100)));
    }

    #[test]
    fn test_empty_input() {
        let store = seeded_store();
        let classified = Classifier::new(&store).classify(&BTreeSet::new()).unwrap();
        assert!(classified.is_empty());
    }

    #[test]
    fn test_item_report_counts() {
        let store = seeded_store();
        let wanted: BTreeSet<Tgi> = [
            Tgi::new(1, 1, 100),
            Tgi::new(1, 1, 200),
            Tgi::new(1, 1, 300),
            Tgi::new(2, 2, 50),
        ]
        .into_iter()
        .collect();
        let classified = Classifier::new(&store).classify(&wanted).unwrap();
        let report = ItemReport::new("tray:x", &classified, &Extraction::default());

        assert_eq!(report.total, 4);
        assert_eq!(report.base_count, 1);
        assert_eq!(report.cc_count, 2);
        assert_eq!(report.missing_count, 1);
        assert_eq!(report.conflict_count, 1);
        assert!(!report.partial);
        assert!(!report.is_base_only());
    }
}
