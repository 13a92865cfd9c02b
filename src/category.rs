// src/category.rs

//! Category inference for user-content containers
//!
//! Every resource type votes for the category it belongs to; the
//! category with the most votes wins. Two rules sit on top of the vote:
//! containers whose identities mostly shadow base-game content are
//! overrides no matter what they contain, and vote ties break by an
//! explicit priority table (a script mod is a script mod even when it
//! bundles a pile of tuning). All three tables can be replaced from
//! configuration; inference itself is pure and order-independent.

use crate::db::models::ResourceRecord;
use crate::tgi::Tgi;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Default override threshold: strictly more than half of the records
/// must shadow base content.
pub const DEFAULT_OVERRIDE_THRESHOLD: f64 = 0.5;

/// Content category of a user container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Create-a-Sim content (clothing, hair, presets).
    Cas,
    /// Build/Buy objects and architecture.
    BuildBuy,
    /// Script mods.
    Script,
    /// Tuning and data definitions.
    Tuning,
    /// Replaces base-game resources in place.
    Override,
    /// Gameplay content that is neither pure tuning nor script.
    Gameplay,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cas => "cas",
            Category::BuildBuy => "buildbuy",
            Category::Script => "script",
            Category::Tuning => "tuning",
            Category::Override => "override",
            Category::Gameplay => "gameplay",
            Category::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cas" => Some(Category::Cas),
            "buildbuy" => Some(Category::BuildBuy),
            "script" => Some(Category::Script),
            "tuning" => Some(Category::Tuning),
            "override" => Some(Category::Override),
            "gameplay" => Some(Category::Gameplay),
            "unknown" => Some(Category::Unknown),
            _ => None,
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Cas,
            Category::BuildBuy,
            Category::Script,
            Category::Tuning,
            Category::Override,
            Category::Gameplay,
            Category::Unknown,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mapping, priority, and override tables driving inference.
#[derive(Debug, Clone)]
pub struct CategoryTables {
    mapping: HashMap<u32, Category>,
    priority: HashMap<Category, i32>,
    override_threshold: f64,
}

impl Default for CategoryTables {
    fn default() -> Self {
        let mut mapping = HashMap::new();
        // Create-a-Sim
        mapping.insert(0x034AEECB, Category::Cas); // CAS part
        mapping.insert(0x0355E0A6, Category::Cas); // body blend
        mapping.insert(0x0354796A, Category::Cas); // skin tone
        mapping.insert(0xB6C8B6A0, Category::Cas); // CAS texture
        mapping.insert(0x105205BA, Category::Cas); // sim preset
        mapping.insert(0x71BDB8A2, Category::Cas); // styled look
        mapping.insert(0xEAA32ADD, Category::Cas); // CAS preset
        // Build/Buy
        mapping.insert(0x319E4F1D, Category::BuildBuy); // object definition
        mapping.insert(0xC0DB5AE7, Category::BuildBuy); // catalog object
        mapping.insert(0xB91E18DB, Category::BuildBuy); // catalog set
        mapping.insert(0x07936CE0, Category::BuildBuy); // block
        mapping.insert(0xB4F762C9, Category::BuildBuy); // floor pattern
        mapping.insert(0xFE33068E, Category::BuildBuy); // wall pattern
        mapping.insert(0x1C1CF1F7, Category::BuildBuy); // railing
        mapping.insert(0xEBCBB16C, Category::BuildBuy); // stairs
        // Script
        mapping.insert(0x9C07855E, Category::Script); // python archive
        // Tuning
        mapping.insert(0x0333406C, Category::Tuning); // tuning xml
        mapping.insert(0x025ED6F4, Category::Tuning); // simdata
        mapping.insert(0x545AC67A, Category::Tuning); // combined tuning

        let mut priority = HashMap::new();
        priority.insert(Category::Script, 100);
        priority.insert(Category::Cas, 80);
        priority.insert(Category::BuildBuy, 70);
        priority.insert(Category::Override, 60);
        priority.insert(Category::Gameplay, 50);
        priority.insert(Category::Tuning, 40);
        priority.insert(Category::Unknown, 0);

        Self {
            mapping,
            priority,
            override_threshold: DEFAULT_OVERRIDE_THRESHOLD,
        }
    }
}

impl CategoryTables {
    /// Map a resource type to a category, replacing any builtin.
    pub fn map_type(&mut self, type_id: u32, category: Category) {
        self.mapping.insert(type_id, category);
    }

    /// Set a category's tie-break priority, replacing any builtin.
    pub fn set_priority(&mut self, category: Category, priority: i32) {
        self.priority.insert(category, priority);
    }

    /// Set the override threshold. Callers validate the range; see
    /// [`crate::config::SimdexConfig::validate`].
    pub fn set_override_threshold(&mut self, threshold: f64) {
        self.override_threshold = threshold;
    }

    pub fn category_for(&self, type_id: u32) -> Option<Category> {
        self.mapping.get(&type_id).copied()
    }

    pub fn priority_of(&self, category: Category) -> i32 {
        self.priority.get(&category).copied().unwrap_or(0)
    }

    pub fn override_threshold(&self) -> f64 {
        self.override_threshold
    }
}

/// Inference outcome with the tally that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: Category,
    /// Votes per category. Types outside the mapping table vote for
    /// nobody and appear nowhere.
    pub votes: BTreeMap<Category, usize>,
    /// The override rule fired; `votes` still shows the raw tally.
    pub override_applied: bool,
}

/// Deterministic category inference over injected tables.
pub struct CategoryEngine {
    tables: CategoryTables,
}

impl CategoryEngine {
    pub fn new(tables: CategoryTables) -> Self {
        Self { tables }
    }

    pub fn with_defaults() -> Self {
        Self::new(CategoryTables::default())
    }

    pub fn tables(&self) -> &CategoryTables {
        &self.tables
    }

    /// Infer the category for one container's records.
    ///
    /// `base_hits` is the subset of the records' identities that the
    /// base partition already contains. Decision order: empty input is
    /// Unknown; the override rule beats any vote count; an empty tally
    /// is Unknown; otherwise the top vote wins, ties broken by priority
    /// and then by category name for full determinism.
    pub fn infer(&self, records: &[ResourceRecord], base_hits: &BTreeSet<Tgi>) -> CategoryResult {
        let total = records.len();
        let mut votes: BTreeMap<Category, usize> = BTreeMap::new();
        let mut base_matches = 0usize;
        for record in records {
            if base_hits.contains(&record.tgi) {
                base_matches += 1;
            }
            if let Some(category) = self.tables.category_for(record.tgi.type_id) {
                *votes.entry(category).or_insert(0) += 1;
            }
        }

        if total == 0 {
            return CategoryResult {
                category: Category::Unknown,
                votes,
                override_applied: false,
            };
        }

        if base_matches as f64 > self.tables.override_threshold() * total as f64 {
            return CategoryResult {
                category: Category::Override,
                votes,
                override_applied: true,
            };
        }

        let Some(top) = votes.values().copied().max() else {
            return CategoryResult {
                category: Category::Unknown,
                votes,
                override_applied: false,
            };
        };

        let category = votes
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(category, _)| *category)
            .max_by(|a, b| {
                self.tables
                    .priority_of(*a)
                    .cmp(&self.tables.priority_of(*b))
                    // Equal priorities: the lexically smaller name wins.
                    .then_with(|| b.as_str().cmp(a.as_str()))
            })
            .unwrap_or(Category::Unknown);

        CategoryResult {
            category,
            votes,
            override_applied: false,
        }
    }
}
