// src/config.rs

//! Configuration file parsing for simdex
//!
//! Supports TOML configuration files with the following sections:
//! - [paths] - Game install, mods directory, tray directory, database override
//! - [scan] - Strict mode, scan deadline
//! - [categories] - Type-to-category mapping, priorities, override threshold
//! - [references] - Resource types decoded during reference extraction

use crate::category::{Category, CategoryTables, DEFAULT_OVERRIDE_THRESHOLD};
use crate::db::paths::{default_config_path, default_db_path};
use crate::tgi::parse_hex_u32;
use crate::tray::ReferenceTable;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct SimdexConfig {
    /// Root paths for the game install, user content, and database
    #[serde(default)]
    pub paths: PathsSection,

    /// Scan behavior
    #[serde(default)]
    pub scan: ScanSection,

    /// Category inference tables
    #[serde(default)]
    pub categories: CategoriesSection,

    /// Reference extraction settings
    #[serde(default)]
    pub references: ReferencesSection,
}

/// Filesystem roots
///
/// All optional; commands that need one take it as an argument when the
/// config leaves it unset.
#[derive(Debug, Default, Deserialize)]
pub struct PathsSection {
    /// Game installation root (the directory holding Data/ and the packs)
    pub game: Option<PathBuf>,

    /// User Mods directory
    pub mods: Option<PathBuf>,

    /// User Tray directory
    pub tray: Option<PathBuf>,

    /// Database path override
    pub database: Option<PathBuf>,
}

/// Scan behavior section
#[derive(Debug, Default, Deserialize)]
pub struct ScanSection {
    /// Abort a pass on the first malformed file instead of skipping it
    #[serde(default)]
    pub strict: bool,

    /// Deadline for a whole pass in seconds (0 = no deadline)
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Category inference section
#[derive(Debug, Deserialize)]
pub struct CategoriesSection {
    /// Extra resource-type mappings, hex type id to category name
    #[serde(default)]
    pub mapping: HashMap<String, String>,

    /// Priority overrides per category name
    #[serde(default)]
    pub priority: HashMap<String, i32>,

    /// Fraction of base-matching resources that flips a file to Override
    #[serde(default = "default_override_threshold")]
    pub override_threshold: f64,
}

impl Default for CategoriesSection {
    fn default() -> Self {
        Self {
            mapping: HashMap::new(),
            priority: HashMap::new(),
            override_threshold: default_override_threshold(),
        }
    }
}

fn default_override_threshold() -> f64 {
    DEFAULT_OVERRIDE_THRESHOLD
}

/// Reference extraction section
#[derive(Debug, Default, Deserialize)]
pub struct ReferencesSection {
    /// Hex resource type ids to decode, e.g. "0x034AEECB"
    #[serde(default)]
    pub types: Vec<String>,

    /// Replace the built-in type list instead of extending it
    #[serde(default)]
    pub replace: bool,
}

impl SimdexConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SimdexConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the platform config path, or fall back to defaults when
    /// no file exists there.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let threshold = self.categories.override_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            anyhow::bail!(
                "categories.override_threshold must be in (0.0, 1.0], got {}",
                threshold
            );
        }

        for (type_hex, name) in &self.categories.mapping {
            parse_hex_u32(type_hex).ok_or_else(|| {
                anyhow::anyhow!("Invalid type id '{}' in categories.mapping", type_hex)
            })?;
            if Category::parse(name).is_none() {
                anyhow::bail!(
                    "Unknown category '{}' in categories.mapping (expected one of {:?})",
                    name,
                    Category::all()
                );
            }
        }

        for name in self.categories.priority.keys() {
            if Category::parse(name).is_none() {
                anyhow::bail!(
                    "Unknown category '{}' in categories.priority (expected one of {:?})",
                    name,
                    Category::all()
                );
            }
        }

        for type_hex in &self.references.types {
            parse_hex_u32(type_hex).ok_or_else(|| {
                anyhow::anyhow!("Invalid type id '{}' in references.types", type_hex)
            })?;
        }

        Ok(())
    }

    /// Build the category tables with this config's overrides applied
    ///
    /// Assumes `validate()` has passed; entries that no longer parse are
    /// skipped rather than re-reported.
    pub fn category_tables(&self) -> CategoryTables {
        let mut tables = CategoryTables::default();
        for (type_hex, name) in &self.categories.mapping {
            if let (Some(type_id), Some(category)) = (parse_hex_u32(type_hex), Category::parse(name))
            {
                tables.map_type(type_id, category);
            }
        }
        for (name, priority) in &self.categories.priority {
            if let Some(category) = Category::parse(name) {
                tables.set_priority(category, *priority);
            }
        }
        tables.set_override_threshold(self.categories.override_threshold);
        tables
    }

    /// Build the reference decoder table with this config's overrides applied
    pub fn reference_table(&self) -> ReferenceTable {
        let configured = self
            .references
            .types
            .iter()
            .filter_map(|hex| parse_hex_u32(hex));
        if self.references.replace && !self.references.types.is_empty() {
            ReferenceTable::new(configured)
        } else {
            let mut table = ReferenceTable::default();
            table.extend(configured);
            table
        }
    }

    /// Resolve the database path: config override, else the platform default
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .database
            .clone()
            .unwrap_or_else(default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimdexConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.scan.strict);
        assert_eq!(config.scan.timeout_secs, 0);
        assert_eq!(
            config.categories.override_threshold,
            DEFAULT_OVERRIDE_THRESHOLD
        );
        assert!(config.paths.game.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[paths]
game = "/games/sims4"
mods = "/home/player/Documents/Electronic Arts/The Sims 4/Mods"
tray = "/home/player/Documents/Electronic Arts/The Sims 4/Tray"

[scan]
strict = true
timeout_secs = 120

[categories]
override_threshold = 0.6

[categories.mapping]
"0x12345678" = "cas"

[categories.priority]
cas = 95

[references]
types = ["0x034AEECB", "0xDEADBEEF"]
replace = false
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.scan.strict);
        assert_eq!(config.scan.timeout_secs, 120);
        assert_eq!(config.paths.game, Some(PathBuf::from("/games/sims4")));

        let tables = config.category_tables();
        assert_eq!(tables.category_for(0x12345678), Some(Category::Cas));
        assert_eq!(tables.priority_of(Category::Cas), 95);
        assert_eq!(tables.override_threshold(), 0.6);

        let table = config.reference_table();
        assert!(table.decodes(0x034AEECB));
        assert!(table.decodes(0xDEADBEEF));
        // Extending keeps the built-ins.
        assert!(table.decodes(0x319E4F1D));
    }

    #[test]
    fn test_replace_reference_types() {
        let toml_str = r#"
[references]
types = ["0x0000AAAA"]
replace = true
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        let table = config.reference_table();
        assert!(table.decodes(0x0000AAAA));
        assert!(!table.decodes(0x034AEECB));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_invalid_threshold() {
        let toml_str = r#"
[categories]
override_threshold = 1.5
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());

        let toml_str = r#"
[categories]
override_threshold = 0.0
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_category_name() {
        let toml_str = r#"
[categories.mapping]
"0x12345678" = "furniture"
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_hex_id() {
        let toml_str = r#"
[references]
types = ["not-hex"]
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_path_override() {
        let toml_str = r#"
[paths]
database = "/tmp/custom.db"
"#;
        let config: SimdexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/custom.db"));
    }
}
