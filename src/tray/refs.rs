// src/tray/refs.rs

//! Identity reference extraction from tray payloads
//!
//! Tray payload formats are undocumented and change between game builds,
//! so references are recovered with a sliding 16-byte window over the
//! raw bytes: u32 type, u32 group, u64 instance, little-endian, at any
//! byte alignment. A window counts as a reference only when a decoder is
//! registered for its type id and the instance is non-zero, which keeps
//! the false-positive rate negligible in practice. Files that cannot be
//! read yield an empty set plus a note, never an error; a save with one
//! corrupt thumbnail should still classify.

use crate::dbpf::Package;
use crate::tgi::Tgi;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::item::REFERENCE_EXTENSIONS;

/// Window size: u32 type + u32 group + u64 instance.
const WINDOW: usize = 16;

/// Types with a registered reference decoder.
const DEFAULT_REFERENCE_TYPES: &[u32] = &[
    0x034AEECB, // CAS part
    0x319E4F1D, // object definition
    0x00B2D882, // DDS image
    0xC0DB5AE7, // catalog object
    0x025ED6F4, // simdata
    0x545AC67A, // combined tuning
];

/// Which resource types have a reference decoder. Types outside the
/// table produce no references; that is expected coverage, not an error.
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    types: HashSet<u32>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_TYPES.iter().copied())
    }
}

impl ReferenceTable {
    pub fn new(types: impl IntoIterator<Item = u32>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    pub fn extend(&mut self, types: impl IntoIterator<Item = u32>) {
        self.types.extend(types);
    }

    pub fn decodes(&self, type_id: u32) -> bool {
        self.types.contains(&type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// A non-fatal problem hit while extracting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionNote {
    pub path: String,
    pub reason: String,
}

/// Everything recovered from one item: the references its payloads
/// mention, the identities its own packages define, and per-file notes
/// for anything skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub references: BTreeSet<Tgi>,
    pub defined: BTreeSet<Tgi>,
    pub notes: Vec<ExtractionNote>,
}

impl Extraction {
    /// Some input files were skipped; the sets cover only what was read.
    pub fn is_partial(&self) -> bool {
        !self.notes.is_empty()
    }
}

fn decode_window(table: &ReferenceTable, window: &[u8]) -> Option<Tgi> {
    let type_id = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
    if !table.decodes(type_id) {
        return None;
    }
    let group_id = u32::from_le_bytes([window[4], window[5], window[6], window[7]]);
    let instance_id = u64::from_le_bytes([
        window[8], window[9], window[10], window[11], window[12], window[13], window[14],
        window[15],
    ]);
    if instance_id == 0 {
        return None;
    }
    Some(Tgi::new(type_id, group_id, instance_id))
}

/// Slide over `data` one byte at a time, collecting decodable windows.
fn scan_bytes(table: &ReferenceTable, data: &[u8]) -> BTreeSet<Tgi> {
    let mut found = BTreeSet::new();
    if data.len() < WINDOW {
        return found;
    }
    for start in 0..=(data.len() - WINDOW) {
        if let Some(tgi) = decode_window(table, &data[start..start + WINDOW]) {
            found.insert(tgi);
        }
    }
    found
}

/// Scan one payload file for references.
pub fn extract_references(table: &ReferenceTable, path: &Path) -> std::io::Result<BTreeSet<Tgi>> {
    let data = std::fs::read(path)?;
    let found = scan_bytes(table, &data);
    debug!(
        "Extracted {} references from {} ({} bytes)",
        found.len(),
        path.display(),
        data.len()
    );
    Ok(found)
}

/// Extract everything from an arbitrary set of item files.
///
/// `.package` files contribute defined identities through the container
/// parser; household, blueprint, and room payloads contribute scanned
/// references. Thumbnails and metadata are skipped. Per-file failures
/// become notes.
pub fn extract_item(table: &ReferenceTable, files: &[PathBuf]) -> Extraction {
    let mut extraction = Extraction::default();
    for path in files {
        let Some(ext) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
        else {
            continue;
        };

        if ext == "package" {
            match Package::open(path) {
                Ok(package) => {
                    extraction
                        .defined
                        .extend(package.entries().iter().map(|e| e.tgi));
                }
                Err(err) => extraction.notes.push(ExtractionNote {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }),
            }
        } else if REFERENCE_EXTENSIONS.contains(&ext.as_str()) {
            match extract_references(table, path) {
                Ok(references) => extraction.references.extend(references),
                Err(err) => extraction.notes.push(ExtractionNote {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }),
            }
        }
    }
    extraction
}
