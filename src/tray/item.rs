// src/tray/item.rs

//! Tray item grouping and metadata
//!
//! A tray item is a family of files sharing an id stem: the `.trayitem`
//! anchor plus payloads and thumbnails joined to the stem by `.`, `!` or
//! `_`. The anchor carries a small binary header (version, UTF-16
//! display name, kind code) that is parsed defensively, since tray
//! folders routinely contain files from newer game builds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions that belong to a tray item family, anchor excluded.
pub const TRAY_PAYLOAD_EXTENSIONS: &[&str] = &[
    "householdbinary",
    "blueprint",
    "room",
    "hhi",
    "sgi",
    "bpi",
    "midi",
];

/// Payload extensions worth scanning for identity references.
pub(crate) const REFERENCE_EXTENSIONS: &[&str] = &["householdbinary", "blueprint", "room"];

/// Accepted version range for `.trayitem` headers.
const VERSION_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Longest plausible display name, in UTF-16 code units.
const MAX_NAME_UNITS: u32 = 1000;

/// What a tray item saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrayItemKind {
    Household,
    Lot,
    Room,
    Unknown,
}

impl TrayItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrayItemKind::Household => "household",
            TrayItemKind::Lot => "lot",
            TrayItemKind::Room => "room",
            TrayItemKind::Unknown => "unknown",
        }
    }

    /// Kind code stored in the `.trayitem` header.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => TrayItemKind::Household,
            2 => TrayItemKind::Lot,
            3 => TrayItemKind::Room,
            _ => TrayItemKind::Unknown,
        }
    }
}

impl fmt::Display for TrayItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata decoded from a `.trayitem` anchor file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrayItemMeta {
    pub version: u32,
    pub name: String,
    pub kind: TrayItemKind,
}

/// One tray item: the anchor, its sibling files, and the kind derived
/// from which payloads exist.
#[derive(Debug, Clone)]
pub struct TrayItem {
    /// Id stem shared by all of the item's files.
    pub id: String,
    /// Path of the `.trayitem` anchor.
    pub anchor: PathBuf,
    /// Every file of the family, anchor included, sorted by path.
    pub files: Vec<PathBuf>,
    pub kind: TrayItemKind,
}

impl TrayItem {
    /// Build the item for `item_id` by collecting its family from
    /// `tray_path`.
    pub fn from_dir(tray_path: &Path, item_id: &str) -> Result<Self> {
        let anchor = tray_path.join(format!("{}.trayitem", item_id));
        if !anchor.is_file() {
            return Err(Error::NotFound(format!(
                "no .trayitem anchor for item '{}' in {}",
                item_id,
                tray_path.display()
            )));
        }
        let files = collect_family(tray_path, item_id)?;
        let kind = kind_from_files(&files);
        Ok(Self {
            id: item_id.to_string(),
            anchor,
            files,
            kind,
        })
    }

    /// Decode the anchor's metadata header.
    pub fn meta(&self) -> Result<TrayItemMeta> {
        parse_trayitem(&self.anchor)
    }

    /// Display name from the anchor, falling back to the id when the
    /// anchor cannot be decoded.
    pub fn display_name(&self) -> String {
        match self.meta() {
            Ok(meta) if !meta.name.is_empty() => meta.name,
            _ => self.id.clone(),
        }
    }

    /// Payload files worth scanning for references.
    pub fn reference_files(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|path| {
                extension_lower(path)
                    .map(|ext| REFERENCE_EXTENSIONS.contains(&ext.as_str()))
                    .unwrap_or(false)
            })
            .map(|path| path.as_path())
            .collect()
    }
}

/// List every tray item in a folder, sorted by id.
pub fn discover_tray_items(tray_path: &Path) -> Result<Vec<TrayItem>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(tray_path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if extension_lower(&path).as_deref() != Some("trayitem") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();

    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        items.push(TrayItem::from_dir(tray_path, &id)?);
    }
    debug!(
        "Discovered {} tray items in {}",
        items.len(),
        tray_path.display()
    );
    Ok(items)
}

/// Decode a `.trayitem` header: version u32, name length u32, UTF-16LE
/// name, kind code u32, all little-endian. Files that stop after the
/// name still parse, with the kind reported as unknown.
pub fn parse_trayitem(path: &Path) -> Result<TrayItemMeta> {
    let data = std::fs::read(path)?;
    let mut pos = 0usize;

    let version = take_u32(&data, &mut pos).ok_or_else(|| {
        Error::TrayItem(format!("{}: too short for a version field", path.display()))
    })?;
    if !VERSION_RANGE.contains(&version) {
        return Err(Error::TrayItem(format!(
            "{}: implausible version {}",
            path.display(),
            version
        )));
    }

    let name_units = take_u32(&data, &mut pos).ok_or_else(|| {
        Error::TrayItem(format!("{}: missing name length", path.display()))
    })?;
    if name_units > MAX_NAME_UNITS {
        return Err(Error::TrayItem(format!(
            "{}: name length {} out of range",
            path.display(),
            name_units
        )));
    }
    let name_bytes = name_units as usize * 2;
    let raw_name = data.get(pos..pos + name_bytes).ok_or_else(|| {
        Error::TrayItem(format!("{}: truncated name field", path.display()))
    })?;
    pos += name_bytes;
    let units: Vec<u16> = raw_name
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let name = String::from_utf16(&units)
        .map_err(|_| Error::TrayItem(format!("{}: name is not valid UTF-16", path.display())))?;

    let kind = match take_u32(&data, &mut pos) {
        Some(code) => TrayItemKind::from_code(code),
        None => TrayItemKind::Unknown,
    };

    Ok(TrayItemMeta {
        version,
        name,
        kind,
    })
}

fn take_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let end = *pos + 4;
    let bytes = data.get(*pos..end)?;
    *pos = end;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Select the family members for an id: "ID.ext", "ID!suffix.ext" and
/// "ID_suffix.ext" over the known tray extensions.
fn collect_family(tray_path: &Path, item_id: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(tray_path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = extension_lower(&path) else {
            continue;
        };
        if ext != "trayitem" && !TRAY_PAYLOAD_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(rest) = name.strip_prefix(item_id) else {
            continue;
        };
        if rest.starts_with('.') || rest.starts_with('!') || rest.starts_with('_') {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Derive the item kind from which payload files exist.
fn kind_from_files(files: &[PathBuf]) -> TrayItemKind {
    let has = |wanted: &str| {
        files
            .iter()
            .any(|path| extension_lower(path).as_deref() == Some(wanted))
    };
    if has("householdbinary") {
        TrayItemKind::Household
    } else if has("blueprint") {
        TrayItemKind::Lot
    } else if has("room") {
        TrayItemKind::Room
    } else {
        TrayItemKind::Unknown
    }
}
