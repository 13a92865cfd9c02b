// src/tray/mod.rs

//! Tray item discovery and reference extraction
//!
//! Saved households, lots, and rooms live in the game's Tray folder as
//! families of files sharing an id stem. Their payloads embed identity
//! references to the content they were built with; this module groups
//! the families, decodes their metadata anchors, and recovers the
//! references for classification.

mod item;
mod refs;

pub use item::{
    TRAY_PAYLOAD_EXTENSIONS, TrayItem, TrayItemKind, TrayItemMeta, discover_tray_items,
    parse_trayitem,
};
pub use refs::{
    Extraction, ExtractionNote, ReferenceTable, extract_item, extract_references,
};
