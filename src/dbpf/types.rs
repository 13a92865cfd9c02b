// src/dbpf/types.rs

//! Resource type registry
//!
//! Maps the well-known 32-bit resource type ids to display names.
//! Unrecognised ids render as `Unknown_XXXXXXXX`; the raw id is kept
//! everywhere, so the registry is cosmetic and deliberately incomplete.

/// Display name for a known resource type id.
pub fn type_name(type_id: u32) -> Option<&'static str> {
    match type_id {
        0x034AEECB => Some("CASPart"),
        0x0355E0A6 => Some("BodyBlendData"),
        0x0333406C => Some("Tuning"),
        0x025ED6F4 => Some("SimData"),
        0x545AC67A => Some("CombinedTuning"),
        0x220557DA => Some("StringTable"),
        0x00B2D882 => Some("DDSImage"),
        0x3C1AF1F2 => Some("PNGImage"),
        0x2F7D0004 => Some("DSTImage"),
        0x015A1849 => Some("Geometry"),
        0x00AE6C67 => Some("BoneData"),
        0x8EAF13DE => Some("Rig"),
        0xC0DB5AE7 => Some("CatalogObject"),
        0x319E4F1D => Some("ObjectDefinition"),
        0x02D5DF13 => Some("AnimationClip"),
        0x01EEF63A => Some("AuditoryData"),
        0x3C2A8647 => Some("Thumbnail"),
        0x5B282D45 => Some("ThumbnailAlt"),
        0x9C07855E => Some("PythonArchive"),
        _ => None,
    }
}

/// Display name, falling back to `Unknown_XXXXXXXX` for ids outside the
/// registry.
pub fn describe(type_id: u32) -> String {
    match type_name(type_id) {
        Some(name) => name.to_string(),
        None => format!("Unknown_{:08X}", type_id),
    }
}
