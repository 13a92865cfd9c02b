// src/tgi.rs

//! Resource identity triples
//!
//! Every resource in a package is addressed by a (type, group, instance)
//! triple: a 32-bit type id, a 32-bit group id, and a 64-bit instance id.
//! The triple is the join key between partitions, the dedup key for
//! extracted references, and the grouping key for conflict detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully-qualified resource identity.
///
/// Ordering is lexicographic over (type, group, instance), which gives
/// deterministic iteration everywhere identities are collected in sets
/// or used as map keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tgi {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u64,
}

impl Tgi {
    pub fn new(type_id: u32, group_id: u32, instance_id: u64) -> Self {
        Self {
            type_id,
            group_id,
            instance_id,
        }
    }

    /// Widen to the signed column types SQLite stores. The instance id
    /// regularly exceeds `i64::MAX`, so the cast keeps the bit pattern
    /// rather than the numeric value.
    pub(crate) fn to_sql(self) -> (i64, i64, i64) {
        (
            self.type_id as i64,
            self.group_id as i64,
            self.instance_id as i64,
        )
    }

    /// Inverse of [`Tgi::to_sql`].
    pub(crate) fn from_sql(type_id: i64, group_id: i64, instance_id: i64) -> Self {
        Self {
            type_id: type_id as u32,
            group_id: group_id as u32,
            instance_id: instance_id as u64,
        }
    }
}

impl fmt::Display for Tgi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}:{:08X}:{:016X}",
            self.type_id, self.group_id, self.instance_id
        )
    }
}

impl FromStr for Tgi {
    type Err = String;

    /// Parse "TYPE:GROUP:INSTANCE" with hex fields, `0x` prefixes optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(format!(
                "Expected TYPE:GROUP:INSTANCE hex triple, got '{}'",
                s
            ));
        }
        let type_id = parse_hex_u32(parts[0])
            .ok_or_else(|| format!("Invalid type id '{}' in '{}'", parts[0], s))?;
        let group_id = parse_hex_u32(parts[1])
            .ok_or_else(|| format!("Invalid group id '{}' in '{}'", parts[1], s))?;
        let instance_id = parse_hex_u64(parts[2])
            .ok_or_else(|| format!("Invalid instance id '{}' in '{}'", parts[2], s))?;
        Ok(Self::new(type_id, group_id, instance_id))
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    let trimmed = s.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

pub(crate) fn parse_hex_u32(s: &str) -> Option<u32> {
    u32::from_str_radix(strip_hex_prefix(s), 16).ok()
}

pub(crate) fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(strip_hex_prefix(s), 16).ok()
}
