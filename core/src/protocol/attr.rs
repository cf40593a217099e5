//! Interpretation of entity attribute blobs.
//!
//! Attribute payloads are opaque byte strings whose layout differs by
//! attribute id and, for names, by server build. The name salvage chain
//! is a prioritized candidate list: the first candidate that passes the
//! validity filter wins, and invalid candidates are never kept.

use tracing::trace;

use super::message::AttrCollection;
use crate::wire::{PbReader, WireType};

pub const ATTR_NAME: u64 = 0x01;
pub const ATTR_ENTITY_ID: u64 = 0x0a;
pub const ATTR_PROFESSION_ID: u64 = 0xdc;
pub const ATTR_FIGHT_POINT: u64 = 0x272e;
pub const ATTR_CUR_HP: u64 = 0x2c2e;
pub const ATTR_MAX_HP: u64 = 0x2c38;

/// Decoded view over an [`AttrCollection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAttrs {
    pub name: Option<String>,
    pub class_id: Option<u32>,
    pub ability_score: Option<u64>,
    pub cur_hp: Option<u64>,
    pub max_hp: Option<u64>,
    pub entity_id: Option<u64>,
}

impl EntityAttrs {
    pub fn from_collection(coll: &AttrCollection) -> Self {
        let mut out = Self::default();
        for attr in &coll.attrs {
            match attr.id {
                ATTR_NAME => {
                    if out.name.is_none() {
                        out.name = salvage_name(&attr.raw_data, 0);
                    }
                }
                ATTR_PROFESSION_ID => {
                    out.class_id = leading_varint(&attr.raw_data).map(|v| v as u32);
                }
                ATTR_FIGHT_POINT => {
                    out.ability_score = leading_varint(&attr.raw_data);
                }
                ATTR_CUR_HP => {
                    out.cur_hp = leading_varint(&attr.raw_data);
                }
                ATTR_MAX_HP => {
                    out.max_hp = leading_varint(&attr.raw_data);
                }
                ATTR_ENTITY_ID => {
                    out.entity_id = leading_varint(&attr.raw_data);
                }
                other => {
                    trace!(attr_id = other, len = attr.raw_data.len(), "unhandled attr");
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn leading_varint(data: &[u8]) -> Option<u64> {
    let mut r = PbReader::new(data);
    r.read_varint().ok()
}

/// Display-name validity filter.
///
/// Accepts only plausible player names: non-blank, at most 64 chars, at
/// least one letter, at least half of the characters drawn from
/// letters/digits/whitespace/`-_.'`, and never anything containing the
/// "Unknown" placeholder the servers emit for unresolved entities.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }
    let total = trimmed.chars().count();
    if total > 64 {
        return false;
    }
    // Embedded NULs and other controls betray a wrong decode offset.
    if trimmed.chars().any(char::is_control) {
        return false;
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    let plausible = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.' | '\''))
        .count();
    if plausible * 2 < total {
        return false;
    }
    !trimmed.to_lowercase().contains("unknown")
}

const MAX_NAME_RECURSION: u32 = 3;

/// Multi-encoding, multi-offset name salvage.
///
/// Candidate order: raw bytes minus the leading length byte as UTF-8,
/// then offsets 0..4 as UTF-8 / UTF-16LE / UTF-16BE, then every
/// length-delimited field of the blob reinterpreted as a nested
/// attribute payload.
pub fn salvage_name(raw: &[u8], depth: u32) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if raw.len() > 1
        && let Some(name) = accept_utf8(&raw[1..])
    {
        return Some(name);
    }

    for offset in 0..4usize {
        if offset >= raw.len() {
            break;
        }
        let slice = &raw[offset..];
        if let Some(name) = accept_utf8(slice) {
            return Some(name);
        }
        if let Some(name) = accept_utf16(slice, encoding_rs::UTF_16LE) {
            return Some(name);
        }
        if let Some(name) = accept_utf16(slice, encoding_rs::UTF_16BE) {
            return Some(name);
        }
    }

    if depth < MAX_NAME_RECURSION {
        if let Some(name) = salvage_from_nested(raw, depth + 1) {
            return Some(name);
        }
    }

    None
}

fn normalize(candidate: &str) -> Option<String> {
    let cleaned = candidate.trim_matches('\0').trim();
    if is_valid_name(cleaned) {
        Some(cleaned.to_owned())
    } else {
        None
    }
}

fn accept_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().and_then(normalize)
}

fn accept_utf16(bytes: &[u8], encoding: &'static encoding_rs::Encoding) -> Option<String> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return None;
    }
    normalize(&decoded)
}

/// Treat the blob as a protobuf message and salvage from any
/// length-delimited field inside it.
fn salvage_from_nested(raw: &[u8], depth: u32) -> Option<String> {
    let mut r = PbReader::new(raw);
    loop {
        let (field, wire_type) = r.read_tag();
        if field == 0 {
            return None;
        }
        match wire_type {
            WireType::LengthDelimited => {
                if let Ok(bytes) = r.read_len_delimited()
                    && let Some(name) = salvage_name(bytes, depth)
                {
                    return Some(name);
                }
            }
            _ => r.safe_skip_last_field(),
        }
    }
}
