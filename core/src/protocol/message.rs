//! Lenient decoders for the handful of game messages the pipeline needs.
//!
//! Every parser here follows the same contract: iterate field by field,
//! decode a field only when both the number and the wire type match, and
//! `safe_skip` everything else. Decode failures are swallowed at the
//! field boundary, so any byte sequence yields a (possibly empty)
//! message and never an error. The servers ship new builds without
//! notice; surviving them is more important than strictness.

use crate::wire::{PbReader, WireType};

/// Damage classification carried in `SyncDamageInfo.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    Normal,
    Miss,
    Heal,
    Immune,
    Fall,
    Absorbed,
    Unknown(u64),
}

impl DamageKind {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::Normal,
            1 => Self::Miss,
            2 => Self::Heal,
            3 => Self::Immune,
            4 => Self::Fall,
            5 => Self::Absorbed,
            other => Self::Unknown(other),
        }
    }

    /// Only Normal and Heal keep an encounter alive.
    pub fn extends_encounter(self) -> bool {
        matches!(self, Self::Normal | Self::Heal)
    }
}

/// One damage/heal application. All fields optional; consumers treat
/// absent as unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDamageInfo {
    pub damage_source: Option<u64>,
    pub is_miss: Option<bool>,
    pub is_crit: Option<bool>,
    pub kind: Option<DamageKind>,
    pub type_flag: Option<u64>,
    pub value: Option<u64>,
    pub actual_value: Option<u64>,
    pub lucky_value: Option<u64>,
    pub hp_lessen_value: Option<u64>,
    pub shield_lessen_value: Option<u64>,
    pub attacker_uuid: Option<u64>,
    /// Skill id on the wire; historical name kept from the protocol.
    pub owner_id: Option<u64>,
    pub owner_level: Option<u64>,
    pub owner_stage: Option<u64>,
    pub hit_event_id: Option<u64>,
    pub is_normal: Option<bool>,
    pub is_dead: Option<bool>,
    pub property: Option<u64>,
    pub top_summoner_id: Option<u64>,
    pub is_rainbow: Option<bool>,
    pub damage_mode: Option<u64>,
}

impl SyncDamageInfo {
    /// Crit if the server says so, or if bit 0 of the type flag is set.
    pub fn crit(&self) -> bool {
        self.is_crit.unwrap_or(false) || self.type_flag.is_some_and(|f| f & 0x01 != 0)
    }

    pub fn parse(data: &[u8]) -> Self {
        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            if wire_type != WireType::Varint {
                r.safe_skip_last_field();
                continue;
            }
            let Ok(v) = r.read_varint() else {
                r.safe_skip_last_field();
                continue;
            };
            match field {
                1 => msg.damage_source = Some(v),
                2 => msg.is_miss = Some(v != 0),
                3 => msg.is_crit = Some(v != 0),
                4 => msg.kind = Some(DamageKind::from_raw(v)),
                5 => msg.type_flag = Some(v),
                6 => msg.value = Some(v),
                7 => msg.actual_value = Some(v),
                8 => msg.lucky_value = Some(v),
                9 => msg.hp_lessen_value = Some(v),
                10 => msg.shield_lessen_value = Some(v),
                11 => msg.attacker_uuid = Some(v),
                12 => msg.owner_id = Some(v),
                13 => msg.owner_level = Some(v),
                14 => msg.owner_stage = Some(v),
                15 => msg.hit_event_id = Some(v),
                16 => msg.is_normal = Some(v != 0),
                17 => msg.is_dead = Some(v != 0),
                18 => msg.property = Some(v),
                21 => msg.top_summoner_id = Some(v),
                24 => msg.is_rainbow = Some(v != 0),
                25 => msg.damage_mode = Some(v),
                _ => {}
            }
        }
        msg
    }
}

/// A single attribute blob attached to an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attr {
    pub id: u64,
    pub raw_data: Vec<u8>,
}

impl Attr {
    fn parse(data: &[u8]) -> Self {
        let mut attr = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        attr.id = v;
                    }
                }
                (2, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        attr.raw_data = bytes.to_vec();
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        attr
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrCollection {
    pub uuid: Option<u64>,
    pub attrs: Vec<Attr>,
}

impl AttrCollection {
    pub fn parse(data: &[u8]) -> Self {
        let mut coll = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        coll.uuid = Some(v);
                    }
                }
                (2, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        coll.attrs.push(Attr::parse(bytes));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        coll
    }

    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.attrs.is_empty()
    }
}

/// Damage bundle inside an AOI delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillEffect {
    pub uuid: Option<u64>,
    pub damages: Vec<SyncDamageInfo>,
    pub total_damage: Option<u64>,
}

impl SkillEffect {
    fn parse(data: &[u8]) -> Self {
        let mut effect = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        effect.uuid = Some(v);
                    }
                }
                (2, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        effect.damages.push(SyncDamageInfo::parse(bytes));
                    }
                }
                (3, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        effect.total_damage = Some(v);
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        effect
    }
}

/// Per-entity delta: identity, optional attribute changes, and the
/// damage that entity received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AoiSyncDelta {
    pub uuid: Option<u64>,
    pub attrs: Option<AttrCollection>,
    pub skill_effect: Option<SkillEffect>,
}

impl AoiSyncDelta {
    pub fn parse(data: &[u8]) -> Self {
        let mut delta = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        delta.uuid = Some(v);
                    }
                }
                (6, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        delta.attrs = Some(AttrCollection::parse(bytes));
                    }
                }
                (7, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        delta.skill_effect = Some(SkillEffect::parse(bytes));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        delta
    }
}

/// `SyncNearDeltaInfo`: deltas for everything near the local player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncNearDeltaInfo {
    pub deltas: Vec<AoiSyncDelta>,
}

impl SyncNearDeltaInfo {
    pub fn parse(data: &[u8]) -> Self {
        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        msg.deltas.push(AoiSyncDelta::parse(bytes));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        msg
    }
}

/// `SyncToMeDeltaInfo`: the local player's own delta, wrapped once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncToMeDeltaInfo {
    pub base_delta: Option<AoiSyncDelta>,
}

impl SyncToMeDeltaInfo {
    pub fn parse(data: &[u8]) -> Self {
        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        let inner = parse_to_me_container(bytes);
                        if inner.is_some() {
                            msg.base_delta = inner;
                        }
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        msg
    }
}

fn parse_to_me_container(data: &[u8]) -> Option<AoiSyncDelta> {
    let mut base_delta = None;
    let mut r = PbReader::new(data);
    loop {
        let (field, wire_type) = r.read_tag();
        if field == 0 {
            break;
        }
        match (field, wire_type) {
            (2, WireType::LengthDelimited) => {
                if let Ok(bytes) = r.read_len_delimited() {
                    base_delta = Some(AoiSyncDelta::parse(bytes));
                }
            }
            _ => r.safe_skip_last_field(),
        }
    }
    base_delta
}

/// One entity in an entity sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncEntity {
    pub uuid: Option<u64>,
    pub entity_type: Option<u64>,
    pub attrs: Option<AttrCollection>,
}

impl SyncEntity {
    pub fn parse(data: &[u8]) -> Self {
        let mut entity = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        entity.uuid = Some(v);
                    }
                }
                (2, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        entity.entity_type = Some(v);
                    }
                }
                (3, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        entity.attrs = Some(AttrCollection::parse(bytes));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        entity
    }

    /// Whether a speculative parse produced anything worth keeping.
    fn has_identity(&self) -> bool {
        self.uuid.is_some() || self.attrs.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// `SyncNearEntities`: entities entering the local player's view.
///
/// Field 1 is the documented entity list. Unknown length-delimited
/// fields are speculatively parsed as entities, and failing that as a
/// nested entity list; some server builds move the list without
/// renumbering anything else. Silent on failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncNearEntities {
    pub entities: Vec<SyncEntity>,
}

impl SyncNearEntities {
    pub fn parse(data: &[u8]) -> Self {
        Self::parse_with_depth(data, 0)
    }

    fn parse_with_depth(data: &[u8], depth: u32) -> Self {
        const MAX_SPECULATIVE_DEPTH: u32 = 4;

        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        msg.entities.push(SyncEntity::parse(bytes));
                    }
                }
                (_, WireType::LengthDelimited) => {
                    let Ok(bytes) = r.read_len_delimited() else {
                        continue;
                    };
                    let speculative = SyncEntity::parse(bytes);
                    if speculative.has_identity() {
                        msg.entities.push(speculative);
                    } else if depth < MAX_SPECULATIVE_DEPTH {
                        let nested = Self::parse_with_depth(bytes, depth + 1);
                        msg.entities
                            .extend(nested.entities.into_iter().filter(SyncEntity::has_identity));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        msg
    }
}

/// `CharBaseInfo` inside a character container sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharBaseInfo {
    pub char_id: Option<u64>,
    pub name: Option<String>,
    pub fight_point: Option<u64>,
}

impl CharBaseInfo {
    fn parse(data: &[u8]) -> Self {
        let mut info = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        info.char_id = Some(v);
                    }
                }
                (5, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited()
                        && let Ok(s) = std::str::from_utf8(bytes)
                    {
                        info.name = Some(s.to_owned());
                    }
                }
                (35, WireType::Varint) => {
                    if let Ok(v) = r.read_varint() {
                        info.fight_point = Some(v);
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        info
    }
}

fn parse_profession_id(data: &[u8]) -> Option<u64> {
    let mut id = None;
    let mut r = PbReader::new(data);
    loop {
        let (field, wire_type) = r.read_tag();
        if field == 0 {
            break;
        }
        match (field, wire_type) {
            // Current profession appears at 1 or 2 depending on build.
            (1 | 2, WireType::Varint) => {
                if let Ok(v) = r.read_varint() {
                    id = Some(v);
                }
            }
            _ => r.safe_skip_last_field(),
        }
    }
    id
}

/// `CharSerialize`: full character snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharSerialize {
    pub base: Option<CharBaseInfo>,
    pub profession_id: Option<u64>,
}

impl CharSerialize {
    fn parse(data: &[u8]) -> Self {
        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (2, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        msg.base = Some(CharBaseInfo::parse(bytes));
                    }
                }
                (61, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        msg.profession_id = parse_profession_id(bytes);
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        msg
    }
}

/// `SyncContainerData`: the local player's character container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncContainerData {
    pub char_serialize: Option<CharSerialize>,
}

impl SyncContainerData {
    pub fn parse(data: &[u8]) -> Self {
        let mut msg = Self::default();
        let mut r = PbReader::new(data);
        loop {
            let (field, wire_type) = r.read_tag();
            if field == 0 {
                break;
            }
            match (field, wire_type) {
                (1, WireType::LengthDelimited) => {
                    if let Ok(bytes) = r.read_len_delimited() {
                        msg.char_serialize = Some(CharSerialize::parse(bytes));
                    }
                }
                _ => r.safe_skip_last_field(),
            }
        }
        msg
    }
}
