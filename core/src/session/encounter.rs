//! Encounter data model: entities, attacker statistics, damage events.

use chrono::NaiveDateTime;
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

use crate::protocol::DamageKind;

/// Entity classification from the low 16 bits of a raw wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityType {
    /// Unrecognized low-16 value; never counted as an attacker.
    #[default]
    Error,
    Monster,
    Player,
}

impl EntityType {
    pub fn from_raw_id(raw_id: u64) -> Self {
        match raw_id & 0xffff {
            64 => Self::Monster,
            640 => Self::Player,
            _ => Self::Error,
        }
    }
}

/// The stable identifier used everywhere above the parser.
pub fn shifted_uid(raw_id: u64) -> u64 {
    raw_id >> 16
}

/// Per-encounter knowledge about one entity. Fields are set, never
/// cleared; a valid name is never replaced by a worse one.
#[derive(Debug, Clone, Default)]
pub struct EntityInfo {
    pub entity_type: EntityType,
    pub name: Option<String>,
    pub class_id: Option<u32>,
    pub spec_name: Option<String>,
    pub ability_score: Option<u64>,
}

/// One damage/heal application as stored in the encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    pub attacker_uid: u64,
    pub target_uid: u64,
    pub amount: u64,
    pub kind: DamageKind,
    pub is_crit: bool,
    pub is_miss: bool,
    pub timestamp: NaiveDateTime,
}

/// Accumulated statistics for one character attacker.
#[derive(Debug, Clone, Default)]
pub struct AttackerStats {
    pub uid: u64,
    pub name: Option<String>,
    pub class_id: Option<u32>,
    pub spec_name: Option<String>,
    pub ability_score: Option<u64>,
    pub total_damage: u64,
    pub damage_count: u64,
    pub crit_count: u64,
    pub healing_done: u64,
    pub skill_ids: HashSet<u32>,
    pub damage_by_skill: HashMap<u32, u64>,
    pub healing_by_skill: HashMap<u32, u64>,
}

impl AttackerStats {
    pub fn new(uid: u64) -> Self {
        Self {
            uid,
            ..Self::default()
        }
    }

    /// Damage per second over the given encounter duration.
    pub fn dps(&self, duration_seconds: f64) -> f64 {
        if duration_seconds <= 0.0 {
            return 0.0;
        }
        self.total_damage as f64 / duration_seconds
    }
}

/// A bounded interval of combat with at least one Normal or Heal event.
#[derive(Debug, Clone)]
pub struct Encounter {
    pub id: u64,
    pub start_time: NaiveDateTime,
    pub last_activity_time: NaiveDateTime,
    pub is_active: bool,
    pub attackers: HashMap<u64, AttackerStats>,
    pub all_events: VecDeque<DamageEvent>,
    pub entities: HashMap<u64, EntityInfo>,
}

impl Encounter {
    pub fn new(id: u64, now: NaiveDateTime) -> Self {
        Self {
            id,
            start_time: now,
            last_activity_time: now,
            is_active: true,
            attackers: HashMap::new(),
            all_events: VecDeque::new(),
            entities: HashMap::new(),
        }
    }

    /// Seconds elapsed; for a finished encounter the clock stops at the
    /// last activity.
    pub fn duration_seconds(&self, now: NaiveDateTime) -> i64 {
        let end = if self.is_active {
            now
        } else {
            self.last_activity_time
        };
        end.signed_duration_since(self.start_time).num_seconds().max(0)
    }

    pub fn total_damage(&self) -> u64 {
        self.attackers.values().map(|a| a.total_damage).sum()
    }

    pub fn entity_mut(&mut self, uid: u64) -> &mut EntityInfo {
        self.entities.entry(uid).or_default()
    }

    /// Close the encounter. The activity timestamp is rewound to the
    /// newest stored event so the duration excludes the idle tail.
    pub fn finalize(&mut self) {
        self.is_active = false;
        self.last_activity_time = self
            .all_events
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(self.start_time);
    }
}
