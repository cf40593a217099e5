//! Serializable encounter snapshots for consumers.
//!
//! Signals carry these instead of the live [`Encounter`] so subscribers
//! never reach into engine state. Attackers are ordered by damage done.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::encounter::{AttackerStats, Encounter};

#[derive(Debug, Clone, Serialize)]
pub struct AttackerSummary {
    pub uid: u64,
    pub name: Option<String>,
    pub class_id: Option<u32>,
    pub spec_name: Option<String>,
    pub ability_score: Option<u64>,
    pub total_damage: u64,
    pub damage_count: u64,
    pub crit_count: u64,
    pub healing_done: u64,
    pub dps: f64,
    /// Stable ordering for display and JSON output.
    pub damage_by_skill: BTreeMap<u32, u64>,
    pub healing_by_skill: BTreeMap<u32, u64>,
}

impl AttackerSummary {
    fn from_stats(stats: &AttackerStats, duration_seconds: f64) -> Self {
        Self {
            uid: stats.uid,
            name: stats.name.clone(),
            class_id: stats.class_id,
            spec_name: stats.spec_name.clone(),
            ability_score: stats.ability_score,
            total_damage: stats.total_damage,
            damage_count: stats.damage_count,
            crit_count: stats.crit_count,
            healing_done: stats.healing_done,
            dps: stats.dps(duration_seconds),
            damage_by_skill: stats.damage_by_skill.iter().map(|(k, v)| (*k, *v)).collect(),
            healing_by_skill: stats.healing_by_skill.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EncounterSummary {
    pub encounter_id: u64,
    pub start_time: NaiveDateTime,
    pub last_activity_time: NaiveDateTime,
    pub is_active: bool,
    pub duration_seconds: i64,
    pub total_damage: u64,
    pub event_count: usize,
    pub attackers: Vec<AttackerSummary>,
}

impl EncounterSummary {
    pub fn from_encounter(enc: &Encounter, now: NaiveDateTime) -> Self {
        let duration = enc.duration_seconds(now);
        let mut attackers: Vec<_> = enc
            .attackers
            .values()
            .map(|a| AttackerSummary::from_stats(a, duration as f64))
            .collect();
        attackers.sort_by(|a, b| b.total_damage.cmp(&a.total_damage).then(a.uid.cmp(&b.uid)));
        Self {
            encounter_id: enc.id,
            start_time: enc.start_time,
            last_activity_time: enc.last_activity_time,
            is_active: enc.is_active,
            duration_seconds: duration,
            total_damage: enc.total_damage(),
            event_count: enc.all_events.len(),
            attackers,
        }
    }
}
