//! The encounter engine.
//!
//! Consumes decoded `(opcode, payload)` records from the capture side,
//! classifies attackers and targets, maintains per-skill totals, infers
//! specs from observed skill ids, and drives the idle-timeout state
//! machine. All mutation happens behind the service's engine mutex;
//! this type itself is single-threaded.

pub mod combat_state;

#[cfg(test)]
mod combat_state_tests;

pub use combat_state::{advance_combat_state, apply_settings_change, tick_combat_state};

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use sonar_types::MeterSettings;
use tracing::{debug, trace};

use crate::capture::DecodedRecord;
use crate::events::{EventBus, GameSignal};
use crate::game_data::{detect_spec, spec_for_skill};
use crate::protocol::{
    AoiSyncDelta, AttrCollection, DamageKind, EntityAttrs, Opcode, SyncContainerData,
    SyncDamageInfo, SyncEntity, SyncNearDeltaInfo, SyncNearEntities, SyncToMeDeltaInfo,
};
use crate::session::{
    AttackerStats, DamageEvent, EncounterSummary, EntityType, PlayerCache, PlayerUpdate,
    SessionCache, shifted_uid,
};

pub struct EventProcessor {
    cache: SessionCache,
    players: Arc<PlayerCache>,
    settings: MeterSettings,
    bus: EventBus,
}

impl EventProcessor {
    pub fn new(players: Arc<PlayerCache>, settings: MeterSettings, bus: EventBus) -> Self {
        Self {
            cache: SessionCache::new(),
            players,
            settings: settings.clamped(),
            bus,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn settings(&self) -> MeterSettings {
        self.settings
    }

    pub fn handle_record(&mut self, record: &DecodedRecord) {
        self.handle_record_at(record, Local::now().naive_local());
    }

    pub fn handle_record_at(&mut self, record: &DecodedRecord, now: NaiveDateTime) {
        match record.opcode {
            Opcode::ServerChange => {
                debug!("active game server changed");
                self.bus.emit(GameSignal::ServerChanged);
            }
            Opcode::SyncServerTime => {
                trace!("server time sync");
            }
            Opcode::SyncNearDeltaInfo => {
                let msg = SyncNearDeltaInfo::parse(&record.payload);
                for delta in &msg.deltas {
                    self.apply_delta(delta, now);
                }
            }
            Opcode::SyncToMeDeltaInfo => {
                let msg = SyncToMeDeltaInfo::parse(&record.payload);
                if let Some(delta) = &msg.base_delta {
                    self.apply_delta(delta, now);
                }
            }
            Opcode::SyncNearEntities => {
                let msg = SyncNearEntities::parse(&record.payload);
                for entity in &msg.entities {
                    self.apply_entity(entity);
                }
            }
            Opcode::SyncContainerData => {
                let msg = SyncContainerData::parse(&record.payload);
                self.apply_container(&msg);
            }
        }
    }

    /// Periodic idle-timeout check.
    pub fn tick(&mut self) {
        self.tick_at(Local::now().naive_local());
    }

    pub fn tick_at(&mut self, now: NaiveDateTime) {
        for signal in tick_combat_state(&mut self.cache, &self.settings, now) {
            self.bus.emit(signal);
        }
    }

    /// Swap in new settings and react immediately.
    pub fn update_settings(&mut self, settings: MeterSettings) {
        self.update_settings_at(settings, Local::now().naive_local());
    }

    pub fn update_settings_at(&mut self, settings: MeterSettings, now: NaiveDateTime) {
        self.settings = settings.clamped();
        for signal in apply_settings_change(&mut self.cache, &self.settings, now) {
            self.bus.emit(signal);
        }
    }

    /// Move the encounter selection; emits `SelectedEncounterChanged`.
    pub fn select_encounter(&mut self, id: Option<u64>) {
        self.select_encounter_at(id, Local::now().naive_local());
    }

    pub fn select_encounter_at(&mut self, id: Option<u64>, now: NaiveDateTime) {
        if self.cache.select(id) {
            let summary = self
                .cache
                .selected_encounter()
                .map(|enc| Arc::new(EncounterSummary::from_encounter(enc, now)));
            self.bus.emit(GameSignal::SelectedEncounterChanged(summary));
        }
    }

    pub fn current_summary_at(&self, now: NaiveDateTime) -> Option<EncounterSummary> {
        self.cache
            .current()
            .map(|enc| EncounterSummary::from_encounter(enc, now))
    }

    pub fn history_summaries_at(&self, now: NaiveDateTime) -> Vec<EncounterSummary> {
        self.cache
            .history()
            .map(|enc| EncounterSummary::from_encounter(enc, now))
            .collect()
    }

    // --- Record application ---

    fn apply_delta(&mut self, delta: &AoiSyncDelta, now: NaiveDateTime) {
        let raw_target = delta
            .uuid
            .or_else(|| delta.attrs.as_ref().and_then(|a| a.uuid));

        if let Some(attrs) = &delta.attrs
            && let Some(raw) = raw_target
        {
            self.apply_attrs(raw, attrs);
        }

        if let Some(effect) = &delta.skill_effect {
            let target = raw_target.or(effect.uuid).unwrap_or(0);
            for damage in &effect.damages {
                self.apply_damage(target, damage, now);
            }
        }
    }

    /// The §-by-§ damage path: attacker resolution, classification,
    /// encounter bookkeeping, stats, spec inference.
    fn apply_damage(&mut self, target_raw: u64, damage: &SyncDamageInfo, now: NaiveDateTime) {
        let Some(attacker_raw) = damage.top_summoner_id.or(damage.attacker_uuid) else {
            trace!("damage without attacker; dropped");
            return;
        };
        let attacker_uid = shifted_uid(attacker_raw);
        let target_uid = shifted_uid(target_raw);
        let attacker_type = EntityType::from_raw_id(attacker_raw);
        let kind = damage.kind.unwrap_or(DamageKind::Normal);

        match kind {
            DamageKind::Normal | DamageKind::Heal => {}
            // Misses are recorded against a live encounter but never
            // open one or refresh the idle timer.
            DamageKind::Miss => {
                if self.cache.needs_new_encounter() {
                    return;
                }
            }
            other => {
                trace!(?other, "ignoring non-combat damage kind");
                return;
            }
        }

        let mut signals = Vec::new();
        if kind.extends_encounter() {
            signals.extend(advance_combat_state(&mut self.cache, now));
        }

        let amount = damage.value.unwrap_or(0);
        let skill_id = damage.owner_id.unwrap_or(0) as u32;
        let is_crit = damage.crit();
        let is_miss = damage.is_miss.unwrap_or(kind == DamageKind::Miss);

        let cached = if attacker_type == EntityType::Player {
            self.players.get(attacker_uid)
        } else {
            None
        };

        let Some(enc) = self.cache.current_mut() else {
            return;
        };

        {
            let info = enc.entity_mut(attacker_uid);
            if info.entity_type == EntityType::Error {
                info.entity_type = attacker_type;
            }
        }
        {
            let info = enc.entity_mut(target_uid);
            if info.entity_type == EntityType::Error {
                info.entity_type = EntityType::from_raw_id(target_raw);
            }
        }

        let mut detected = None;
        if attacker_type == EntityType::Player {
            let stats = enc
                .attackers
                .entry(attacker_uid)
                .or_insert_with(|| AttackerStats::new(attacker_uid));

            if let Some(cached) = cached {
                if stats.name.is_none() {
                    stats.name = cached.name;
                }
                if stats.class_id.is_none() {
                    stats.class_id = cached.class_id;
                }
                if stats.spec_name.is_none() {
                    stats.spec_name = cached.spec_name;
                }
                if stats.ability_score.is_none() {
                    stats.ability_score = cached.ability_score;
                }
            }

            if skill_id != 0 {
                stats.skill_ids.insert(skill_id);
            }

            // Spec inference: cheap probe first, full table scan only
            // when the new skill could actually decide something.
            if stats.spec_name.is_none()
                && skill_id != 0
                && spec_for_skill(skill_id).is_some()
                && let Some(spec) = detect_spec(&stats.skill_ids)
            {
                stats.spec_name = Some(spec.name().to_owned());
                stats.class_id = Some(spec.class().id());
                detected = Some(spec);
            }

            match kind {
                DamageKind::Heal => {
                    stats.healing_done += amount;
                    *stats.healing_by_skill.entry(skill_id).or_default() += amount;
                }
                DamageKind::Miss => {}
                _ => {
                    stats.total_damage += amount;
                    stats.damage_count += 1;
                    if is_crit {
                        stats.crit_count += 1;
                    }
                    *stats.damage_by_skill.entry(skill_id).or_default() += amount;
                }
            }
        }

        if let Some(spec) = detected {
            let info = enc.entity_mut(attacker_uid);
            info.spec_name = Some(spec.name().to_owned());
            info.class_id = Some(spec.class().id());
            self.players.merge(
                attacker_uid,
                PlayerUpdate {
                    class_id: Some(spec.class().id()),
                    spec_id: Some(spec.id()),
                    spec_name: Some(spec.name()),
                    ..PlayerUpdate::default()
                },
            );
            debug!(uid = attacker_uid, spec = spec.name(), "spec inferred");
        }

        // Every surviving event is stored, character attacker or not.
        let Some(enc) = self.cache.current_mut() else {
            return;
        };
        enc.all_events.push_back(DamageEvent {
            attacker_uid,
            target_uid,
            amount,
            kind,
            is_crit,
            is_miss,
            timestamp: now,
        });

        signals.push(GameSignal::EncounterUpdated(Arc::new(
            EncounterSummary::from_encounter(enc, now),
        )));
        for signal in signals {
            self.bus.emit(signal);
        }
    }

    fn apply_attrs(&mut self, raw_id: u64, coll: &AttrCollection) {
        let attrs = EntityAttrs::from_collection(coll);
        if attrs.is_empty() {
            return;
        }
        let uid = shifted_uid(raw_id);
        let entity_type = EntityType::from_raw_id(raw_id);

        if entity_type == EntityType::Player {
            self.players.merge(
                uid,
                PlayerUpdate {
                    name: attrs.name.as_deref(),
                    class_id: attrs.class_id,
                    ability_score: attrs.ability_score,
                    ..PlayerUpdate::default()
                },
            );
        }

        if let Some(enc) = self.cache.current_mut() {
            let info = enc.entity_mut(uid);
            if info.entity_type == EntityType::Error {
                info.entity_type = entity_type;
            }
            // Names from the salvage chain are pre-validated; still
            // never replace an existing one.
            if info.name.is_none() && attrs.name.is_some() {
                info.name = attrs.name.clone();
            }
            if let Some(class_id) = attrs.class_id {
                info.class_id.get_or_insert(class_id);
            }
            if let Some(score) = attrs.ability_score {
                info.ability_score.get_or_insert(score);
            }
        }

        if attrs.cur_hp.is_some() || attrs.max_hp.is_some() {
            trace!(uid, cur_hp = ?attrs.cur_hp, max_hp = ?attrs.max_hp, "hp attrs");
        }
    }

    fn apply_entity(&mut self, entity: &SyncEntity) {
        let raw = entity
            .uuid
            .or_else(|| entity.attrs.as_ref().and_then(|a| a.uuid));
        let Some(raw) = raw else {
            return;
        };
        match &entity.attrs {
            Some(coll) => self.apply_attrs(raw, coll),
            None => {
                if let Some(enc) = self.cache.current_mut() {
                    let info = enc.entity_mut(shifted_uid(raw));
                    if info.entity_type == EntityType::Error {
                        info.entity_type = EntityType::from_raw_id(raw);
                    }
                }
            }
        }
    }

    fn apply_container(&mut self, msg: &SyncContainerData) {
        let Some(cs) = &msg.char_serialize else {
            return;
        };
        let Some(base) = &cs.base else {
            return;
        };
        let Some(uid) = base.char_id else {
            return;
        };
        self.players.merge(
            uid,
            PlayerUpdate {
                name: base.name.as_deref(),
                class_id: cs.profession_id.map(|v| v as u32),
                ability_score: base.fight_point,
                ..PlayerUpdate::default()
            },
        );
        debug!(uid, "character container merged");
    }
}
