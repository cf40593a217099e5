//! Tests for the encounter engine.
//!
//! Exercises the damage path end to end: attacker classification,
//! per-skill totals, spec inference, the idle-timeout state machine,
//! and the signal contract on the bus.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use sonar_types::MeterSettings;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

use super::EventProcessor;
use crate::capture::{DecodedRecord, Pipeline, ServerKey};
use crate::events::{EventBus, GameSignal};
use crate::protocol::{DamageKind, Opcode};
use crate::session::{EntityType, PlayerCache, PlayerUpdate};
use crate::wire::{encode_tag, encode_varint};

// Raw wire ids: low 16 bits classify (640 = character, 64 = monster).
const PLAYER_RAW: u64 = 0x04b0_0280;
const PLAYER_UID: u64 = 0x04b0;
const MONSTER_RAW: u64 = 0x0777_0040;

fn at(secs: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        + chrono::Duration::seconds(secs)
}

fn settings(timeout: u32) -> MeterSettings {
    MeterSettings {
        encounter_reset_timer_seconds: timeout,
        max_encounter_history: 10,
    }
}

fn processor_with(
    players: Arc<PlayerCache>,
    settings: MeterSettings,
) -> (EventProcessor, Receiver<GameSignal>) {
    let bus = EventBus::new();
    let rx = bus.subscribe();
    (EventProcessor::new(players, settings, bus), rx)
}

fn processor(timeout: u32) -> (EventProcessor, Receiver<GameSignal>) {
    processor_with(Arc::new(PlayerCache::new()), settings(timeout))
}

fn drain(rx: &mut Receiver<GameSignal>) -> Vec<GameSignal> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(signal) => out.push(signal),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

// --- wire builders ---

fn varint_field(field: u32, value: u64, out: &mut Vec<u8>) {
    encode_tag(field, 0, out);
    encode_varint(value, out);
}

fn bytes_field(field: u32, payload: &[u8], out: &mut Vec<u8>) {
    encode_tag(field, 2, out);
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

struct DamageSpec {
    attacker_raw: u64,
    skill_id: u64,
    value: u64,
    kind: u64,
    crit: bool,
}

impl DamageSpec {
    fn hit(attacker_raw: u64, skill_id: u64, value: u64) -> Self {
        Self {
            attacker_raw,
            skill_id,
            value,
            kind: 0,
            crit: false,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.crit {
            varint_field(3, 1, &mut buf);
        }
        varint_field(4, self.kind, &mut buf);
        varint_field(6, self.value, &mut buf);
        varint_field(11, self.attacker_raw, &mut buf);
        varint_field(12, self.skill_id, &mut buf);
        buf
    }
}

/// A SyncNearDeltaInfo payload with one delta carrying the damages.
fn near_delta_payload(target_raw: u64, damages: &[DamageSpec]) -> Vec<u8> {
    let mut effect = Vec::new();
    varint_field(1, 1, &mut effect);
    for d in damages {
        bytes_field(2, &d.encode(), &mut effect);
    }

    let mut delta = Vec::new();
    varint_field(1, target_raw, &mut delta);
    bytes_field(7, &effect, &mut delta);

    let mut msg = Vec::new();
    bytes_field(1, &delta, &mut msg);
    msg
}

fn near_delta_record(target_raw: u64, damages: &[DamageSpec]) -> DecodedRecord {
    DecodedRecord {
        opcode: Opcode::SyncNearDeltaInfo,
        payload: near_delta_payload(target_raw, damages),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Damage accounting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn single_hit_opens_an_encounter_and_attributes_damage() {
    let (mut p, mut rx) = processor(5);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 1000)]),
        at(0),
    );

    let enc = p.cache().current().expect("encounter");
    assert!(enc.is_active);
    assert_eq!(enc.start_time, at(0));
    let stats = &enc.attackers[&PLAYER_UID];
    assert_eq!(stats.total_damage, 1000);
    assert_eq!(stats.damage_count, 1);
    assert_eq!(stats.crit_count, 0);
    assert_eq!(stats.spec_name.as_deref(), Some("Iaido"));
    assert_eq!(stats.class_id, Some(1));
    assert_eq!(stats.damage_by_skill[&1714], 1000);

    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::EncounterStarted(_)));
    assert!(matches!(signals[1], GameSignal::EncounterUpdated(_)));
}

#[test]
fn heal_counts_toward_healing_not_damage() {
    let (mut p, _rx) = processor(5);
    let heal = DamageSpec {
        kind: 2,
        ..DamageSpec::hit(PLAYER_RAW, 1714, 1000)
    };
    p.handle_record_at(&near_delta_record(PLAYER_RAW, &[heal]), at(0));

    let stats = &p.cache().current().unwrap().attackers[&PLAYER_UID];
    assert_eq!(stats.healing_done, 1000);
    assert_eq!(stats.total_damage, 0);
    assert_eq!(stats.damage_count, 0);
    assert_eq!(stats.healing_by_skill[&1714], 1000);
}

#[test]
fn miss_contributes_to_neither_and_never_opens_an_encounter() {
    let (mut p, _rx) = processor(5);
    let miss = DamageSpec {
        kind: 1,
        ..DamageSpec::hit(PLAYER_RAW, 1714, 400)
    };
    p.handle_record_at(&near_delta_record(PLAYER_RAW, &[miss]), at(0));
    assert!(p.cache().current().is_none());

    // With a live encounter the miss is stored but adds nothing.
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(1),
    );
    let miss = DamageSpec {
        kind: 1,
        ..DamageSpec::hit(PLAYER_RAW, 1714, 400)
    };
    p.handle_record_at(&near_delta_record(PLAYER_RAW, &[miss]), at(2));

    let enc = p.cache().current().unwrap();
    let stats = &enc.attackers[&PLAYER_UID];
    assert_eq!(stats.total_damage, 100);
    assert_eq!(stats.healing_done, 0);
    assert_eq!(enc.all_events.len(), 2);
    // The miss did not refresh the idle timer.
    assert_eq!(enc.last_activity_time, at(1));
}

#[test]
fn other_damage_kinds_are_ignored_entirely() {
    let (mut p, _rx) = processor(5);
    for kind in [3u64, 4, 5, 99] {
        let d = DamageSpec {
            kind,
            ..DamageSpec::hit(PLAYER_RAW, 1714, 500)
        };
        p.handle_record_at(&near_delta_record(PLAYER_RAW, &[d]), at(0));
    }
    assert!(p.cache().current().is_none());
}

#[test]
fn crit_via_flag_or_field() {
    let (mut p, _rx) = processor(5);
    let crit = DamageSpec {
        crit: true,
        ..DamageSpec::hit(PLAYER_RAW, 1714, 100)
    };
    p.handle_record_at(&near_delta_record(PLAYER_RAW, &[crit]), at(0));

    // type_flag bit 0 alone also marks a crit.
    let mut payload = Vec::new();
    varint_field(4, 0, &mut payload);
    varint_field(5, 0x01, &mut payload);
    varint_field(6, 100, &mut payload);
    varint_field(11, PLAYER_RAW, &mut payload);
    varint_field(12, 1714, &mut payload);
    let mut effect = Vec::new();
    bytes_field(2, &payload, &mut effect);
    let mut delta = Vec::new();
    varint_field(1, PLAYER_RAW, &mut delta);
    bytes_field(7, &effect, &mut delta);
    let mut msg = Vec::new();
    bytes_field(1, &delta, &mut msg);
    p.handle_record_at(
        &DecodedRecord {
            opcode: Opcode::SyncNearDeltaInfo,
            payload: msg,
        },
        at(1),
    );

    let stats = &p.cache().current().unwrap().attackers[&PLAYER_UID];
    assert_eq!(stats.damage_count, 2);
    assert_eq!(stats.crit_count, 2);
}

#[test]
fn monster_attackers_store_events_without_stats() {
    let (mut p, _rx) = processor(5);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(MONSTER_RAW, 0, 5000)]),
        at(0),
    );
    let enc = p.cache().current().unwrap();
    assert!(enc.attackers.is_empty());
    assert_eq!(enc.all_events.len(), 1);
    assert_eq!(
        enc.entities[&(MONSTER_RAW >> 16)].entity_type,
        EntityType::Monster
    );
    assert_eq!(enc.entities[&PLAYER_UID].entity_type, EntityType::Player);
}

#[test]
fn unclassifiable_attackers_are_not_counted() {
    let (mut p, _rx) = processor(5);
    let odd_raw = 0x0123_0001; // low 16 bits neither 64 nor 640
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(odd_raw, 1714, 800)]),
        at(0),
    );
    let enc = p.cache().current().unwrap();
    assert!(enc.attackers.is_empty());
    assert_eq!(enc.all_events.len(), 1);
    assert_eq!(
        enc.entities[&(odd_raw >> 16)].entity_type,
        EntityType::Error
    );
}

#[test]
fn top_summoner_takes_precedence_over_attacker() {
    let (mut p, _rx) = processor(5);
    let mut payload = Vec::new();
    varint_field(4, 0, &mut payload);
    varint_field(6, 300, &mut payload);
    varint_field(11, MONSTER_RAW, &mut payload); // pet
    varint_field(12, 1714, &mut payload);
    varint_field(21, PLAYER_RAW, &mut payload); // owner
    let mut effect = Vec::new();
    bytes_field(2, &payload, &mut effect);
    let mut delta = Vec::new();
    varint_field(1, MONSTER_RAW, &mut delta);
    bytes_field(7, &effect, &mut delta);
    let mut msg = Vec::new();
    bytes_field(1, &delta, &mut msg);

    p.handle_record_at(
        &DecodedRecord {
            opcode: Opcode::SyncNearDeltaInfo,
            payload: msg,
        },
        at(0),
    );
    let enc = p.cache().current().unwrap();
    assert_eq!(enc.attackers[&PLAYER_UID].total_damage, 300);
}

// ─────────────────────────────────────────────────────────────────────────────
// Invariants over a busy encounter
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn damage_sums_match_stored_events() {
    let (mut p, _rx) = processor(30);
    let second_player: u64 = 0x0900_0280;
    let mut t = 0;
    for (attacker, skill, value, kind) in [
        (PLAYER_RAW, 1714u64, 100u64, 0u64),
        (PLAYER_RAW, 1734, 250, 0),
        (second_player, 1241, 400, 0),
        (second_player, 1241, 50, 2),   // heal
        (PLAYER_RAW, 1714, 75, 1),      // miss
        (MONSTER_RAW, 0, 9999, 0),      // monster hit on the player
        (second_player, 120901, 25, 0), // skill from another spec's set
    ] {
        let d = DamageSpec {
            kind,
            ..DamageSpec::hit(attacker, skill, value)
        };
        p.handle_record_at(&near_delta_record(PLAYER_RAW, &[d]), at(t));
        t += 1;
    }

    let enc = p.cache().current().unwrap();
    let stats_total: u64 = enc.attackers.values().map(|a| a.total_damage).sum();
    let event_total: u64 = enc
        .all_events
        .iter()
        .filter(|e| !matches!(e.kind, DamageKind::Miss | DamageKind::Heal))
        .filter(|e| {
            enc.entities
                .get(&e.attacker_uid)
                .is_some_and(|i| i.entity_type == EntityType::Player)
        })
        .map(|e| e.amount)
        .sum();
    assert_eq!(stats_total, event_total);

    for stats in enc.attackers.values() {
        let by_skill: u64 = stats.damage_by_skill.values().sum();
        assert_eq!(by_skill, stats.total_damage, "uid {}", stats.uid);
        assert!(stats.crit_count <= stats.damage_count);
    }
    assert!(enc.start_time <= enc.last_activity_time);
}

// ─────────────────────────────────────────────────────────────────────────────
// Idle timeout state machine
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn idle_timeout_finalizes_at_last_activity() {
    let (mut p, mut rx) = processor(3);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(0),
    );
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(2),
    );
    drain(&mut rx);

    // Not yet: only 2s since the last event.
    p.tick_at(at(4));
    assert!(p.cache().current().unwrap().is_active);
    assert!(drain(&mut rx).is_empty());

    // 3s elapsed: finalize.
    p.tick_at(at(5));
    let enc = p.cache().current().unwrap();
    assert!(!enc.is_active);
    assert_eq!(enc.last_activity_time, at(2));
    assert_eq!(p.cache().history_len(), 1);

    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::EncounterEnded(_)));
    assert!(matches!(signals[1], GameSignal::HistoryChanged));

    // Ticking again does nothing; the finished encounter stays current.
    p.tick_at(at(60));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(p.cache().history_len(), 1);
}

#[test]
fn timeout_zero_never_finalizes() {
    let (mut p, mut rx) = processor(0);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(0),
    );
    drain(&mut rx);
    p.tick_at(at(600));
    assert!(p.cache().current().unwrap().is_active);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn next_event_after_finalization_opens_a_new_encounter() {
    let (mut p, mut rx) = processor(3);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(0),
    );
    p.tick_at(at(10));
    drain(&mut rx);

    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 42)]),
        at(20),
    );
    let enc = p.cache().current().unwrap();
    assert!(enc.is_active);
    assert_eq!(enc.start_time, at(20));
    assert_eq!(enc.attackers[&PLAYER_UID].total_damage, 42);

    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::EncounterStarted(_)));
}

#[test]
fn shrinking_the_timeout_can_end_combat_immediately() {
    let (mut p, mut rx) = processor(60);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 100)]),
        at(0),
    );
    drain(&mut rx);

    // 10s idle; the old 60s timeout would keep going, the new 5s ends it.
    p.update_settings_at(settings(5), at(10));
    assert!(!p.cache().current().unwrap().is_active);
    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::EncounterEnded(_)));
}

#[test]
fn shrinking_history_trims_and_notifies() {
    let (mut p, mut rx) = processor(1);
    for i in 0..6i64 {
        p.handle_record_at(
            &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 10)]),
            at(i * 100),
        );
        p.tick_at(at(i * 100 + 50));
    }
    assert_eq!(p.cache().history_len(), 6);
    drain(&mut rx);

    p.update_settings_at(
        MeterSettings {
            encounter_reset_timer_seconds: 1,
            max_encounter_history: 2,
        },
        at(1000),
    );
    assert_eq!(p.cache().history_len(), 2);
    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::HistoryChanged));

    // History is newest-first by start time.
    let starts: Vec<_> = p.cache().history().map(|e| e.start_time).collect();
    assert_eq!(starts, vec![at(500), at(400)]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Player cache interplay
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn attacker_stats_seed_from_the_player_cache() {
    let players = Arc::new(PlayerCache::new());
    players.merge(
        PLAYER_UID,
        PlayerUpdate {
            name: Some("Riven"),
            ability_score: Some(3100),
            ..PlayerUpdate::default()
        },
    );
    let (mut p, _rx) = processor_with(Arc::clone(&players), settings(5));
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 2405, 77)]),
        at(0),
    );
    let stats = &p.cache().current().unwrap().attackers[&PLAYER_UID];
    assert_eq!(stats.name.as_deref(), Some("Riven"));
    assert_eq!(stats.ability_score, Some(3100));
    assert_eq!(stats.spec_name.as_deref(), Some("Recovery"));

    // Inference flowed back into the shared cache.
    let entry = players.get(PLAYER_UID).unwrap();
    assert_eq!(entry.spec_name.as_deref(), Some("Recovery"));
    assert_eq!(entry.class_id, Some(12));
    assert!(entry.spec_id.is_some());
}

#[test]
fn selection_signals_carry_the_summary() {
    let (mut p, mut rx) = processor(5);
    p.handle_record_at(
        &near_delta_record(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 10)]),
        at(0),
    );
    drain(&mut rx);
    let id = p.cache().current().unwrap().id;

    p.select_encounter_at(Some(id), at(1));
    let signals = drain(&mut rx);
    match &signals[0] {
        GameSignal::SelectedEncounterChanged(Some(summary)) => {
            assert_eq!(summary.encounter_id, id);
        }
        other => panic!("unexpected signal {other:?}"),
    }

    p.select_encounter_at(None, at(2));
    let signals = drain(&mut rx);
    assert!(matches!(
        signals[0],
        GameSignal::SelectedEncounterChanged(None)
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Through the full capture pipeline
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frames_off_the_wire_reach_the_engine() {
    use crate::capture::frame::testutil::{notify_frame, notify_frame_for_service};

    let key = ServerKey {
        src_ip: [10, 1, 1, 1],
        src_port: 7000,
        dst_ip: [10, 1, 1, 2],
        dst_port: 52000,
    };
    let mut login = vec![0u8; 98];
    login[..10].copy_from_slice(&[0x00, 0x00, 0x00, 0x62, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    login[14..20].copy_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x0a, 0x4e]);

    let mut pipeline = Pipeline::new();
    let mut records = Vec::new();
    pipeline.feed_segment(key, 1000, &login, &mut records);
    let seq = 1000 + login.len() as u32;

    // A foreign-service frame advances reassembly but yields nothing.
    let foreign = notify_frame_for_service(0x1234, 0x2d, b"junk", false);
    pipeline.feed_segment(key, seq, &foreign, &mut records);
    assert_eq!(records.len(), 1); // just the server change
    let seq = seq + foreign.len() as u32;
    assert_eq!(pipeline.reassembler().anchor(), Some(seq));

    let frame = notify_frame(
        0x2d,
        &near_delta_payload(PLAYER_RAW, &[DamageSpec::hit(PLAYER_RAW, 1714, 1000)]),
    );
    pipeline.feed_segment(key, seq, &frame, &mut records);

    let (mut p, mut rx) = processor(5);
    for record in &records {
        p.handle_record_at(record, at(0));
    }

    let enc = p.cache().current().expect("encounter from wire bytes");
    let stats = &enc.attackers[&PLAYER_UID];
    assert_eq!(stats.total_damage, 1000);
    assert_eq!(stats.damage_count, 1);
    assert_eq!(stats.spec_name.as_deref(), Some("Iaido"));
    assert_eq!(stats.class_id, Some(1));

    let signals = drain(&mut rx);
    assert!(matches!(signals[0], GameSignal::ServerChanged));
    assert!(matches!(signals[1], GameSignal::EncounterStarted(_)));
}
