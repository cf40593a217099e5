//! Combat state machine for encounter lifecycle management.
//!
//! Two states: Idle (no active encounter) and Active. A combat-extending
//! event opens an encounter and refreshes its activity timestamp; the
//! wall-clock tick closes it once the configured idle gap has elapsed.
//! A timeout of zero disables auto-ending entirely.

use std::sync::Arc;

use chrono::NaiveDateTime;
use sonar_types::MeterSettings;
use tracing::info;

use crate::events::GameSignal;
use crate::session::{EncounterSummary, SessionCache};

/// Open a new encounter if none is active and refresh the activity
/// timestamp. Emits `EncounterStarted` for a fresh encounter.
pub fn advance_combat_state(cache: &mut SessionCache, now: NaiveDateTime) -> Vec<GameSignal> {
    let mut signals = Vec::new();
    if cache.needs_new_encounter() {
        let enc = cache.start_encounter(now);
        info!(encounter_id = enc.id, "encounter started");
        signals.push(GameSignal::EncounterStarted(Arc::new(
            EncounterSummary::from_encounter(enc, now),
        )));
    }
    if let Some(enc) = cache.current_mut() {
        enc.last_activity_time = now;
    }
    signals
}

/// Wall-clock idle check. Call periodically; finalizes the current
/// encounter when `now - last_activity >= timeout`.
pub fn tick_combat_state(
    cache: &mut SessionCache,
    settings: &MeterSettings,
    now: NaiveDateTime,
) -> Vec<GameSignal> {
    let timeout = settings.encounter_reset_timer_seconds;
    if timeout == 0 {
        return Vec::new();
    }
    let Some(enc) = cache.current() else {
        return Vec::new();
    };
    if !enc.is_active {
        return Vec::new();
    }
    let elapsed = now.signed_duration_since(enc.last_activity_time).num_seconds();
    if elapsed < i64::from(timeout) {
        return Vec::new();
    }
    finalize_current(cache, settings, now)
}

/// Close the current encounter, push it to history, and enforce the
/// history bound. The finalized encounter remains the current reference
/// until a new one begins.
fn finalize_current(
    cache: &mut SessionCache,
    settings: &MeterSettings,
    now: NaiveDateTime,
) -> Vec<GameSignal> {
    let Some(enc) = cache.current_mut() else {
        return Vec::new();
    };
    enc.finalize();
    info!(
        encounter_id = enc.id,
        duration = enc.duration_seconds(now),
        "encounter ended"
    );
    let summary = Arc::new(EncounterSummary::from_encounter(enc, now));
    cache.push_current_to_history(settings.history_bound());
    vec![GameSignal::EncounterEnded(summary), GameSignal::HistoryChanged]
}

/// React to a settings change while running: the idle deadline is
/// re-evaluated immediately (a shrunken timeout may end the encounter
/// on the spot) and the history is trimmed if its bound shrank.
pub fn apply_settings_change(
    cache: &mut SessionCache,
    new_settings: &MeterSettings,
    now: NaiveDateTime,
) -> Vec<GameSignal> {
    let mut signals = tick_combat_state(cache, new_settings, now);
    if cache.trim_history(new_settings.history_bound())
        && !signals
            .iter()
            .any(|s| matches!(s, GameSignal::HistoryChanged))
    {
        signals.push(GameSignal::HistoryChanged);
    }
    signals
}
