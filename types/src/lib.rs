//! Shared configuration types for SONAR.
//!
//! These types are serialized to the user's config file and read by the
//! capture service. They carry no behavior beyond validation/clamping so
//! that front-ends can depend on them without pulling in the pipeline.

pub mod formatting;

use serde::{Deserialize, Serialize};

/// Upper bound on the encounter history length.
pub const MAX_ENCOUNTER_HISTORY: u32 = 60;

/// Default idle gap (seconds) after which an encounter auto-ends.
pub const DEFAULT_RESET_TIMER_SECS: u32 = 5;

/// Default number of completed encounters kept in history.
pub const DEFAULT_HISTORY_SIZE: u32 = 10;

/// Runtime-configurable parameters consumed by the encounter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Seconds of combat inactivity before the current encounter is
    /// finalized. `0` disables the idle timeout entirely.
    pub encounter_reset_timer_seconds: u32,

    /// How many completed encounters to retain, clamped to
    /// `0..=MAX_ENCOUNTER_HISTORY`.
    pub max_encounter_history: u32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            encounter_reset_timer_seconds: DEFAULT_RESET_TIMER_SECS,
            max_encounter_history: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl MeterSettings {
    /// Return a copy with all fields forced into their valid ranges.
    pub fn clamped(self) -> Self {
        Self {
            encounter_reset_timer_seconds: self.encounter_reset_timer_seconds,
            max_encounter_history: self.max_encounter_history.min(MAX_ENCOUNTER_HISTORY),
        }
    }

    /// History bound as a usize, after clamping.
    pub fn history_bound(&self) -> usize {
        self.max_encounter_history.min(MAX_ENCOUNTER_HISTORY) as usize
    }
}
