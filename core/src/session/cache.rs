//! Pure storage for session state.
//!
//! Holds the current encounter plus a bounded most-recent-first history
//! of completed ones. Routing logic lives in the EventProcessor; this
//! struct only stores and trims. The finalized encounter stays current
//! until a new one begins so consumers keep showing the last result.

use std::collections::VecDeque;

use chrono::NaiveDateTime;

use super::encounter::Encounter;

#[derive(Debug, Default)]
pub struct SessionCache {
    current: Option<Encounter>,
    history: VecDeque<Encounter>,
    next_encounter_id: u64,
    selected: Option<u64>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh encounter, replacing the (finished) current one.
    pub fn start_encounter(&mut self, now: NaiveDateTime) -> &mut Encounter {
        let id = self.next_encounter_id;
        self.next_encounter_id += 1;
        self.current.insert(Encounter::new(id, now))
    }

    pub fn current(&self) -> Option<&Encounter> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Encounter> {
        self.current.as_mut()
    }

    /// Whether a new combat event must open a new encounter.
    pub fn needs_new_encounter(&self) -> bool {
        self.current.as_ref().is_none_or(|e| !e.is_active)
    }

    /// Snapshot the (already finalized) current encounter into history,
    /// newest first, and enforce the bound.
    pub fn push_current_to_history(&mut self, bound: usize) {
        if let Some(enc) = self.current.as_ref() {
            self.history.push_front(enc.clone());
        }
        self.trim_history(bound);
    }

    /// Drop oldest entries beyond `bound`. Returns true if anything was
    /// removed.
    pub fn trim_history(&mut self, bound: usize) -> bool {
        let mut changed = false;
        while self.history.len() > bound {
            self.history.pop_back();
            changed = true;
        }
        changed
    }

    /// Completed encounters, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &Encounter> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn encounter_by_id(&self, id: u64) -> Option<&Encounter> {
        if self.current.as_ref().is_some_and(|e| e.id == id) {
            return self.current.as_ref();
        }
        self.history.iter().find(|e| e.id == id)
    }

    // --- Selection ---

    /// Point the selection at an encounter (current or history).
    /// Unknown ids clear it. Returns true when the selection changed.
    pub fn select(&mut self, id: Option<u64>) -> bool {
        let resolved = id.filter(|id| self.encounter_by_id(*id).is_some());
        let changed = resolved != self.selected;
        self.selected = resolved;
        changed
    }

    pub fn selected_encounter(&self) -> Option<&Encounter> {
        self.selected.and_then(|id| self.encounter_by_id(id))
    }
}
