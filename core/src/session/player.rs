//! Process-wide player cache.
//!
//! Players are observed piecemeal (a name from one message, a class id
//! from another, a spec only after they have used a signature skill),
//! so the cache merges monotonically: once a field holds a valid value
//! it is never overwritten. Shared between the engine and any consumer
//! that wants to label uids.

use std::sync::{PoisonError, RwLock};

use hashbrown::HashMap;

use crate::protocol::is_valid_name;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerCacheEntry {
    pub uid: u64,
    pub name: Option<String>,
    pub class_id: Option<u32>,
    pub spec_id: Option<u32>,
    pub ability_score: Option<u64>,
    pub spec_name: Option<String>,
}

/// Partial update applied through [`PlayerCache::merge`].
#[derive(Debug, Clone, Default)]
pub struct PlayerUpdate<'a> {
    pub name: Option<&'a str>,
    pub class_id: Option<u32>,
    pub spec_id: Option<u32>,
    pub ability_score: Option<u64>,
    pub spec_name: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct PlayerCache {
    players: RwLock<HashMap<u64, PlayerCacheEntry>>,
}

impl PlayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an update for `uid`. Names must pass the validity filter;
    /// numeric fields are accepted only once and only when strictly
    /// positive. Idempotent.
    pub fn merge(&self, uid: u64, update: PlayerUpdate<'_>) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        let entry = players.entry(uid).or_insert_with(|| PlayerCacheEntry {
            uid,
            ..PlayerCacheEntry::default()
        });

        if entry.name.is_none()
            && let Some(name) = update.name
            && is_valid_name(name)
        {
            entry.name = Some(name.to_owned());
        }
        if entry.class_id.is_none()
            && let Some(v) = update.class_id.filter(|v| *v > 0)
        {
            entry.class_id = Some(v);
        }
        if entry.spec_id.is_none()
            && let Some(v) = update.spec_id.filter(|v| *v > 0)
        {
            entry.spec_id = Some(v);
        }
        if entry.ability_score.is_none()
            && let Some(v) = update.ability_score.filter(|v| *v > 0)
        {
            entry.ability_score = Some(v);
        }
        if entry.spec_name.is_none()
            && let Some(name) = update.spec_name.filter(|n| !n.is_empty())
        {
            entry.spec_name = Some(name.to_owned());
        }
    }

    pub fn get(&self, uid: u64) -> Option<PlayerCacheEntry> {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.players.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.players.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
