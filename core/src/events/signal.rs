use std::sync::Arc;

use crate::session::EncounterSummary;

/// Signals emitted by the EventProcessor for cross-cutting concerns.
/// These represent "interesting things that happened" at a higher level
/// than raw wire records.
#[derive(Debug, Clone)]
pub enum GameSignal {
    /// The active game-server flow changed; reassembly restarted.
    ServerChanged,

    // Encounter lifecycle
    EncounterStarted(Arc<EncounterSummary>),
    EncounterUpdated(Arc<EncounterSummary>),
    EncounterEnded(Arc<EncounterSummary>),

    /// The completed-encounter history gained, lost, or trimmed entries.
    HistoryChanged,

    /// A consumer moved the encounter selection (None = cleared).
    SelectedEncounterChanged(Option<Arc<EncounterSummary>>),
}
