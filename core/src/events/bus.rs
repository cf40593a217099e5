//! Single-producer, multi-subscriber signal fan-out.
//!
//! Built on `tokio::sync::broadcast`: the engine never waits for
//! subscribers, and a subscriber that falls behind loses old signals
//! rather than stalling the pipeline.

use tokio::sync::broadcast;

use super::signal::GameSignal;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GameSignal>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameSignal> {
        self.tx.subscribe()
    }

    /// Non-blocking send. No subscribers is not an error; signals are
    /// simply dropped.
    pub fn emit(&self, signal: GameSignal) {
        let _ = self.tx.send(signal);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
