pub mod capture;
pub mod context;
pub mod events;
pub mod game_data;
pub mod protocol;
pub mod service;
pub mod session;
pub mod signal_processor;
pub mod wire;

// Re-exports for convenience
pub use capture::{CaptureDriver, CaptureError, DecodedRecord, Pipeline};
pub use context::AppConfig;
pub use events::{EventBus, GameSignal};
pub use protocol::Opcode;
pub use service::{CaptureService, ServiceHandle};
pub use session::{EncounterSummary, PlayerCache, SessionCache};
pub use signal_processor::EventProcessor;
