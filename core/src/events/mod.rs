pub mod bus;
pub mod signal;

pub use bus::EventBus;
pub use signal::GameSignal;
