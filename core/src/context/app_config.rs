//! Application configuration persistence.
//!
//! Stored as TOML under the platform config directory via confy. A
//! config that fails to read falls back to the documented defaults;
//! the observer must come up even with a mangled config file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sonar_types::MeterSettings;
use tracing::warn;

pub const APP_NAME: &str = "sonar";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub meter: MeterSettings,
}

impl AppConfig {
    /// Load from disk, clamping out-of-range values.
    pub fn load() -> Self {
        match confy::load::<Self>(APP_NAME, None) {
            Ok(config) => Self {
                meter: config.meter.clamped(),
            },
            Err(err) => {
                warn!(%err, "cannot read config; using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        if let Err(err) = confy::store(APP_NAME, None, self) {
            warn!(%err, "cannot save config");
        }
    }

    pub fn path() -> Option<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, None).ok()
    }
}
