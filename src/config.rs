//! Capture session settings, loaded from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CaptureError, Result};

/// Tunables for a capture session.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Preview driver tick rate.
    pub preview_rate_hz: f64,
    /// Upper bound on how long stopping the polling thread may block.
    pub join_timeout_ms: u64,
    /// Pause after an iteration skipped because of a source error.
    pub error_backoff_ms: u64,
    /// Object whose scale magnitude converts runtime units to scene units.
    pub root_object: String,
    /// Suffix naming the joint-offset object that follows each tracker object.
    pub joint_suffix: String,
    /// Name of the bone constraint created when binding a tracker to a bone.
    pub binding_constraint: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preview_rate_hz: 60.0,
            join_timeout_ms: 1000,
            error_backoff_ms: 10,
            root_object: String::from("OVR Root"),
            joint_suffix: String::from(" Joint"),
            binding_constraint: String::from("Tracker Binding"),
        }
    }
}

impl CaptureConfig {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice::<CaptureConfig>(data)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path).map_err(CaptureError::ConfigIo)?;
        Self::from_json(&data)
    }

    pub fn preview_period(&self) -> Duration {
        if self.preview_rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.preview_rate_hz)
        } else {
            Duration::from_secs_f64(1.0 / 60.0)
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn joint_name(&self, tracker_name: &str) -> String {
        format!("{}{}", tracker_name, self.joint_suffix)
    }
}
