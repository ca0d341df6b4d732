use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{TResult, TrackerError};

/// Thresholds applied to every raw fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Fixes reporting a worse horizontal accuracy are rejected (meters)
    pub max_accuracy_m: f64,
    /// Movement below this counts as stationary jitter (meters)
    pub noise_floor_m: f64,
    /// Jitter is only rejected when it arrives faster than this (seconds)
    pub min_interval_s: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 20.0,
            noise_floor_m: 1.0,
            min_interval_s: 1.0,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub validator: ValidatorConfig,
    /// Maximum number of points the track buffer yields
    pub buffer_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            buffer_capacity: 10_000,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> TResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> TResult<Self> {
        let config: TrackerConfig =
            serde_json::from_str(text).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TResult<()> {
        let v = &self.validator;
        check_threshold("validator.max_accuracy_m", v.max_accuracy_m)?;
        check_threshold("validator.noise_floor_m", v.noise_floor_m)?;
        check_threshold("validator.min_interval_s", v.min_interval_s)?;

        if self.buffer_capacity < 2 {
            return Err(TrackerError::Config(format!(
                "buffer_capacity must be at least 2, got {}",
                self.buffer_capacity
            )));
        }
        Ok(())
    }
}

fn check_threshold(name: &str, value: f64) -> TResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrackerError::Config(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}
