//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Rounding applied when an averaged value is fitted to its field's precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundingMode {
    /// Ties round away from zero (12.345 -> 12.35)
    #[default]
    HalfUp,
    /// Ties round to the even neighbour (12.345 -> 12.34)
    HalfEven,
}

impl FromStr for RoundingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_up" | "halfup" => Ok(RoundingMode::HalfUp),
            "half_even" | "halfeven" | "bankers" => Ok(RoundingMode::HalfEven),
            other => Err(ConfigError::InvalidRounding(other.to_string())),
        }
    }
}

/// Tunables for the merge engine and event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub rounding: RoundingMode,
    /// Decimal places kept when averaging `Float` fields
    pub float_scale: u32,
    /// Buffered events per subscriber before lagging ones drop messages
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingMode::HalfUp,
            float_scale: 6,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let rounding = match env::var("STOCKPILE_ROUNDING") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.rounding,
        };

        let float_scale = match env::var("STOCKPILE_FLOAT_SCALE") {
            Ok(value) => value
                .parse::<u32>()
                .ok()
                .filter(|scale| *scale <= MAX_SCALE)
                .ok_or(ConfigError::InvalidFloatScale)?,
            Err(_) => defaults.float_scale,
        };

        let event_capacity = match env::var("STOCKPILE_EVENT_CAPACITY") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidEventCapacity)?,
            Err(_) => defaults.event_capacity,
        };

        Ok(Self {
            rounding,
            float_scale,
            event_capacity,
        })
    }
}

/// Largest supported decimal scale.
pub const MAX_SCALE: u32 = 18;

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid STOCKPILE_ROUNDING value: {0} (expected half_up or half_even)")]
    InvalidRounding(String),

    #[error("invalid STOCKPILE_FLOAT_SCALE value (expected 0..=18)")]
    InvalidFloatScale,

    #[error("invalid STOCKPILE_EVENT_CAPACITY value (expected a positive integer)")]
    InvalidEventCapacity,
}
