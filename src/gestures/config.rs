// Gesture engine configuration
// Compiled-in defaults, calibratable thresholds, and the typed tuning surface

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::path::Path;
use thiserror::Error;

use crate::gestures::flick::MIN_BUFFERED;

/// Errors raised when loading or tuning configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Which classifiers run on each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureMode {
    /// Flick, both taps, and halt
    #[default]
    Full,

    /// Halt only, so arm movement while speaking can't toggle layers
    HaltOnly,
}

/// Engine constants that calibration never touches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// EMA weight of the newest sample (0, 1]
    pub ema_alpha: f64,

    /// Landmarks at or below this visibility invalidate the frame
    pub min_visibility: f64,

    /// Minimum time a tap must stay armed before the drop counts
    pub tap_min_hold_ms: f64,

    /// Per-side refractory period after a tap
    pub tap_cooldown_ms: f64,

    /// Window over which flick velocity is measured
    pub flick_window_ms: f64,

    /// History kept in the flick buffer
    pub flick_buffer_ms: f64,

    /// Hard cap on buffered flick samples
    pub flick_buffer_capacity: usize,

    /// Normalized units per second
    pub flick_min_speed: f64,

    /// Net vertical travel over the window
    pub flick_min_delta: f64,

    pub flick_cooldown_ms: f64,

    /// Right-tap arming is ignored this long after a flick
    pub flick_suppress_tap_ms: f64,

    /// Max gap between left and right chop
    pub chop_pair_ms: f64,

    pub halt_cooldown_ms: f64,

    /// Both wrists must rise this far above the shoulders before another halt
    pub halt_hysteresis_back: f64,

    pub mode: GestureMode,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            ema_alpha: 0.35,
            min_visibility: 0.6,
            tap_min_hold_ms: 120.0,
            tap_cooldown_ms: 900.0,
            flick_window_ms: 180.0,
            flick_buffer_ms: 250.0,
            flick_buffer_capacity: 15,
            flick_min_speed: 1.2,
            flick_min_delta: 0.08,
            flick_cooldown_ms: 500.0,
            flick_suppress_tap_ms: 400.0,
            chop_pair_ms: 300.0,
            halt_cooldown_ms: 1500.0,
            halt_hysteresis_back: 0.06,
            mode: GestureMode::Full,
        }
    }
}

impl GestureConfig {
    /// Check every field against its documented range
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("ema_alpha", self.ema_alpha, f64::MIN_POSITIVE, 1.0)?;
        check("min_visibility", self.min_visibility, 0.0, 1.0)?;
        check("tap_min_hold_ms", self.tap_min_hold_ms, 0.0, 2000.0)?;
        check("tap_cooldown_ms", self.tap_cooldown_ms, 0.0, 10_000.0)?;
        check("flick_window_ms", self.flick_window_ms, 20.0, 1000.0)?;
        check("flick_buffer_ms", self.flick_buffer_ms, 20.0, 2000.0)?;
        check("flick_min_speed", self.flick_min_speed, f64::MIN_POSITIVE, 20.0)?;
        check("flick_min_delta", self.flick_min_delta, f64::MIN_POSITIVE, 1.0)?;
        check("flick_cooldown_ms", self.flick_cooldown_ms, 0.0, 10_000.0)?;
        check("flick_suppress_tap_ms", self.flick_suppress_tap_ms, 0.0, 5000.0)?;
        check("chop_pair_ms", self.chop_pair_ms, 10.0, 3000.0)?;
        check("halt_cooldown_ms", self.halt_cooldown_ms, 0.0, 10_000.0)?;
        check("halt_hysteresis_back", self.halt_hysteresis_back, 0.0, 0.5)?;

        if self.flick_buffer_capacity < MIN_BUFFERED {
            return Err(ConfigError::Inconsistent(format!(
                "flick_buffer_capacity ({}) is below the {} samples a flick needs",
                self.flick_buffer_capacity, MIN_BUFFERED
            )));
        }
        if self.flick_window_ms > self.flick_buffer_ms {
            return Err(ConfigError::Inconsistent(format!(
                "flick_window_ms ({}) exceeds flick_buffer_ms ({})",
                self.flick_window_ms, self.flick_buffer_ms
            )));
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration
    /// Missing fields fall back to defaults
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        let config: GestureConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Self::from_json_bytes(&data)
    }
}

/// Per-session thresholds derived by calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    /// Wrist must rise this far above the shoulder to arm a tap
    pub tap_peak_delta: f64,

    /// Wrist must fall this far below the shoulder to fire a tap
    pub tap_drop_hysteresis: f64,

    /// Longest time a tap may stay armed
    pub tap_max_hold_ms: f64,

    /// Wrist must pass this far below the shoulder to count as a chop
    pub chop_delta: f64,

    /// Minimum downward speed of a chop (normalized units per second)
    pub chop_min_speed: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        AdaptiveThresholds {
            tap_peak_delta: 0.08,
            tap_drop_hysteresis: 0.04,
            tap_max_hold_ms: 500.0,
            chop_delta: 0.12,
            chop_min_speed: 1.0,
        }
    }
}

impl AdaptiveThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("tap_peak_delta", self.tap_peak_delta, 0.01, 0.5)?;
        check("tap_drop_hysteresis", self.tap_drop_hysteresis, 0.0, 0.5)?;
        check("tap_max_hold_ms", self.tap_max_hold_ms, 50.0, 5000.0)?;
        check("chop_delta", self.chop_delta, 0.01, 0.5)?;
        check("chop_min_speed", self.chop_min_speed, 0.05, 20.0)?;
        Ok(())
    }
}

/// Session-wide threshold slot shared by the engine and calibration
/// Outlives any single engine so a re-enabled camera keeps its calibration
#[derive(Debug, Default)]
pub struct ThresholdStore {
    thresholds: Cell<AdaptiveThresholds>,
    calibrated: Cell<bool>,
    calibrating: Cell<bool>,
}

impl ThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AdaptiveThresholds {
        self.thresholds.get()
    }

    /// Replace thresholds without touching the calibrated flag (manual tuning)
    pub fn set(&self, thresholds: AdaptiveThresholds) {
        self.thresholds.set(thresholds);
    }

    /// Install calibrated thresholds; later calibrations become no-ops
    pub fn set_calibrated(&self, thresholds: AdaptiveThresholds) {
        self.thresholds.set(thresholds);
        self.calibrated.set(true);
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.get()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating.get()
    }

    /// Claim the calibration slot; false if a run is already in flight
    pub(crate) fn begin_calibration(&self) -> bool {
        !self.calibrating.replace(true)
    }

    pub(crate) fn end_calibration(&self) {
        self.calibrating.set(false);
    }
}

/// Named runtime overrides
/// Field names match the short keys used by tuning consoles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningOverrides {
    #[serde(rename = "tapPeak", skip_serializing_if = "Option::is_none")]
    pub tap_peak_delta: Option<f64>,

    #[serde(rename = "tapHyst", skip_serializing_if = "Option::is_none")]
    pub tap_drop_hysteresis: Option<f64>,

    #[serde(rename = "tapMaxMs", skip_serializing_if = "Option::is_none")]
    pub tap_max_hold_ms: Option<f64>,

    #[serde(rename = "tapCooldownMs", skip_serializing_if = "Option::is_none")]
    pub tap_cooldown_ms: Option<f64>,

    #[serde(rename = "ema", skip_serializing_if = "Option::is_none")]
    pub ema_alpha: Option<f64>,

    #[serde(rename = "minVis", skip_serializing_if = "Option::is_none")]
    pub min_visibility: Option<f64>,

    #[serde(rename = "chopDelta", skip_serializing_if = "Option::is_none")]
    pub chop_delta: Option<f64>,

    #[serde(rename = "chopSpeed", skip_serializing_if = "Option::is_none")]
    pub chop_min_speed: Option<f64>,

    #[serde(rename = "chopPairMs", skip_serializing_if = "Option::is_none")]
    pub chop_pair_ms: Option<f64>,

    #[serde(rename = "haltCooldownMs", skip_serializing_if = "Option::is_none")]
    pub halt_cooldown_ms: Option<f64>,

    #[serde(rename = "hysteresisBack", skip_serializing_if = "Option::is_none")]
    pub halt_hysteresis_back: Option<f64>,
}

impl TuningOverrides {
    pub fn is_empty(&self) -> bool {
        *self == TuningOverrides::default()
    }

    /// Apply every override or none of them
    pub fn apply_to(
        &self,
        config: &mut GestureConfig,
        thresholds: &mut AdaptiveThresholds,
    ) -> Result<(), ConfigError> {
        let mut next_config = config.clone();
        let mut next = *thresholds;

        if let Some(v) = self.tap_peak_delta {
            next.tap_peak_delta = v;
        }
        if let Some(v) = self.tap_drop_hysteresis {
            next.tap_drop_hysteresis = v;
        }
        if let Some(v) = self.tap_max_hold_ms {
            next.tap_max_hold_ms = v;
        }
        if let Some(v) = self.chop_delta {
            next.chop_delta = v;
        }
        if let Some(v) = self.chop_min_speed {
            next.chop_min_speed = v;
        }
        if let Some(v) = self.tap_cooldown_ms {
            next_config.tap_cooldown_ms = v;
        }
        if let Some(v) = self.ema_alpha {
            next_config.ema_alpha = v;
        }
        if let Some(v) = self.min_visibility {
            next_config.min_visibility = v;
        }
        if let Some(v) = self.chop_pair_ms {
            next_config.chop_pair_ms = v;
        }
        if let Some(v) = self.halt_cooldown_ms {
            next_config.halt_cooldown_ms = v;
        }
        if let Some(v) = self.halt_hysteresis_back {
            next_config.halt_hysteresis_back = v;
        }

        next_config.validate()?;
        next.validate()?;
        if next.tap_max_hold_ms < next_config.tap_min_hold_ms {
            return Err(ConfigError::Inconsistent(format!(
                "tap_max_hold_ms ({}) is below tap_min_hold_ms ({})",
                next.tap_max_hold_ms, next_config.tap_min_hold_ms
            )));
        }

        *config = next_config;
        *thresholds = next;
        Ok(())
    }
}
