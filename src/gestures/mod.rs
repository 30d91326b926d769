// Gesture recognition module
// Tap, flick, and double-chop halt classifiers over smoothed pose landmarks

pub mod calibration;
pub mod chop;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod flick;
pub mod smoothing;
pub mod tap;
pub mod types;

pub use calibration::{
    run_calibration, CalibrationError, CalibrationOutcome, CalibrationProfile, CalibrationReport, Calibrator,
};
pub use config::{AdaptiveThresholds, ConfigError, GestureConfig, GestureMode, ThresholdStore, TuningOverrides};
pub use engine::GestureEngine;
pub use types::{DebugRecord, GestureEvent, GestureKind, Metadata, Side};
