// Conductor - hands-free music control from body gestures
// Module declarations

pub mod bus;
pub mod diagnostics;
pub mod gestures;
pub mod host;
pub mod landmarks;
pub mod storage;

pub use bus::{event_bus, landmark_stream, EventBus, Hub, LandmarkStream, Subscription};
pub use gestures::{
    CalibrationError, CalibrationOutcome, ConfigError, DebugRecord, GestureConfig, GestureEngine, GestureEvent,
    GestureKind, GestureMode, ThresholdStore, TuningOverrides,
};
pub use host::GestureHost;
pub use landmarks::{BodyPoint, Frame, LandmarkSample};
