// Gesture host
// Owns the session-wide plumbing and gates the engine on the camera switch

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use crate::bus::{event_bus, landmark_stream, EventBus, LandmarkStream};
use crate::gestures::{
    run_calibration, CalibrationError, CalibrationOutcome, ConfigError, GestureConfig, GestureEngine,
    ThresholdStore, TuningOverrides,
};
use crate::landmarks::Frame;

/// Session host for gesture recognition
///
/// The engine exists only while the camera is enabled. Disabling disposes and
/// drops it, so nothing from a previous run leaks into the next one. The
/// threshold store, and so any calibration, lives for the whole session.
pub struct GestureHost {
    stream: LandmarkStream,
    bus: EventBus,
    store: Rc<ThresholdStore>,
    config: RefCell<GestureConfig>,
    engine: RefCell<Option<Rc<GestureEngine>>>,
}

impl GestureHost {
    pub fn new(config: GestureConfig) -> Self {
        GestureHost {
            stream: landmark_stream(),
            bus: event_bus(),
            store: Rc::new(ThresholdStore::new()),
            config: RefCell::new(config),
            engine: RefCell::new(None),
        }
    }

    pub fn stream(&self) -> &LandmarkStream {
        &self.stream
    }

    /// Where gestures are published
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Rc<ThresholdStore> {
        &self.store
    }

    pub fn camera_enabled(&self) -> bool {
        self.engine.borrow().is_some()
    }

    /// The live engine, if the camera is on
    pub fn engine(&self) -> Option<Rc<GestureEngine>> {
        self.engine.borrow().clone()
    }

    pub fn set_camera_enabled(&self, enabled: bool) {
        if enabled == self.camera_enabled() {
            return;
        }

        if enabled {
            let engine = Rc::new(GestureEngine::new(
                self.stream.clone(),
                self.bus.clone(),
                Rc::clone(&self.store),
                self.config.borrow().clone(),
            ));
            engine.init();
            *self.engine.borrow_mut() = Some(engine);
            log::info!("Camera enabled; gesture engine started");
        } else {
            let engine = self.engine.borrow_mut().take();
            if let Some(engine) = engine {
                engine.dispose();
            }
            log::info!("Camera disabled; gesture engine disposed");
        }
    }

    /// Route one frame to the engine (and any running calibration)
    /// Dropped while the camera is disabled
    pub fn push_frame(&self, frame: &Frame) {
        if !self.camera_enabled() {
            log::trace!("Camera disabled; dropping frame at {} ms", frame.timestamp_ms);
            return;
        }
        self.stream.publish(frame);
    }

    /// Apply tuning overrides to the live engine and to every later one
    pub fn configure(&self, overrides: &TuningOverrides) -> Result<(), ConfigError> {
        let mut config = self.config.borrow().clone();
        let mut thresholds = self.store.get();
        if let Err(e) = overrides.apply_to(&mut config, &mut thresholds) {
            log::warn!("Rejected tuning overrides: {}", e);
            return Err(e);
        }

        if let Some(engine) = self.engine() {
            engine.set_config(config.clone())?;
        }
        self.store.set(thresholds);
        *self.config.borrow_mut() = config;
        Ok(())
    }

    pub fn config(&self) -> GestureConfig {
        self.config.borrow().clone()
    }

    /// Calibrate from frames pushed through this host
    /// Frames only flow while the camera is enabled, so a disabled host times out
    pub fn calibrate(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<CalibrationOutcome, CalibrationError>> + 'static {
        run_calibration(
            self.stream.clone(),
            Rc::clone(&self.store),
            self.config.borrow().min_visibility,
            duration,
        )
    }
}

impl Default for GestureHost {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}
