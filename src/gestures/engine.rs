// Gesture engine
// Owns every classifier for one session and runs them against each incoming frame

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use crate::bus::{EventBus, LandmarkStream, Subscription};
use crate::gestures::calibration::{run_calibration, CalibrationError, CalibrationOutcome, CalibrationProfile};
use crate::gestures::chop::HaltClassifier;
use crate::gestures::config::{
    AdaptiveThresholds, ConfigError, GestureConfig, GestureMode, ThresholdStore, TuningOverrides,
};
use crate::gestures::emitter::{EventEmitter, Firing};
use crate::gestures::flick::FlickClassifier;
use crate::gestures::tap::TapClassifier;
use crate::gestures::types::{DebugRecord, GestureEvent, GestureKind, Side};
use crate::landmarks::{validate_frame, Frame};

/// Classifier state; borrowed only while a frame is classified
struct EngineCore {
    config: GestureConfig,
    left_tap: TapClassifier,
    right_tap: TapClassifier,
    flick: FlickClassifier,
    halt: HaltClassifier,
}

impl EngineCore {
    fn new(config: GestureConfig) -> Self {
        EngineCore {
            config,
            left_tap: TapClassifier::new(Side::Left),
            right_tap: TapClassifier::new(Side::Right),
            flick: FlickClassifier::new(),
            halt: HaltClassifier::new(),
        }
    }

    fn reset(&mut self) {
        self.left_tap.reset();
        self.right_tap.reset();
        self.flick.reset();
        self.halt.reset();
    }

    fn classify(&mut self, frame: &Frame, thresholds: &AdaptiveThresholds) -> (Vec<Firing>, Vec<DebugRecord>) {
        let mut firings = Vec::new();
        let mut diagnostics = Vec::new();

        let points = match validate_frame(frame, self.config.min_visibility) {
            Ok(points) => points,
            Err(reason) => {
                log::trace!("Skipping frame at {} ms: {}", frame.timestamp_ms, reason);
                return (firings, diagnostics);
            }
        };
        let now = frame.timestamp_ms;
        let config = &self.config;

        if config.mode == GestureMode::Full {
            if let Some(flick) = self.flick.update(points.right_wrist.y, now, config, &mut diagnostics) {
                self.right_tap.disarm();
                self.right_tap
                    .suppress_arming_until(now + config.flick_suppress_tap_ms);
                firings.push(flick);
            }

            firings.extend(self.left_tap.update(
                points.left_wrist.y,
                points.left_shoulder.y,
                now,
                config,
                thresholds,
                &mut diagnostics,
            ));
            firings.extend(self.right_tap.update(
                points.right_wrist.y,
                points.right_shoulder.y,
                now,
                config,
                thresholds,
                &mut diagnostics,
            ));
        }

        firings.extend(self.halt.update(&points, now, config, thresholds, &mut diagnostics));

        (firings, diagnostics)
    }
}

struct EngineShared {
    core: RefCell<EngineCore>,
    emitter: EventEmitter,
    store: Rc<ThresholdStore>,
    running: Cell<bool>,
}

impl EngineShared {
    fn process(&self, frame: &Frame) -> Vec<GestureEvent> {
        if !self.running.get() {
            return Vec::new();
        }

        let thresholds = self.store.get();
        let (firings, diagnostics) = self.core.borrow_mut().classify(frame, &thresholds);

        // Core borrow is released here, so observers may call back into the engine
        let events: Vec<GestureEvent> = firings.into_iter().map(|f| self.emitter.stamp(f)).collect();
        self.emitter.deliver(&events, diagnostics);
        events
    }
}

/// Gesture recognition for one session
///
/// Construct once, `init` to start consuming the landmark stream and `dispose`
/// to stop. Both are idempotent. Gestures are published to the event bus
/// handed to `new`; classifier decisions go to observers registered with
/// `on_debug`.
pub struct GestureEngine {
    shared: Rc<EngineShared>,
    stream: LandmarkStream,
    subscription: RefCell<Option<Subscription>>,
}

impl GestureEngine {
    pub fn new(stream: LandmarkStream, bus: EventBus, store: Rc<ThresholdStore>, config: GestureConfig) -> Self {
        let emitter = EventEmitter::new(bus);
        emitter.set_enabled(false);

        GestureEngine {
            shared: Rc::new(EngineShared {
                core: RefCell::new(EngineCore::new(config)),
                emitter,
                store,
                running: Cell::new(false),
            }),
            stream,
            subscription: RefCell::new(None),
        }
    }

    /// Start consuming frames; no-op when already running
    pub fn init(&self) {
        if self.shared.running.replace(true) {
            return;
        }

        let weak = Rc::downgrade(&self.shared);
        let subscription = self.stream.subscribe(move |frame: &Frame| {
            if let Some(shared) = weak.upgrade() {
                shared.process(frame);
            }
        });
        *self.subscription.borrow_mut() = Some(subscription);
        self.shared.emitter.set_enabled(true);

        log::info!("Gesture engine initialized ({:?} mode)", self.shared.core.borrow().config.mode);
    }

    /// Stop consuming frames and forget all per-side state; no-op when not running
    /// No event is published after this returns, even mid-delivery
    pub fn dispose(&self) {
        if !self.shared.running.replace(false) {
            return;
        }

        self.shared.emitter.set_enabled(false);
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.shared.core.borrow_mut().reset();
        self.shared.emitter.reset();

        log::info!("Gesture engine disposed");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    /// Classify one frame directly, bypassing the stream
    /// Returns the events it produced (also published to the bus)
    pub fn process_frame(&self, frame: &Frame) -> Vec<GestureEvent> {
        self.shared.process(frame)
    }

    /// Register a debug observer for every classifier decision
    pub fn on_debug<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(&DebugRecord) + 'static,
    {
        self.shared.emitter.debug_hub().subscribe(observer)
    }

    /// Apply named overrides, effective from the next frame
    pub fn configure(&self, overrides: &TuningOverrides) -> Result<(), ConfigError> {
        let mut core = self.shared.core.borrow_mut();
        let mut thresholds = self.shared.store.get();

        if let Err(e) = overrides.apply_to(&mut core.config, &mut thresholds) {
            log::warn!("Rejected tuning overrides: {}", e);
            return Err(e);
        }
        self.shared.store.set(thresholds);

        log::info!(
            "Tuning applied: {}",
            serde_json::to_string(overrides).unwrap_or_default()
        );
        Ok(())
    }

    /// Replace the whole configuration, effective from the next frame
    pub fn set_config(&self, config: GestureConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.shared.core.borrow_mut().config = config;
        Ok(())
    }

    pub fn config(&self) -> GestureConfig {
        self.shared.core.borrow().config.clone()
    }

    pub fn thresholds(&self) -> AdaptiveThresholds {
        self.shared.store.get()
    }

    pub fn is_calibrated(&self) -> bool {
        self.shared.store.is_calibrated()
    }

    /// Calibrate from the live stream
    /// Runs beside normal classification; the returned future owns what it needs
    pub fn calibrate(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<CalibrationOutcome, CalibrationError>> + 'static {
        let min_visibility = self.shared.core.borrow().config.min_visibility;
        run_calibration(
            self.stream.clone(),
            Rc::clone(&self.shared.store),
            min_visibility,
            duration,
        )
    }

    /// Install thresholds from a saved profile and mark the session calibrated
    pub fn apply_profile(&self, profile: &CalibrationProfile) -> Result<(), ConfigError> {
        profile.thresholds.validate()?;
        self.shared.store.set_calibrated(profile.thresholds);
        log::info!("Applied calibration profile '{}'", profile.name);
        Ok(())
    }

    /// Remaining refractory time of `kind` at `now_ms`
    pub fn cooldown_remaining(&self, kind: GestureKind, now_ms: f64) -> f64 {
        self.shared.emitter.cooldown_remaining(kind, now_ms)
    }
}

impl Drop for GestureEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{event_bus, landmark_stream};
    use crate::gestures::calibration::derive_thresholds;
    use crate::landmarks::{BodyPoint, LandmarkSample};

    const SHOULDER: f64 = 0.5;

    fn pose(t: f64, left_wrist_y: f64, right_wrist_y: f64) -> Frame {
        Frame::new(t)
            .with_point(BodyPoint::LeftShoulder, LandmarkSample::with_visibility(0.4, SHOULDER, 0.95))
            .with_point(BodyPoint::RightShoulder, LandmarkSample::with_visibility(0.6, SHOULDER, 0.95))
            .with_point(BodyPoint::LeftWrist, LandmarkSample::with_visibility(0.35, left_wrist_y, 0.95))
            .with_point(BodyPoint::RightWrist, LandmarkSample::with_visibility(0.65, right_wrist_y, 0.95))
    }

    /// Left wrist rises 0.10 over the shoulder for 200 ms, then drops 0.05 below it
    fn left_tap(t: f64) -> (f64, f64) {
        let left = if t < 0.0 {
            SHOULDER
        } else if t <= 200.0 {
            SHOULDER - 0.10
        } else {
            SHOULDER + 0.05
        };
        (left, SHOULDER)
    }

    struct Rig {
        stream: LandmarkStream,
        engine: Rc<GestureEngine>,
        events: Rc<RefCell<Vec<GestureEvent>>>,
        _bus_sub: Subscription,
    }

    impl Rig {
        fn new(config: GestureConfig) -> Self {
            let stream = landmark_stream();
            let bus = event_bus();
            let engine = Rc::new(GestureEngine::new(
                stream.clone(),
                bus.clone(),
                Rc::new(ThresholdStore::new()),
                config,
            ));

            let events = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&events);
            let bus_sub = bus.subscribe(move |e: &GestureEvent| sink.borrow_mut().push(e.clone()));

            engine.init();
            Rig {
                stream,
                engine,
                events,
                _bus_sub: bus_sub,
            }
        }

        /// Publish frames every `step` ms over [from, to]
        fn run(&self, from: f64, to: f64, step: f64, wrists: impl Fn(f64) -> (f64, f64)) {
            let mut t = from;
            while t <= to {
                let (left, right) = wrists(t);
                self.stream.publish(&pose(t, left, right));
                t += step;
            }
        }

        fn kinds(&self) -> Vec<GestureKind> {
            self.events.borrow().iter().map(|e| e.kind).collect()
        }
    }

    #[test]
    fn test_tap_sequence_publishes_one_event() {
        let rig = Rig::new(GestureConfig::default());
        rig.run(-100.0, 800.0, 20.0, left_tap);

        assert_eq!(rig.kinds(), vec![GestureKind::TapLeft]);
        let event = &rig.events.borrow()[0];
        assert_eq!(event.topic(), "gesture.waveLeft");
        assert_eq!(event.metadata["side"], "left");
        assert_eq!(
            rig.engine.cooldown_remaining(GestureKind::TapLeft, event.timestamp_ms + 100.0),
            800.0
        );
    }

    #[test]
    fn test_flick_suppresses_right_tap() {
        let rig = Rig::new(GestureConfig::default());
        // Right wrist snaps up 0.24 in 60 ms, holds, then drops back below the shoulder
        rig.run(-100.0, 1000.0, 20.0, |t| {
            let right = match t {
                t if t <= 0.0 => SHOULDER,
                t if t <= 20.0 => 0.42,
                t if t <= 40.0 => 0.34,
                t if t < 300.0 => 0.26,
                _ => 0.56,
            };
            (SHOULDER, right)
        });

        assert_eq!(rig.kinds(), vec![GestureKind::FlickUp]);
        let flick = &rig.events.borrow()[0];
        assert_eq!(flick.timestamp_ms, 60.0);
        assert_eq!(flick.metadata["intent"], "voice.faster");
    }

    #[test]
    fn test_halt_only_mode_ignores_taps() {
        let config = GestureConfig {
            mode: GestureMode::HaltOnly,
            ..GestureConfig::default()
        };
        let rig = Rig::new(config);
        rig.run(-100.0, 800.0, 20.0, left_tap);
        assert!(rig.kinds().is_empty());

        // Both wrists raised, then chopped down 250 ms apart
        rig.run(1000.0, 2000.0, 50.0, |t| {
            let left = if t < 1200.0 { 0.40 } else { 0.90 };
            let right = if t < 1450.0 { 0.40 } else { 0.90 };
            (left, right)
        });

        assert_eq!(rig.kinds(), vec![GestureKind::Halt]);
        let halt = &rig.events.borrow()[0];
        assert_eq!(halt.topic(), "gesture.halt");
        assert_eq!(halt.metadata["timeDiff"], 250.0);
    }

    #[test]
    fn test_nan_timestamp_does_not_wedge_armed_tap() {
        let rig = Rig::new(GestureConfig::default());
        rig.run(-100.0, 100.0, 20.0, left_tap);
        rig.stream.publish(&pose(f64::NAN, SHOULDER + 0.05, SHOULDER));
        rig.run(120.0, 800.0, 20.0, left_tap);

        assert_eq!(rig.kinds(), vec![GestureKind::TapLeft]);
        assert_eq!(rig.events.borrow()[0].timestamp_ms, 340.0);
    }

    #[test]
    fn test_invalid_frames_are_skipped() {
        let rig = Rig::new(GestureConfig::default());
        let records = Rc::new(Cell::new(0));
        let r = Rc::clone(&records);
        let _debug = rig.engine.on_debug(move |_| r.set(r.get() + 1));

        // Wrist visibility at the threshold is not enough
        let mut t = -100.0;
        while t <= 800.0 {
            let (left, right) = left_tap(t);
            let mut frame = pose(t, left, right);
            frame
                .points
                .insert(BodyPoint::LeftWrist, LandmarkSample::with_visibility(0.35, left, 0.6));
            assert!(rig.engine.process_frame(&frame).is_empty());
            t += 20.0;
        }

        assert_eq!(records.get(), 0);
        assert!(rig.events.borrow().is_empty());
    }

    #[test]
    fn test_debug_observers_see_decisions() {
        let rig = Rig::new(GestureConfig::default());
        let names = Rc::new(RefCell::new(Vec::new()));
        let n = Rc::clone(&names);
        let _debug = rig.engine.on_debug(move |r| n.borrow_mut().push(r.name.clone()));

        rig.run(-100.0, 800.0, 20.0, left_tap);

        let names = names.borrow();
        assert!(names.iter().any(|n| n == "tap.arm"));
        assert!(names.iter().any(|n| n == "flick.eval"));
        assert_eq!(names.iter().filter(|n| *n == "tap.drums").count(), 1);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_recognition() {
        let rig = Rig::new(GestureConfig::default());
        let _debug = rig.engine.on_debug(|_| panic!("broken observer"));

        rig.run(-100.0, 800.0, 20.0, left_tap);

        assert_eq!(rig.kinds(), vec![GestureKind::TapLeft]);
    }

    #[test]
    fn test_dispose_is_idempotent_and_final() {
        let rig = Rig::new(GestureConfig::default());
        rig.run(-100.0, 200.0, 20.0, left_tap);

        rig.engine.dispose();
        rig.engine.dispose();
        assert!(!rig.engine.is_running());
        assert_eq!(rig.stream.listener_count(), 0);

        rig.run(220.0, 800.0, 20.0, left_tap);
        assert!(rig.events.borrow().is_empty());
        assert!(rig.engine.process_frame(&pose(820.0, SHOULDER, SHOULDER)).is_empty());
    }

    #[test]
    fn test_reinit_starts_from_clean_state() {
        let rig = Rig::new(GestureConfig::default());
        // Armed when disposed
        rig.run(-100.0, 200.0, 20.0, left_tap);
        rig.engine.dispose();

        rig.engine.init();
        rig.engine.init();
        assert_eq!(rig.stream.listener_count(), 1);

        // The drop alone can't fire a tap that was never armed in this run
        rig.run(220.0, 800.0, 20.0, left_tap);
        assert!(rig.events.borrow().is_empty());
    }

    #[test]
    fn test_observer_can_dispose_mid_delivery() {
        let rig = Rig::new(GestureConfig::default());
        let engine = Rc::clone(&rig.engine);
        let _stop = rig.engine.on_debug(move |r| {
            if r.name == "tap.drums" {
                engine.dispose();
            }
        });

        rig.run(-100.0, 800.0, 20.0, left_tap);

        // Disposed between the debug record and the bus publish
        assert!(rig.events.borrow().is_empty());
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn test_configure_takes_effect_next_frame() {
        let rig = Rig::new(GestureConfig::default());
        let raise_more = TuningOverrides {
            tap_peak_delta: Some(0.12),
            ..Default::default()
        };
        rig.engine.configure(&raise_more).unwrap();
        assert_eq!(rig.engine.thresholds().tap_peak_delta, 0.12);

        // A 0.10 rise no longer arms
        rig.run(-100.0, 800.0, 20.0, left_tap);
        assert!(rig.kinds().is_empty());
    }

    #[test]
    fn test_rejected_overrides_change_nothing() {
        let rig = Rig::new(GestureConfig::default());
        let bad = TuningOverrides {
            tap_peak_delta: Some(0.1),
            ema_alpha: Some(0.0),
            ..Default::default()
        };

        assert!(rig.engine.configure(&bad).is_err());
        assert_eq!(rig.engine.thresholds(), AdaptiveThresholds::default());
        assert_eq!(rig.engine.config(), GestureConfig::default());
    }

    #[test]
    fn test_apply_profile_marks_calibrated() {
        let rig = Rig::new(GestureConfig::default());
        let thresholds = derive_thresholds(0.2, 0.05);
        let profile = CalibrationProfile::new("Desk".to_string(), thresholds);

        rig.engine.apply_profile(&profile).unwrap();

        assert!(rig.engine.is_calibrated());
        assert_eq!(rig.engine.thresholds(), thresholds);
    }

    #[tokio::test]
    async fn test_calibrate_runs_beside_classification() {
        let rig = Rig::new(GestureConfig::default());

        let calibration = rig.engine.calibrate(Duration::from_millis(1000));
        let feed = async {
            tokio::task::yield_now().await;
            rig.run(0.0, 1100.0, 33.0, |t| {
                let jitter = if (t as i64 / 33) % 2 == 0 { 0.0 } else { 0.01 };
                (0.62 + jitter, 0.62)
            });
        };
        let (outcome, ()) = tokio::join!(calibration, feed);

        let outcome = outcome.unwrap();
        assert!(matches!(outcome, CalibrationOutcome::Calibrated(_)));
        assert_eq!(rig.engine.thresholds(), outcome.thresholds());
        // Only the engine's own listener remains
        assert_eq!(rig.stream.listener_count(), 1);

        let again = rig.engine.calibrate(Duration::from_millis(1000)).await.unwrap();
        assert_eq!(again, CalibrationOutcome::AlreadyCalibrated(outcome.thresholds()));
    }
}
