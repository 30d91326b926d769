// Gesture calibration
// Collects a short window of resting-pose frames and derives per-session
// thresholds from the user's shoulder width and wrist noise

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::bus::LandmarkStream;
use crate::gestures::config::{AdaptiveThresholds, ThresholdStore};
use crate::landmarks::{validate_frame, Frame};

/// Fewest valid samples a calibration may be derived from
pub const MIN_CALIBRATION_SAMPLES: usize = 10;

/// Extra wall-clock time allowed past the collection window
pub const TIMEOUT_GRACE: Duration = Duration::from_millis(500);

/// Consecutive samples further apart than this don't contribute a speed
const MAX_SPEED_GAP_MS: f64 = 100.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Calibration already in progress")]
    AlreadyRunning,

    #[error("Insufficient calibration samples: {collected} collected, {required} required")]
    InsufficientSamples { collected: usize, required: usize },

    #[error("Calibration timed out with {collected} valid samples")]
    Timeout { collected: usize },

    #[error("Landmark stream closed during calibration")]
    StreamClosed,
}

/// Per-frame snapshot taken while calibrating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub left_shoulder_y: f64,
    pub right_shoulder_y: f64,
    pub left_wrist_y: f64,
    pub right_wrist_y: f64,
    pub shoulder_width: f64,
    pub timestamp_ms: f64,
}

/// Baseline statistics and the thresholds derived from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub samples: usize,
    pub shoulder_width: f64,
    pub left_shoulder_y: f64,
    pub right_shoulder_y: f64,
    pub left_wrist_mean: f64,
    pub left_wrist_stddev: f64,
    pub right_wrist_mean: f64,
    pub right_wrist_stddev: f64,

    /// Larger of the two wrist stddevs
    pub wrist_noise: f64,

    /// Mean absolute per-frame wrist speed (units/s)
    pub left_wrist_speed: f64,
    pub right_wrist_speed: f64,

    pub thresholds: AdaptiveThresholds,
}

impl CalibrationReport {
    pub fn from_samples(samples: &[CalibrationSample]) -> Result<Self, CalibrationError> {
        if samples.len() < MIN_CALIBRATION_SAMPLES {
            return Err(CalibrationError::InsufficientSamples {
                collected: samples.len(),
                required: MIN_CALIBRATION_SAMPLES,
            });
        }

        let column = |f: fn(&CalibrationSample) -> f64| samples.iter().map(f).collect::<Vec<_>>();
        let left_wrist = column(|s| s.left_wrist_y);
        let right_wrist = column(|s| s.right_wrist_y);

        let shoulder_width = mean(&column(|s| s.shoulder_width));
        let left_wrist_stddev = stddev(&left_wrist);
        let right_wrist_stddev = stddev(&right_wrist);
        let wrist_noise = left_wrist_stddev.max(right_wrist_stddev);
        let (left_wrist_speed, right_wrist_speed) = wrist_speeds(samples);

        Ok(CalibrationReport {
            samples: samples.len(),
            shoulder_width,
            left_shoulder_y: mean(&column(|s| s.left_shoulder_y)),
            right_shoulder_y: mean(&column(|s| s.right_shoulder_y)),
            left_wrist_mean: mean(&left_wrist),
            left_wrist_stddev,
            right_wrist_mean: mean(&right_wrist),
            right_wrist_stddev,
            wrist_noise,
            left_wrist_speed,
            right_wrist_speed,
            thresholds: derive_thresholds(shoulder_width, wrist_noise),
        })
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n - 1) standard deviation; 0 for fewer than two values
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn wrist_speeds(samples: &[CalibrationSample]) -> (f64, f64) {
    let mut left = Vec::new();
    let mut right = Vec::new();

    for pair in samples.windows(2) {
        let dt_ms = pair[1].timestamp_ms - pair[0].timestamp_ms;
        if dt_ms > 0.0 && dt_ms < MAX_SPEED_GAP_MS {
            let dt = dt_ms / 1000.0;
            left.push((pair[1].left_wrist_y - pair[0].left_wrist_y).abs() / dt);
            right.push((pair[1].right_wrist_y - pair[0].right_wrist_y).abs() / dt);
        }
    }

    (mean(&left), mean(&right))
}

/// Scale baseline noise and body size into thresholds, clamped to safe ranges
/// Noisier wrists get wider tap lines; narrower (further away) bodies get
/// longer tap holds and deeper, faster chops
pub fn derive_thresholds(shoulder_width: f64, wrist_noise: f64) -> AdaptiveThresholds {
    AdaptiveThresholds {
        tap_peak_delta: (2.5 * wrist_noise).max(0.06).clamp(0.05, 0.12),
        tap_drop_hysteresis: (1.5 * wrist_noise).max(0.03).clamp(0.02, 0.08),
        tap_max_hold_ms: (500.0 + 100.0 * (1.0 - shoulder_width / 0.3)).clamp(450.0, 700.0),
        chop_delta: (0.10 + 0.15 * (0.25 - shoulder_width)).clamp(0.10, 0.18),
        chop_min_speed: (0.85 + 0.3 * (0.25 - shoulder_width)).clamp(0.80, 1.25),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    Collecting,
    Complete,
}

/// Synchronous sample collector
/// The window opens at the first observed frame and closes on the first frame
/// past `duration_ms`, or once `target_samples` valid samples are in
#[derive(Debug, Clone)]
pub struct Calibrator {
    duration_ms: f64,
    min_visibility: f64,
    target_samples: Option<usize>,
    started_at_ms: Option<f64>,
    samples: Vec<CalibrationSample>,
}

impl Calibrator {
    pub fn new(duration_ms: f64, min_visibility: f64) -> Self {
        Calibrator {
            duration_ms,
            min_visibility,
            target_samples: None,
            started_at_ms: None,
            samples: Vec::new(),
        }
    }

    /// Finish early once `target` valid samples have been collected
    pub fn with_target_samples(mut self, target: usize) -> Self {
        self.target_samples = Some(target.max(MIN_CALIBRATION_SAMPLES));
        self
    }

    pub fn observe(&mut self, frame: &Frame) -> CalibrationStep {
        let start = *self.started_at_ms.get_or_insert(frame.timestamp_ms);
        if frame.timestamp_ms - start > self.duration_ms {
            return CalibrationStep::Complete;
        }

        if let Ok(points) = validate_frame(frame, self.min_visibility) {
            self.samples.push(CalibrationSample {
                left_shoulder_y: points.left_shoulder.y,
                right_shoulder_y: points.right_shoulder.y,
                left_wrist_y: points.left_wrist.y,
                right_wrist_y: points.right_wrist.y,
                shoulder_width: points.shoulder_width(),
                timestamp_ms: frame.timestamp_ms,
            });
        }

        match self.target_samples {
            Some(target) if self.samples.len() >= target => CalibrationStep::Complete,
            _ => CalibrationStep::Collecting,
        }
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn report(&self) -> Result<CalibrationReport, CalibrationError> {
        CalibrationReport::from_samples(&self.samples)
    }
}

/// Result of a calibrate request
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// A new calibration ran and its thresholds are now installed
    Calibrated(CalibrationReport),

    /// The session was already calibrated; nothing was collected
    AlreadyCalibrated(AdaptiveThresholds),
}

impl CalibrationOutcome {
    pub fn thresholds(&self) -> AdaptiveThresholds {
        match self {
            CalibrationOutcome::Calibrated(report) => report.thresholds,
            CalibrationOutcome::AlreadyCalibrated(thresholds) => *thresholds,
        }
    }
}

/// Releases the store's calibration slot however the run ends
struct SlotGuard<'a>(&'a ThresholdStore);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.end_calibration();
    }
}

/// Calibrate from live frames
/// Installs its own listener on `stream`, independent of the engine's, and
/// removes it before returning on every path
pub async fn run_calibration(
    stream: LandmarkStream,
    store: Rc<ThresholdStore>,
    min_visibility: f64,
    duration: Duration,
) -> Result<CalibrationOutcome, CalibrationError> {
    if store.is_calibrated() {
        log::info!("Already calibrated, skipping");
        return Ok(CalibrationOutcome::AlreadyCalibrated(store.get()));
    }
    if !store.begin_calibration() {
        return Err(CalibrationError::AlreadyRunning);
    }
    let _slot = SlotGuard(&store);

    log::info!("Starting gesture calibration ({} ms)", duration.as_millis());

    let calibrator = Rc::new(RefCell::new(Calibrator::new(
        duration.as_secs_f64() * 1000.0,
        min_visibility,
    )));
    let (tx, rx) = oneshot::channel::<()>();

    let collector = Rc::clone(&calibrator);
    let mut done = Some(tx);
    let subscription = stream.subscribe(move |frame: &Frame| {
        if done.is_none() {
            return;
        }
        if collector.borrow_mut().observe(frame) == CalibrationStep::Complete {
            if let Some(tx) = done.take() {
                let _ = tx.send(());
            }
        }
    });

    let waited = tokio::time::timeout(duration + TIMEOUT_GRACE, rx).await;
    subscription.unsubscribe();

    let calibrator = calibrator.borrow();
    let result = match waited {
        Ok(Ok(())) => calibrator.report(),
        Ok(Err(_)) => Err(CalibrationError::StreamClosed),
        // Frames stopped short of the window; usable only if enough arrived
        Err(_) if calibrator.len() >= MIN_CALIBRATION_SAMPLES => calibrator.report(),
        Err(_) => Err(CalibrationError::Timeout {
            collected: calibrator.len(),
        }),
    };

    match result {
        Ok(report) => {
            store.set_calibrated(report.thresholds);
            log::info!(
                "Calibrated: tapPeak={:.3} tapHyst={:.3} tapMaxMs={:.0} chopDelta={:.3} chopSpeed={:.3} samples={} shoulderWidth={:.3} wristNoise={:.4}",
                report.thresholds.tap_peak_delta,
                report.thresholds.tap_drop_hysteresis,
                report.thresholds.tap_max_hold_ms,
                report.thresholds.chop_delta,
                report.thresholds.chop_min_speed,
                report.samples,
                report.shoulder_width,
                report.wrist_noise,
            );
            Ok(CalibrationOutcome::Calibrated(report))
        }
        Err(e) => {
            log::warn!("Calibration failed: {}", e);
            Err(e)
        }
    }
}

/// Saved calibration, reusable across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Profile name (e.g., "Living room, standing")
    pub name: String,

    pub thresholds: AdaptiveThresholds,

    /// Statistics behind the thresholds, when they came from a calibration run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CalibrationReport>,

    /// Profile version for future compatibility
    pub version: u32,

    /// Creation timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CalibrationProfile {
    pub fn new(name: String, thresholds: AdaptiveThresholds) -> Self {
        CalibrationProfile {
            name,
            thresholds,
            report: None,
            version: 1,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn from_report(name: String, report: CalibrationReport) -> Self {
        CalibrationProfile {
            thresholds: report.thresholds,
            report: Some(report),
            ..CalibrationProfile::new(name, AdaptiveThresholds::default())
        }
    }

    /// Serialize profile to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Deserialize profile from JSON bytes
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
