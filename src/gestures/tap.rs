// Tap classifier
// Two-phase detection: the wrist rises above the shoulder line (arm),
// then drops back below it within a hold window (fire)

use serde_json::json;

use crate::gestures::config::{AdaptiveThresholds, GestureConfig};
use crate::gestures::emitter::Firing;
use crate::gestures::smoothing::Ema;
use crate::gestures::types::{round3, to_metadata, DebugRecord, GestureKind, Side};

/// Per-side tap state
#[derive(Debug, Clone, PartialEq)]
pub struct TapState {
    pub smoothed_y: Ema,

    pub is_armed: bool,

    /// When the current arm started (valid while armed)
    pub arm_time_ms: f64,

    /// No transitions before this time
    pub cooldown_until_ms: f64,

    /// Whether the smoothed wrist was above the peak line on the last frame
    /// outside cooldown. Arming happens on the crossing, so a raised-and-held
    /// wrist arms once; a wrist already up when the cooldown ends counts as crossing
    pub was_raised: bool,
}

impl Default for TapState {
    fn default() -> Self {
        TapState {
            smoothed_y: Ema::new(),
            is_armed: false,
            arm_time_ms: 0.0,
            cooldown_until_ms: f64::NEG_INFINITY,
            was_raised: false,
        }
    }
}

/// Tap detector for one side
#[derive(Debug, Clone)]
pub struct TapClassifier {
    side: Side,
    state: TapState,
    arming_suppressed_until_ms: f64,
}

impl TapClassifier {
    pub fn new(side: Side) -> Self {
        TapClassifier {
            side,
            state: TapState::default(),
            arming_suppressed_until_ms: f64::NEG_INFINITY,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> &TapState {
        &self.state
    }

    /// Ignore new arm transitions until `timestamp_ms`
    /// Used by the flick classifier so a fast flick isn't also read as a tap
    pub fn suppress_arming_until(&mut self, timestamp_ms: f64) {
        self.arming_suppressed_until_ms = self.arming_suppressed_until_ms.max(timestamp_ms);
    }

    /// Drop a pending arm without firing
    pub fn disarm(&mut self) {
        self.state.is_armed = false;
    }

    pub fn reset(&mut self) {
        self.state = TapState::default();
        self.arming_suppressed_until_ms = f64::NEG_INFINITY;
    }

    /// Feed one validated frame's wrist and shoulder Y
    pub fn update(
        &mut self,
        wrist_y: f64,
        shoulder_y: f64,
        now_ms: f64,
        config: &GestureConfig,
        thresholds: &AdaptiveThresholds,
        diagnostics: &mut Vec<DebugRecord>,
    ) -> Option<Firing> {
        let smoothed = self.state.smoothed_y.update(wrist_y, config.ema_alpha);
        let peak_threshold = shoulder_y - thresholds.tap_peak_delta;
        let drop_threshold = shoulder_y + thresholds.tap_drop_hysteresis;

        if now_ms < self.state.cooldown_until_ms {
            return None;
        }

        let raised = smoothed < peak_threshold;
        let crossed_up = raised && !self.state.was_raised;
        self.state.was_raised = raised;

        if !self.state.is_armed {
            if crossed_up && now_ms >= self.arming_suppressed_until_ms {
                self.state.is_armed = true;
                self.state.arm_time_ms = now_ms;
                diagnostics.push(self.record("tap.arm", now_ms, smoothed, shoulder_y, 0.0));
            }
            return None;
        }

        let time_armed = now_ms - self.state.arm_time_ms;

        if time_armed > thresholds.tap_max_hold_ms {
            self.state.is_armed = false;
            diagnostics.push(self.record("tap.timeout", now_ms, smoothed, shoulder_y, time_armed));
            return None;
        }

        if time_armed >= config.tap_min_hold_ms && smoothed > drop_threshold {
            self.state.is_armed = false;
            let cooldown_until = now_ms + config.tap_cooldown_ms;
            self.state.cooldown_until_ms = cooldown_until;

            let metadata = to_metadata(json!({
                "side": self.side.as_str(),
                "timeArmed": time_armed,
                "peakY": round3(smoothed),
                "shoulderY": round3(shoulder_y),
            }));

            return Some(Firing::new(GestureKind::tap(self.side), now_ms, cooldown_until, metadata));
        }

        None
    }

    fn record(&self, name: &str, now_ms: f64, smoothed: f64, shoulder_y: f64, time_armed: f64) -> DebugRecord {
        let metadata = to_metadata(json!({
            "side": self.side.as_str(),
            "smoothedY": round3(smoothed),
            "shoulderY": round3(shoulder_y),
            "timeArmed": time_armed,
        }));
        DebugRecord::new(name, now_ms, metadata)
    }
}
