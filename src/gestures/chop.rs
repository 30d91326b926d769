// Chop/halt classifier
// Each wrist chops down past its shoulder independently; two chops inside the
// pairing window make one halt

use serde_json::json;

use crate::gestures::config::{AdaptiveThresholds, GestureConfig};
use crate::gestures::emitter::Firing;
use crate::gestures::smoothing::Ema;
use crate::gestures::types::{round3, to_metadata, DebugRecord, GestureKind, Metadata, Side};
use crate::landmarks::PosePoints;

/// Per-side chop state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChopState {
    pub has_chopped: bool,

    /// When the pending chop was detected (valid while `has_chopped`)
    pub chop_time_ms: f64,

    pub smoothed_y: Ema,

    /// Smoothed Y and timestamp of the previous frame, for speed
    pub last_y: f64,
    pub last_time_ms: f64,
}

impl ChopState {
    /// Advance the smoother and return the downward speed (units/s)
    /// None on the seeding frame and on non-increasing timestamps
    fn advance(&mut self, wrist_y: f64, now_ms: f64, alpha: f64) -> Option<(f64, f64)> {
        if !self.smoothed_y.is_seeded() {
            let seeded = self.smoothed_y.update(wrist_y, alpha);
            self.last_y = seeded;
            self.last_time_ms = now_ms;
            return None;
        }

        let smoothed = self.smoothed_y.update(wrist_y, alpha);
        let delta_t = (now_ms - self.last_time_ms) / 1000.0;
        if delta_t <= 0.0 {
            return None;
        }

        let speed = (smoothed - self.last_y) / delta_t;
        self.last_y = smoothed;
        self.last_time_ms = now_ms;
        Some((smoothed, speed))
    }

    /// Whether the smoothed wrist sits above `line` (image Y grows downward)
    fn is_above(&self, line: f64) -> bool {
        self.smoothed_y.value().is_some_and(|y| y < line)
    }
}

/// Joint state of both sides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HaltState {
    pub left: ChopState,
    pub right: ChopState,
    pub last_halt_ms: Option<f64>,

    /// Set by a halt; cleared once both wrists come back up past the hysteresis line
    pub suppress_until_return: bool,
}

impl HaltState {
    fn side_mut(&mut self, side: Side) -> &mut ChopState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HaltClassifier {
    state: HaltState,
}

impl HaltClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &HaltState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = HaltState::default();
    }

    pub fn in_cooldown(&self, now_ms: f64, config: &GestureConfig) -> bool {
        self.state
            .last_halt_ms
            .is_some_and(|last| now_ms - last < config.halt_cooldown_ms)
    }

    pub fn update(
        &mut self,
        points: &PosePoints,
        now_ms: f64,
        config: &GestureConfig,
        thresholds: &AdaptiveThresholds,
        diagnostics: &mut Vec<DebugRecord>,
    ) -> Option<Firing> {
        if self.in_cooldown(now_ms, config) {
            return None;
        }

        self.detect_chop(Side::Left, points.left_wrist.y, points.left_shoulder.y, now_ms, config, thresholds, diagnostics);
        self.detect_chop(Side::Right, points.right_wrist.y, points.right_shoulder.y, now_ms, config, thresholds, diagnostics);

        let firing = self.pair(now_ms, config, diagnostics);

        self.expire(now_ms, config, diagnostics);
        self.check_rearm(points, now_ms, config, diagnostics);

        firing
    }

    #[allow(clippy::too_many_arguments)]
    fn detect_chop(
        &mut self,
        side: Side,
        wrist_y: f64,
        shoulder_y: f64,
        now_ms: f64,
        config: &GestureConfig,
        thresholds: &AdaptiveThresholds,
        diagnostics: &mut Vec<DebugRecord>,
    ) {
        let chop = self.state.side_mut(side);
        let Some((smoothed, speed)) = chop.advance(wrist_y, now_ms, config.ema_alpha) else {
            return;
        };

        let chop_line = shoulder_y + thresholds.chop_delta;
        if !chop.has_chopped && smoothed > chop_line && speed >= thresholds.chop_min_speed {
            chop.has_chopped = true;
            chop.chop_time_ms = now_ms;

            let name = match side {
                Side::Left => "chop.left",
                Side::Right => "chop.right",
            };
            let metadata = to_metadata(json!({
                "smoothedY": round3(smoothed),
                "shoulderY": round3(shoulder_y),
                "speed": round3(speed),
            }));
            diagnostics.push(DebugRecord::new(name, now_ms, metadata));
        }
    }

    fn pair(&mut self, now_ms: f64, config: &GestureConfig, diagnostics: &mut Vec<DebugRecord>) -> Option<Firing> {
        let (left, right) = (&self.state.left, &self.state.right);
        if !(left.has_chopped && right.has_chopped) {
            return None;
        }

        let time_diff = (left.chop_time_ms - right.chop_time_ms).abs();
        if time_diff > config.chop_pair_ms {
            return None;
        }

        let metadata = to_metadata(json!({
            "leftChopTime": left.chop_time_ms,
            "rightChopTime": right.chop_time_ms,
            "timeDiff": time_diff,
        }));

        self.state.left.has_chopped = false;
        self.state.right.has_chopped = false;

        if self.state.suppress_until_return {
            // Pair consumed; wrists haven't come back up yet
            diagnostics.push(DebugRecord::new("halt.suppressed", now_ms, metadata));
            return None;
        }

        self.state.last_halt_ms = Some(now_ms);
        self.state.suppress_until_return = true;

        let cooldown_until = now_ms + config.halt_cooldown_ms;
        Some(Firing::new(GestureKind::Halt, now_ms, cooldown_until, metadata))
    }

    fn expire(&mut self, now_ms: f64, config: &GestureConfig, diagnostics: &mut Vec<DebugRecord>) {
        for side in [Side::Left, Side::Right] {
            let chop = self.state.side_mut(side);
            if chop.has_chopped && now_ms - chop.chop_time_ms > config.chop_pair_ms {
                chop.has_chopped = false;
                let metadata = to_metadata(json!({
                    "side": side.as_str(),
                    "chopTime": chop.chop_time_ms,
                }));
                diagnostics.push(DebugRecord::new("chop.expired", now_ms, metadata));
            }
        }
    }

    fn check_rearm(
        &mut self,
        points: &PosePoints,
        now_ms: f64,
        config: &GestureConfig,
        diagnostics: &mut Vec<DebugRecord>,
    ) {
        if !self.state.suppress_until_return {
            return;
        }

        let back = config.halt_hysteresis_back;
        let left_up = self.state.left.is_above(points.left_shoulder.y - back);
        let right_up = self.state.right.is_above(points.right_shoulder.y - back);

        if left_up && right_up {
            self.state.suppress_until_return = false;
            diagnostics.push(DebugRecord::new("halt.rearm", now_ms, Metadata::new()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkSample;

    const SHOULDER: f64 = 0.5;
    const UP: f64 = 0.40;
    const MID: f64 = 0.55;
    const DOWN: f64 = 0.70;

    fn points(left_y: f64, right_y: f64) -> PosePoints {
        PosePoints {
            left_shoulder: LandmarkSample::new(0.4, SHOULDER),
            right_shoulder: LandmarkSample::new(0.6, SHOULDER),
            left_wrist: LandmarkSample::new(0.35, left_y),
            right_wrist: LandmarkSample::new(0.65, right_y),
        }
    }

    struct Run {
        halt: HaltClassifier,
        config: GestureConfig,
        thresholds: AdaptiveThresholds,
        diagnostics: Vec<DebugRecord>,
        fired: Vec<Firing>,
    }

    impl Run {
        fn new() -> Self {
            // Unsmoothed so each frame's position is exact
            let config = GestureConfig {
                ema_alpha: 1.0,
                ..GestureConfig::default()
            };
            Run {
                halt: HaltClassifier::new(),
                config,
                thresholds: AdaptiveThresholds::default(),
                diagnostics: Vec::new(),
                fired: Vec::new(),
            }
        }

        fn frame(&mut self, t: f64, left_y: f64, right_y: f64) {
            if let Some(f) = self.halt.update(
                &points(left_y, right_y),
                t,
                &self.config,
                &self.thresholds,
                &mut self.diagnostics,
            ) {
                self.fired.push(f);
            }
        }

        /// Left wrist chops at `left_at`, right at `right_at`, 50 ms frames over [from, to]
        fn double_chop(&mut self, from: f64, to: f64, left_at: f64, right_at: f64, rest: f64) {
            let mut t = from;
            while t <= to {
                let left = if t >= left_at { DOWN } else { rest };
                let right = if t >= right_at { DOWN } else { rest };
                self.frame(t, left, right);
                t += 50.0;
            }
        }

        fn count(&self, name: &str) -> usize {
            self.diagnostics.iter().filter(|d| d.name == name).count()
        }
    }

    #[test]
    fn test_chop_pair_fires_halt() {
        let mut run = Run::new();
        run.double_chop(-200.0, 600.0, 0.0, 250.0, UP);

        assert_eq!(run.fired.len(), 1);
        let halt = &run.fired[0];
        assert_eq!(halt.kind, GestureKind::Halt);
        assert_eq!(halt.timestamp_ms, 250.0);
        assert_eq!(halt.metadata["timeDiff"], 250.0);
        assert_eq!(halt.cooldown_until_ms, 1750.0);
        assert!(run.halt.state().suppress_until_return);
    }

    #[test]
    fn test_chop_pair_miss() {
        let mut run = Run::new();
        run.double_chop(-200.0, 800.0, 0.0, 400.0, UP);

        assert!(run.fired.is_empty());
        assert_eq!(run.count("chop.expired"), 2);
        assert!(!run.halt.state().left.has_chopped);
        assert!(!run.halt.state().right.has_chopped);
    }

    #[test]
    fn test_slow_descent_is_not_a_chop() {
        let mut run = Run::new();
        // 0.40 -> 0.70 over 1.5 s is 0.2/s, well under the chop speed
        let mut t = 0.0;
        let mut y = UP;
        while y <= DOWN {
            run.frame(t, y, y);
            t += 50.0;
            y += 0.01;
        }

        assert!(run.fired.is_empty());
        assert_eq!(run.count("chop.left"), 0);
    }

    #[test]
    fn test_rearm_requires_return_above_hysteresis_line() {
        let mut run = Run::new();
        run.double_chop(-200.0, 300.0, 0.0, 100.0, UP);
        assert_eq!(run.fired.len(), 1);

        // After the cooldown, chop again from a mid position that never
        // returned above shoulder - 0.06
        run.double_chop(1800.0, 2200.0, 1900.0, 1950.0, MID);
        assert_eq!(run.fired.len(), 1);
        assert_eq!(run.count("halt.suppressed"), 1);

        // Return both wrists up, then a qualifying double chop fires
        run.frame(2250.0, UP, UP);
        assert!(!run.halt.state().suppress_until_return);
        run.double_chop(2300.0, 2600.0, 2400.0, 2450.0, UP);

        assert_eq!(run.fired.len(), 2);
        assert_eq!(run.fired[1].timestamp_ms, 2450.0);
    }

    #[test]
    fn test_cooldown_blocks_second_halt() {
        let mut run = Run::new();
        run.double_chop(-200.0, 300.0, 0.0, 100.0, UP);
        assert_eq!(run.fired.len(), 1);

        run.double_chop(350.0, 1000.0, 500.0, 550.0, UP);
        assert_eq!(run.fired.len(), 1);
        assert_eq!(run.count("chop.left"), 1);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut run = Run::new();
        run.double_chop(-200.0, 300.0, 0.0, 100.0, UP);
        run.halt.reset();

        assert_eq!(*run.halt.state(), HaltState::default());
        assert!(!run.halt.in_cooldown(400.0, &run.config));
    }
}
