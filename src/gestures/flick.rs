// Flick classifier
// Short vertical velocity bursts of the right wrist, measured over a sliding window

use serde_json::json;
use std::collections::VecDeque;

use crate::gestures::config::GestureConfig;
use crate::gestures::emitter::Firing;
use crate::gestures::types::{round3, to_metadata, DebugRecord, GestureKind};

/// Minimum buffered samples before a flick is evaluated
pub const MIN_BUFFERED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlickSample {
    pub t_ms: f64,
    pub y: f64,
}

/// Time-bounded sample history for one tracked point
#[derive(Debug, Clone, Default)]
pub struct FlickBuffer {
    samples: VecDeque<FlickSample>,
}

impl FlickBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, then prune to `horizon_ms` and `capacity`
    pub fn push(&mut self, t_ms: f64, y: f64, horizon_ms: f64, capacity: usize) {
        self.samples.push_back(FlickSample { t_ms, y });

        while let Some(oldest) = self.samples.front() {
            if t_ms - oldest.t_ms > horizon_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
    }

    /// Oldest and newest samples within `window_ms` of `now_ms`, with the count
    pub fn window_bounds(&self, now_ms: f64, window_ms: f64) -> Option<(FlickSample, FlickSample, usize)> {
        let mut in_window = self.samples.iter().filter(|s| now_ms - s.t_ms <= window_ms);
        let oldest = *in_window.next()?;
        let (newest, count) = in_window.fold((oldest, 1), |(_, n), s| (*s, n + 1));
        Some((oldest, newest, count))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Flick detector for a single tracked point
#[derive(Debug, Clone)]
pub struct FlickClassifier {
    buffer: FlickBuffer,
    cooldown_until_ms: f64,
}

impl FlickClassifier {
    pub fn new() -> Self {
        FlickClassifier {
            buffer: FlickBuffer::new(),
            cooldown_until_ms: f64::NEG_INFINITY,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cooldown_until_ms = f64::NEG_INFINITY;
    }

    /// Feed the tracked point's raw Y for one validated frame
    pub fn update(
        &mut self,
        y: f64,
        now_ms: f64,
        config: &GestureConfig,
        diagnostics: &mut Vec<DebugRecord>,
    ) -> Option<Firing> {
        self.buffer
            .push(now_ms, y, config.flick_buffer_ms, config.flick_buffer_capacity);

        if now_ms < self.cooldown_until_ms || self.buffer.len() < MIN_BUFFERED {
            return None;
        }

        let (oldest, newest, count) = self.buffer.window_bounds(now_ms, config.flick_window_ms)?;
        if count < 2 {
            return None;
        }

        let delta_t = (newest.t_ms - oldest.t_ms) / 1000.0;
        if delta_t <= 0.0 {
            return None;
        }
        let delta_y = newest.y - oldest.y;
        // Positive is downward in image space
        let speed = delta_y / delta_t;

        let metadata = to_metadata(json!({
            "speed": round3(speed),
            "deltaY": round3(delta_y),
            "deltaT": round3(delta_t),
            "samples": count,
        }));
        diagnostics.push(DebugRecord::new("flick.eval", now_ms, metadata.clone()));

        let big_enough = delta_y.abs() >= config.flick_min_delta;
        let kind = if big_enough && delta_y < 0.0 && speed <= -config.flick_min_speed {
            GestureKind::FlickUp
        } else if big_enough && delta_y > 0.0 && speed >= config.flick_min_speed {
            GestureKind::FlickDown
        } else {
            return None;
        };

        let cooldown_until = now_ms + config.flick_cooldown_ms;
        self.cooldown_until_ms = cooldown_until;
        Some(Firing::new(kind, now_ms, cooldown_until, metadata))
    }
}

impl Default for FlickClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(flick: &mut FlickClassifier, samples: &[(f64, f64)]) -> Vec<Firing> {
        let config = GestureConfig::default();
        let mut diagnostics = Vec::new();
        samples
            .iter()
            .filter_map(|(t, y)| flick.update(*y, *t, &config, &mut diagnostics))
            .collect()
    }

    #[test]
    fn test_buffer_prunes_by_horizon_and_capacity() {
        let mut buffer = FlickBuffer::new();
        for i in 0..10 {
            buffer.push(i as f64 * 50.0, 0.5, 250.0, 15);
        }
        // Samples at 200..=450 remain
        assert_eq!(buffer.len(), 6);

        let mut dense = FlickBuffer::new();
        for i in 0..30 {
            dense.push(i as f64, 0.5, 250.0, 15);
        }
        assert_eq!(dense.len(), 15);
    }

    #[test]
    fn test_slow_motion_does_not_fire() {
        let mut flick = FlickClassifier::new();
        // +0.10 over 150 ms: 0.67/s, under the 1.2/s minimum
        let fired = feed(&mut flick, &[(0.0, 0.50), (50.0, 0.533), (100.0, 0.567), (150.0, 0.60)]);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_fast_downward_fires_flick_down() {
        let mut flick = FlickClassifier::new();
        // +0.10 over 60 ms: 1.67/s
        let fired = feed(&mut flick, &[(0.0, 0.50), (30.0, 0.55), (60.0, 0.60)]);

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, GestureKind::FlickDown);
        assert_eq!(fired[0].cooldown_until_ms, 560.0);
    }

    #[test]
    fn test_fast_upward_fires_flick_up() {
        let mut flick = FlickClassifier::new();
        let fired = feed(&mut flick, &[(0.0, 0.60), (30.0, 0.55), (60.0, 0.50)]);

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, GestureKind::FlickUp);
    }

    #[test]
    fn test_small_delta_does_not_fire() {
        let mut flick = FlickClassifier::new();
        // Fast but only 0.05 of travel
        let fired = feed(&mut flick, &[(0.0, 0.50), (10.0, 0.525), (20.0, 0.55)]);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_cooldown_blocks_repeat() {
        let mut flick = FlickClassifier::new();
        let fired = feed(
            &mut flick,
            &[
                (0.0, 0.50),
                (30.0, 0.55),
                (60.0, 0.60),
                (90.0, 0.70),
                (120.0, 0.80),
            ],
        );
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_needs_three_buffered_samples() {
        let mut flick = FlickClassifier::new();
        let fired = feed(&mut flick, &[(0.0, 0.40), (30.0, 0.60)]);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_smallest_valid_capacity_still_fires() {
        let config = GestureConfig {
            flick_buffer_capacity: MIN_BUFFERED,
            ..GestureConfig::default()
        };
        assert!(config.validate().is_ok());

        let mut flick = FlickClassifier::new();
        let mut diagnostics = Vec::new();
        let fired: Vec<Firing> = [(0.0, 0.50), (30.0, 0.57), (60.0, 0.64), (90.0, 0.70)]
            .iter()
            .filter_map(|(t, y)| flick.update(*y, *t, &config, &mut diagnostics))
            .collect();

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, GestureKind::FlickDown);
    }
}
