// Landmark smoothing
// Per-coordinate EMA shared by the tap and chop classifiers

/// Exponential moving average over one scalar coordinate
/// Seeds from the first raw value so there is no startup spike
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ema {
    value: Option<f64>,
}

impl Ema {
    pub fn new() -> Self {
        Ema { value: None }
    }

    /// Feed a raw sample and return the smoothed value
    pub fn update(&mut self, raw: f64, alpha: f64) -> f64 {
        let next = match self.value {
            None => raw,
            Some(prev) => alpha * raw + (1.0 - alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    /// Current smoothed value, if any sample has been seen
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_seeded(&self) -> bool {
        self.value.is_some()
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds() {
        let mut ema = Ema::new();
        assert_eq!(ema.update(0.7, 0.35), 0.7);
    }

    #[test]
    fn test_update_weights_newest() {
        let mut ema = Ema::new();
        ema.update(1.0, 0.35);
        let v = ema.update(0.0, 0.35);
        assert!((v - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_one_tracks_raw() {
        let mut ema = Ema::new();
        ema.update(0.2, 1.0);
        assert_eq!(ema.update(0.9, 1.0), 0.9);
    }

    #[test]
    fn test_reset_clears_seed() {
        let mut ema = Ema::new();
        ema.update(0.5, 0.35);
        ema.reset();
        assert!(!ema.is_seeded());
        assert_eq!(ema.update(0.1, 0.35), 0.1);
    }
}
