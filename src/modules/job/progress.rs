use std::time::Duration;

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const SIMULATED_STEP: f64 = 0.1;
pub const SIMULATED_CEILING: f64 = 99.0;

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// The displayed progress of one job.
///
/// A timer-driven ramp keeps the bar moving until the encoder reports real
/// progress; from the first real report on, ticks are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    percent: f64,
    real_seen: bool,
}

impl ProgressTracker {
    /// Advances the simulated ramp. Returns whether the value changed.
    pub fn tick(&mut self) -> bool {
        if self.real_seen || self.percent >= SIMULATED_CEILING {
            return false;
        }
        self.percent = (self.percent + SIMULATED_STEP).min(SIMULATED_CEILING);
        true
    }

    pub fn report(&mut self, ratio: f64) {
        self.real_seen = true;
        self.percent = clamp_percent(ratio * 100.0);
    }

    pub fn complete(&mut self) {
        self.real_seen = true;
        self.percent = 100.0;
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn is_finished(&self) -> bool {
        self.percent >= 100.0
    }

    pub fn has_real_progress(&self) -> bool {
        self.real_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_clamped_to_percent_range() {
        let mut progress = ProgressTracker::default();
        progress.report(1.3);
        assert_eq!(progress.percent(), 100.0);
        progress.report(-0.2);
        assert_eq!(progress.percent(), 0.0);
        progress.report(f64::NAN);
        assert_eq!(progress.percent(), 0.0);
    }

    #[test]
    fn repeated_ratios_are_accepted() {
        let mut progress = ProgressTracker::default();
        progress.report(0.4);
        progress.report(0.4);
        assert!((progress.percent() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn simulated_ramp_stops_below_one_hundred() {
        let mut progress = ProgressTracker::default();
        for _ in 0..2000 {
            progress.tick();
        }
        assert_eq!(progress.percent(), SIMULATED_CEILING);
        assert!(!progress.tick());
        assert!(!progress.is_finished());
    }

    #[test]
    fn real_progress_overrides_and_pauses_the_ramp() {
        let mut progress = ProgressTracker::default();
        for _ in 0..50 {
            progress.tick();
        }
        assert!(progress.percent() > 4.9);

        progress.report(0.02);
        assert!((progress.percent() - 2.0).abs() < 1e-9);
        assert!(!progress.tick());
        assert!((progress.percent() - 2.0).abs() < 1e-9);
        assert!(progress.has_real_progress());
    }

    #[test]
    fn completion_finishes_the_bar() {
        let mut progress = ProgressTracker::default();
        progress.complete();
        assert!(progress.is_finished());
        assert!(!progress.tick());
    }
}
