// Speaking-rate estimation from speech density.
//
// Each window covers at least one update period of audio. The fraction of that
// window classified as speech is mapped linearly onto [min_wpm, max_wpm] and
// blended with the previous estimate by exponential smoothing.

use std::time::Duration;

use crate::config::RateConfig;

/// Speaking and total time since the last rate computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAccumulator {
    speaking: Duration,
    total: Duration,
}

impl WindowAccumulator {
    pub fn add(&mut self, is_voice: bool, duration: Duration) {
        self.total += duration;
        if is_voice {
            self.speaking += duration;
        }
    }

    pub fn speaking(&self) -> Duration {
        self.speaking
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Fraction of the window classified as speech, in [0, 1]. Zero for an empty window.
    pub fn density(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        self.speaking.as_secs_f64() / self.total.as_secs_f64()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    pub current: u32,
    pub previous: u32,
}

pub struct RateEstimator {
    period: Duration,
    smoothing_factor: f64,
    min_wpm: f64,
    max_wpm: f64,
    window: WindowAccumulator,
    state: RateState,
}

impl RateEstimator {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            period: config.update_period(),
            smoothing_factor: config.smoothing_factor.clamp(0.0, 1.0) as f64,
            min_wpm: config.min_wpm as f64,
            max_wpm: config.max_wpm as f64,
            window: WindowAccumulator::default(),
            state: RateState::default(),
        }
    }

    pub fn on_buffer(&mut self, is_voice: bool, duration: Duration) {
        self.window.add(is_voice, duration);
    }

    /// Produce a new smoothed rate once a full period has been accumulated.
    ///
    /// Returns `None` and leaves the window untouched while still accumulating.
    pub fn compute_if_due(&mut self) -> Option<u32> {
        if self.window.total() < self.period || self.window.total().is_zero() {
            return None;
        }

        let density = self.window.density();
        let instantaneous = self.instantaneous(density);
        let prior = self.state.current;
        let smoothed = if prior > 0 {
            prior as f64 * (1.0 - self.smoothing_factor) + instantaneous * self.smoothing_factor
        } else {
            instantaneous
        };
        let rate = smoothed.round().max(0.0) as u32;

        tracing::debug!(
            speaking_secs = self.window.speaking().as_secs_f64(),
            total_secs = self.window.total().as_secs_f64(),
            density,
            instantaneous,
            prior,
            rate,
            "rate window closed"
        );

        self.state = RateState {
            current: rate,
            previous: prior,
        };
        self.window.reset();
        Some(rate)
    }

    /// Linear map of speech density onto the configured WPM range.
    pub fn instantaneous(&self, density: f64) -> f64 {
        self.min_wpm + (self.max_wpm - self.min_wpm) * density
    }

    pub fn current_rate(&self) -> u32 {
        self.state.current
    }

    pub fn previous_rate(&self) -> u32 {
        self.state.previous
    }

    pub fn window(&self) -> &WindowAccumulator {
        &self.window
    }

    pub fn reset(&mut self) {
        self.window.reset();
        self.state = RateState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn estimator() -> RateEstimator {
        RateEstimator::new(&RateConfig::default())
    }

    #[test]
    fn test_still_accumulating_leaves_window_untouched() {
        let mut est = estimator();
        est.on_buffer(true, ms(300));
        est.on_buffer(false, ms(200));
        assert_eq!(est.compute_if_due(), None);
        assert_eq!(est.window().total(), ms(500));
        assert_eq!(est.window().speaking(), ms(300));
        assert_eq!(est.current_rate(), 0);
    }

    #[test]
    fn test_empty_window_is_not_due() {
        let mut est = estimator();
        assert_eq!(est.compute_if_due(), None);
    }

    #[test]
    fn test_cold_start_skips_smoothing() {
        let mut est = estimator();
        est.on_buffer(true, ms(600));
        est.on_buffer(false, ms(400));
        // 60 + 240 * 0.6 = 204
        assert_eq!(est.compute_if_due(), Some(204));
        assert_eq!(est.window().total(), Duration::ZERO);
    }

    #[test]
    fn test_smoothing_blends_with_prior() {
        let mut est = estimator();
        est.on_buffer(true, ms(600));
        est.on_buffer(false, ms(400));
        assert_eq!(est.compute_if_due(), Some(204));

        est.on_buffer(true, ms(200));
        est.on_buffer(false, ms(800));
        // instantaneous 108, 204 * 0.5 + 108 * 0.5 = 156
        assert_eq!(est.compute_if_due(), Some(156));
        assert_eq!(est.previous_rate(), 204);
        assert_eq!(est.current_rate(), 156);
    }

    #[test]
    fn test_windows_do_not_overlap() {
        let mut est = RateEstimator::new(&RateConfig {
            smoothing_factor: 1.0,
            ..RateConfig::default()
        });
        est.on_buffer(true, ms(1000));
        assert_eq!(est.compute_if_due(), Some(300));
        // Only the new window counts; all silence maps to min_wpm.
        est.on_buffer(false, ms(1000));
        assert_eq!(est.compute_if_due(), Some(60));
    }

    #[test]
    fn test_instantaneous_stays_in_range() {
        let mut est = estimator();
        for speaking_tenths in 0..=10 {
            est.reset();
            est.on_buffer(true, ms(speaking_tenths * 100));
            est.on_buffer(false, ms(1000 - speaking_tenths * 100));
            let rate = est.compute_if_due().unwrap();
            assert!((60..=300).contains(&rate), "rate {rate} out of range");
        }
    }

    #[test]
    fn test_smoothed_rate_is_between_prior_and_instantaneous() {
        for alpha in [0.0f32, 0.25, 0.5, 0.9, 1.0] {
            let mut est = RateEstimator::new(&RateConfig {
                smoothing_factor: alpha,
                ..RateConfig::default()
            });
            est.on_buffer(true, ms(900));
            est.on_buffer(false, ms(100));
            let prior = est.compute_if_due().unwrap();

            est.on_buffer(true, ms(100));
            est.on_buffer(false, ms(900));
            let instantaneous = est.instantaneous(0.1).round() as u32;
            let rate = est.compute_if_due().unwrap();
            assert!(
                instantaneous.min(prior) <= rate && rate <= instantaneous.max(prior),
                "alpha {alpha}: {rate} not between {prior} and {instantaneous}"
            );
        }
    }

    #[test]
    fn test_reset_returns_to_cold_start() {
        let mut est = estimator();
        est.on_buffer(true, ms(1000));
        est.compute_if_due();
        est.reset();
        assert_eq!(est.current_rate(), 0);
        est.on_buffer(true, ms(600));
        est.on_buffer(false, ms(400));
        assert_eq!(est.compute_if_due(), Some(204));
    }
}
