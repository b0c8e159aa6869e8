use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::AlertConfig;

/// Classification of a smoothed rate against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    TooHigh,
    TooLow,
    Ok,
    /// Not monitoring, or no rate yet.
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDecision {
    pub label: StatusLabel,
    pub fire: bool,
}

/// Last firing time plus the cooldown that gates the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertState {
    pub last_fired: Option<Instant>,
    pub cooldown: Duration,
}

impl AlertState {
    pub fn cooling_down(&self, now: Instant) -> bool {
        self.last_fired
            .is_some_and(|t| now.saturating_duration_since(t) < self.cooldown)
    }
}

pub struct AlertController {
    upper: u32,
    lower: u32,
    state: AlertState,
}

impl AlertController {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            upper: config.upper_wpm,
            lower: config.lower_wpm,
            state: AlertState {
                last_fired: None,
                cooldown: config.cooldown(),
            },
        }
    }

    /// Classify `rate` and decide whether the tactile alert fires.
    ///
    /// Only the upper bound ever fires; the lower bound is advisory.
    pub fn evaluate(&mut self, rate: u32, monitoring: bool, now: Instant) -> AlertDecision {
        if rate > self.upper {
            let fire = !self.state.cooling_down(now);
            if fire {
                self.state.last_fired = Some(now);
                tracing::info!(rate, upper = self.upper, "Rate above threshold, alerting");
            } else {
                tracing::debug!(rate, "Rate above threshold, alert cooling down");
            }
            return AlertDecision {
                label: StatusLabel::TooHigh,
                fire,
            };
        }

        let label = if rate < self.lower && rate > 0 {
            StatusLabel::TooLow
        } else if monitoring {
            StatusLabel::Ok
        } else {
            StatusLabel::Inactive
        };
        AlertDecision { label, fire: false }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.last_fired = None;
    }
}
