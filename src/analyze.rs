// Offline analysis: runs the VAD, rate estimator, and alert controller over a
// whole recording, using audio time as the clock instead of a scheduler thread.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::alert::{AlertController, StatusLabel};
use crate::audio::capture::{AudioBuffer, WavFileSource};
use crate::audio::vad::{EnergyVad, VadProcessor};
use crate::config::Config;
use crate::rate::RateEstimator;

/// One closed rate window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisPoint {
    /// Audio time at which the window closed.
    pub at_secs: f64,
    pub rate: u32,
    pub label: StatusLabel,
    pub alert: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub points: Vec<AnalysisPoint>,
    pub alerts: usize,
    pub speech_secs: f64,
    pub total_secs: f64,
}

impl AnalysisReport {
    pub fn average_rate(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.rate as f64).sum::<f64>() / self.points.len() as f64)
    }
}

pub fn analyze_buffers(
    config: &Config,
    buffers: impl IntoIterator<Item = AudioBuffer>,
) -> AnalysisReport {
    let mut vad = EnergyVad::new(&config.vad);
    let mut estimator = RateEstimator::new(&config.rate);
    let mut alerts = AlertController::new(&config.alert);
    let origin = Instant::now();
    let mut audio_time = Duration::ZERO;
    let mut speech = Duration::ZERO;
    let mut report = AnalysisReport::default();

    for buffer in buffers {
        let classification = vad.classify(&buffer);
        estimator.on_buffer(classification.is_voice, classification.duration);
        audio_time += classification.duration;
        if classification.is_voice {
            speech += classification.duration;
        }

        if let Some(rate) = estimator.compute_if_due() {
            let decision = alerts.evaluate(rate, true, origin + audio_time);
            if decision.fire {
                report.alerts += 1;
            }
            report.points.push(AnalysisPoint {
                at_secs: audio_time.as_secs_f64(),
                rate,
                label: decision.label,
                alert: decision.fire,
            });
        }
    }

    report.speech_secs = speech.as_secs_f64();
    report.total_secs = audio_time.as_secs_f64();
    report
}

pub fn analyze_file(config: &Config, path: &Path) -> Result<AnalysisReport> {
    let device = WavFileSource::new(path, config.capture.frames_per_buffer, false).open_file()?;
    tracing::info!("Analyzing {} at {} Hz", path.display(), device.sample_rate());
    Ok(analyze_buffers(config, device))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count` buffers of 100 ms each at a constant level.
    fn buffers(level: f32, count: usize) -> Vec<AudioBuffer> {
        (0..count)
            .map(|_| AudioBuffer::new(vec![level; 1600], 16000))
            .collect()
    }

    #[test]
    fn test_silence_reports_min_rate_without_alerts() {
        let report = analyze_buffers(&Config::default(), buffers(0.0, 30));
        assert_eq!(report.points.len(), 3);
        assert!(report.points.iter().all(|p| p.rate == 60));
        assert!(report.points.iter().all(|p| p.label == StatusLabel::TooLow));
        assert_eq!(report.alerts, 0);
        assert_eq!(report.speech_secs, 0.0);
    }

    #[test]
    fn test_continuous_speech_alerts_with_cooldown() {
        // Five seconds of loud audio: windows close at 1..5 s, alerts at 1, 3, 5 s.
        let report = analyze_buffers(&Config::default(), buffers(0.3, 50));
        assert_eq!(report.points.len(), 5);
        assert!(report.points.iter().all(|p| p.label == StatusLabel::TooHigh));
        assert_eq!(report.alerts, 3);
        assert_eq!(report.average_rate(), Some(300.0));
    }

    #[test]
    fn test_mixed_speech_is_smoothed() {
        let mut input = Vec::new();
        // 0.6 s speech + 0.4 s silence, then 0.2 s speech + 0.8 s silence.
        input.extend(buffers(0.3, 6));
        input.extend(buffers(0.0, 4));
        input.extend(buffers(0.3, 2));
        input.extend(buffers(0.0, 8));

        let config = Config {
            vad: crate::config::VadConfig {
                history_len: 1,
                ..Default::default()
            },
            ..Config::default()
        };
        let report = analyze_buffers(&config, input);
        let rates: Vec<u32> = report.points.iter().map(|p| p.rate).collect();
        assert_eq!(rates, vec![204, 156]);
    }

    #[test]
    fn test_empty_input() {
        let report = analyze_buffers(&Config::default(), Vec::new());
        assert!(report.points.is_empty());
        assert_eq!(report.average_rate(), None);
    }
}
