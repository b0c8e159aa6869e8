// Energy-based voice activity detection.
//
// A buffer counts as speech when the mean RMS over the recent history is above
// `rms_threshold` and the buffer's own peak is above `peak_threshold`.

use std::time::Duration;

use crate::audio::capture::AudioBuffer;
use crate::audio::ring_buffer::RmsHistory;
use crate::config::VadConfig;

/// Trait for voice activity detection, so the pipeline can be driven by test doubles.
pub trait VadProcessor: Send {
    /// Classify one buffer and report how much time it covers.
    fn classify(&mut self, buffer: &AudioBuffer) -> Classification;

    /// Forget all history ahead of a new session.
    fn reset(&mut self);
}

/// Energy features of a single buffer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyReading {
    pub rms: f32,
    pub peak: f32,
}

impl EnergyReading {
    /// RMS and peak absolute amplitude. An empty buffer reads as silence.
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        Self {
            rms: (sum_squares / samples.len() as f32).sqrt(),
            peak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub is_voice: bool,
    pub duration: Duration,
    pub reading: EnergyReading,
    /// Mean RMS over the history after this buffer was added.
    pub avg_rms: f32,
}

pub struct EnergyVad {
    rms_threshold: f32,
    peak_threshold: f32,
    history: RmsHistory,
    silent_buffers: u32,
}

impl EnergyVad {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            rms_threshold: config.rms_threshold,
            peak_threshold: config.peak_threshold,
            history: RmsHistory::new(config.history_len),
            silent_buffers: 0,
        }
    }

    /// Consecutive non-voice buffers since the last voice buffer.
    ///
    /// Diagnostic only; classification never depends on it.
    pub fn silent_buffers(&self) -> u32 {
        self.silent_buffers
    }

    pub fn history(&self) -> &RmsHistory {
        &self.history
    }
}

impl VadProcessor for EnergyVad {
    fn classify(&mut self, buffer: &AudioBuffer) -> Classification {
        let reading = EnergyReading::measure(&buffer.samples);
        self.history.push(reading.rms);
        let avg_rms = self.history.mean();

        let is_voice = avg_rms > self.rms_threshold && reading.peak > self.peak_threshold;
        if is_voice {
            self.silent_buffers = 0;
        } else {
            self.silent_buffers = self.silent_buffers.saturating_add(1);
        }

        tracing::trace!(
            rms = reading.rms,
            peak = reading.peak,
            avg_rms,
            is_voice,
            silent_buffers = self.silent_buffers,
            "vad"
        );

        Classification {
            is_voice,
            duration: buffer.duration(),
            reading,
            avg_rms,
        }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.silent_buffers = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(rms_level: f32, peak: f32, len: usize) -> AudioBuffer {
        // A constant level plus one peak sample; RMS is dominated by the level for large `len`.
        let mut samples = vec![rms_level; len];
        samples[0] = peak;
        AudioBuffer::new(samples, 16000)
    }

    #[test]
    fn test_measure_constant_signal() {
        let reading = EnergyReading::measure(&[0.5, -0.5, 0.5, -0.5]);
        assert!((reading.rms - 0.5).abs() < 1e-6);
        assert!((reading.peak - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_measure_empty_is_silence() {
        assert_eq!(EnergyReading::measure(&[]), EnergyReading::default());
    }

    #[test]
    fn test_loud_buffer_is_voice_on_empty_history() {
        let mut vad = EnergyVad::new(&VadConfig::default());
        // Every sample at 0.09 except a 0.1 peak: RMS ~0.09, peak 0.1.
        let buffer = buffer_with(0.09, 0.1, 1024);
        let result = vad.classify(&buffer);
        assert!(result.is_voice);
        assert!(result.reading.rms > 0.05);
        assert!((result.reading.peak - 0.1).abs() < 1e-6);
        assert_eq!(result.duration, Duration::from_secs_f64(1024.0 / 16000.0));
    }

    #[test]
    fn test_silence_is_not_voice() {
        let mut vad = EnergyVad::new(&VadConfig::default());
        let result = vad.classify(&AudioBuffer::new(vec![0.0; 512], 16000));
        assert!(!result.is_voice);
        assert_eq!(vad.silent_buffers(), 1);
    }

    #[test]
    fn test_steady_hum_without_peak_is_rejected() {
        let mut vad = EnergyVad::new(&VadConfig::default());
        // RMS 0.06 clears the energy test but the peak stays under 0.08.
        let result = vad.classify(&AudioBuffer::new(vec![0.06; 512], 16000));
        assert!(!result.is_voice);
    }

    #[test]
    fn test_brief_pop_is_averaged_away() {
        let mut vad = EnergyVad::new(&VadConfig::default());
        for _ in 0..7 {
            vad.classify(&AudioBuffer::new(vec![0.0; 512], 16000));
        }
        // One loud buffer among seven silent ones: avg RMS ~0.0375.
        let result = vad.classify(&AudioBuffer::new(vec![0.3; 512], 16000));
        assert!(result.reading.peak > 0.08);
        assert!(!result.is_voice);
        assert_eq!(vad.history().len(), 8);
    }

    #[test]
    fn test_silent_counter_resets_on_voice() {
        let mut vad = EnergyVad::new(&VadConfig {
            history_len: 1,
            ..VadConfig::default()
        });
        vad.classify(&AudioBuffer::new(vec![0.0; 256], 16000));
        vad.classify(&AudioBuffer::new(vec![0.0; 256], 16000));
        assert_eq!(vad.silent_buffers(), 2);
        vad.classify(&AudioBuffer::new(vec![0.2; 256], 16000));
        assert_eq!(vad.silent_buffers(), 0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut vad = EnergyVad::new(&VadConfig::default());
        vad.classify(&AudioBuffer::new(vec![0.0; 256], 16000));
        vad.reset();
        assert!(vad.history().is_empty());
        assert_eq!(vad.silent_buffers(), 0);
    }
}
