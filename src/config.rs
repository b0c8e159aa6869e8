use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub vad: VadConfig,
    pub rate: RateConfig,
    pub alert: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of frames delivered per audio buffer.
    pub frames_per_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub rms_threshold: f32,
    pub peak_threshold: f32,
    /// Number of recent RMS readings averaged before classification.
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub update_period_secs: f32,
    pub smoothing_factor: f32,
    pub min_wpm: u32,
    pub max_wpm: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    /// Ring the terminal bell once per pulse.
    Bell,
    /// Only log pulses.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub upper_wpm: u32,
    pub lower_wpm: u32,
    pub cooldown_secs: f32,
    pub pulse_count: u32,
    pub pulse_interval_secs: f32,
    pub actuator: ActuatorKind,
}

// --- Default implementations ---

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_per_buffer: 1024,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 0.05,
            peak_threshold: 0.08,
            history_len: 8,
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            update_period_secs: 1.0,
            smoothing_factor: 0.5,
            min_wpm: 60,
            max_wpm: 300,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            upper_wpm: 130,
            lower_wpm: 100,
            cooldown_secs: 2.0,
            pulse_count: 10,
            pulse_interval_secs: 0.3,
            actuator: ActuatorKind::Bell,
        }
    }
}

impl RateConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_secs_f32(self.update_period_secs)
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.cooldown_secs)
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_secs_f32(self.pulse_interval_secs)
    }
}

/// Upper bound for every duration field, in seconds.
const MAX_DURATION_SECS: f32 = 3600.0;

fn check_secs(field: &'static str, value: f32, allow_zero: bool) -> Result<(), ConfigError> {
    if allow_zero {
        if !(0.0..=MAX_DURATION_SECS).contains(&value) {
            return Err(ConfigError::invalid(field, "must be between 0 and 3600 seconds"));
        }
    } else if !(value > 0.0 && value <= MAX_DURATION_SECS) {
        return Err(ConfigError::invalid(field, "must be above 0 and at most 3600 seconds"));
    }
    Ok(())
}

// --- Config loading ---

impl Config {
    /// Load config and return the resolved file path (if any).
    pub fn load_with_path(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // 1. Check explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config = Self::parse(&content)?;
            return Ok((config, Some(p.to_path_buf())));
        }

        // 2. Check beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            let beside_exe = exe_path.parent().map(|p| p.join("paceguard.toml"));
            if let Some(p) = beside_exe {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config = Self::parse(&content)?;
                    return Ok((config, Some(p)));
                }
            }
        }

        // 3. Check platform config directory (e.g. ~/.config/paceguard/config.toml)
        if let Some(p) = Self::platform_path() {
            if p.exists() {
                let content = std::fs::read_to_string(&p)?;
                let config = Self::parse(&content)?;
                return Ok((config, Some(p)));
            }
        }

        // 4. Fall back to defaults
        tracing::info!("No config file found, using defaults");
        Ok((Config::default(), None))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_path(path).map(|(config, _)| config)
    }

    /// Platform config location used when no explicit path is given.
    pub fn platform_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("paceguard").join("config.toml"))
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the estimator and alert controller cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.frames_per_buffer == 0 {
            return Err(ConfigError::invalid("capture.frames_per_buffer", "must be at least 1"));
        }
        if self.vad.history_len == 0 {
            return Err(ConfigError::invalid("vad.history_len", "must be at least 1"));
        }
        if !(self.vad.rms_threshold >= 0.0) || !(self.vad.peak_threshold >= 0.0) {
            return Err(ConfigError::invalid(
                "vad",
                "rms_threshold and peak_threshold must be non-negative",
            ));
        }
        check_secs("rate.update_period_secs", self.rate.update_period_secs, false)?;
        if !(0.0..=1.0).contains(&self.rate.smoothing_factor) {
            return Err(ConfigError::invalid(
                "rate.smoothing_factor",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.rate.min_wpm >= self.rate.max_wpm {
            return Err(ConfigError::invalid(
                "rate.min_wpm",
                "must be lower than rate.max_wpm",
            ));
        }
        if self.alert.lower_wpm >= self.alert.upper_wpm {
            return Err(ConfigError::invalid(
                "alert.lower_wpm",
                "must be lower than alert.upper_wpm",
            ));
        }
        check_secs("alert.cooldown_secs", self.alert.cooldown_secs, true)?;
        check_secs("alert.pulse_interval_secs", self.alert.pulse_interval_secs, true)?;
        Ok(())
    }

    /// Generate a default config file with all fields and inline documentation.
    pub fn generate_default_commented() -> String {
        r#"# paceguard configuration
# Restart paceguard after saving changes for them to take effect.

[capture]
# Frames per audio buffer handed to the voice activity detector.
# At 16 kHz, 1024 frames is roughly 64 ms of audio.
frames_per_buffer = 1024

[vad]
# Average RMS energy (0.0 to 1.0) the recent history must exceed to count as speech.
rms_threshold = 0.05
# Peak absolute amplitude (0.0 to 1.0) a buffer must exceed to count as speech.
peak_threshold = 0.08
# Number of recent RMS readings averaged together.
history_len = 8

[rate]
# Seconds of audio per rate computation.
update_period_secs = 1.0
# Weight of each new estimate (0.0 = frozen, 1.0 = no smoothing).
smoothing_factor = 0.5
# Rate reported for a window with no speech.
min_wpm = 60
# Rate reported for a window that is all speech.
max_wpm = 300

[alert]
# Rates above this fire the tactile alert.
upper_wpm = 130
# Rates below this show a "speed up" hint (no tactile alert).
lower_wpm = 100
# Minimum seconds between two tactile alerts.
cooldown_secs = 2.0
# Number of pulses per alert and the spacing between them.
pulse_count = 10
pulse_interval_secs = 0.3
# Tactile output: "bell" (terminal bell) or "log" (log line only).
actuator = "bell"
"#
        .to_string()
    }
}
