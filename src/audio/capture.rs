// Audio capture contract and the WAV-file source used by the CLI.
//
// A `CaptureSource` opens a `CaptureDevice`; the device hands out fixed-size
// mono `AudioBuffer`s until the stream ends or fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};

/// One capture interval of mono `f32` samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Wall-clock span covered by this buffer. Zero for a zero sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frame_count() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// An open capture stream.
pub trait CaptureDevice: Send {
    /// Block until the next buffer is available.
    ///
    /// Returns `Ok(None)` when the stream has ended and `Err` when the device failed.
    fn read_buffer(&mut self) -> Result<Option<AudioBuffer>>;
}

/// Something that can open a capture stream.
pub trait CaptureSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>>;

    /// Human-readable name for logs.
    fn describe(&self) -> String {
        "capture source".to_string()
    }
}

/// Replays a WAV file as a stream of fixed-size buffers, downmixed to mono.
pub struct WavFileSource {
    path: PathBuf,
    frames_per_buffer: usize,
    realtime: bool,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>, frames_per_buffer: usize, realtime: bool) -> Self {
        Self {
            path: path.into(),
            frames_per_buffer: frames_per_buffer.max(1),
            realtime,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file without pacing, for offline analysis.
    pub fn open_file(&self) -> Result<WavFileDevice> {
        let reader = WavReader::open(&self.path)
            .with_context(|| format!("Failed to open WAV file {}", self.path.display()))?;
        let spec = reader.spec();
        if spec.channels == 0 {
            anyhow::bail!("{} declares zero channels", self.path.display());
        }
        let samples = read_mono_samples(reader)
            .with_context(|| format!("Failed to decode {}", self.path.display()))?;
        tracing::debug!(
            "Opened {} ({} Hz, {} channel(s), {} frames)",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );
        Ok(WavFileDevice {
            samples,
            position: 0,
            sample_rate: spec.sample_rate,
            frames_per_buffer: self.frames_per_buffer,
            realtime: false,
        })
    }
}

impl CaptureSource for WavFileSource {
    fn open(&self) -> Result<Box<dyn CaptureDevice>> {
        let mut device = self.open_file()?;
        device.realtime = self.realtime;
        Ok(Box::new(device))
    }

    fn describe(&self) -> String {
        format!("WAV file {}", self.path.display())
    }
}

/// A decoded WAV file being handed out buffer by buffer.
pub struct WavFileDevice {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
    frames_per_buffer: usize,
    realtime: bool,
}

impl WavFileDevice {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl CaptureDevice for WavFileDevice {
    fn read_buffer(&mut self) -> Result<Option<AudioBuffer>> {
        // Only full buffers are delivered; a trailing partial buffer is dropped.
        let end = self.position + self.frames_per_buffer;
        if end > self.samples.len() {
            return Ok(None);
        }
        let buffer = AudioBuffer::new(self.samples[self.position..end].to_vec(), self.sample_rate);
        self.position = end;
        if self.realtime {
            std::thread::sleep(buffer.duration());
        }
        Ok(Some(buffer))
    }
}

impl Iterator for WavFileDevice {
    type Item = AudioBuffer;

    fn next(&mut self) -> Option<AudioBuffer> {
        self.read_buffer().ok().flatten()
    }
}

/// Decode every frame and average interleaved channels into one mono stream.
fn read_mono_samples<R: std::io::Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, frames: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 1600], 16000);
        assert_eq!(buffer.frame_count(), 1600);
        assert_eq!(buffer.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_buffer_duration_zero_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 10], 0);
        assert_eq!(buffer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_wav_source_yields_full_buffers_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("clip.wav");
        write_wav(&path, 1, &vec![1000i16; 2500]);

        let source = WavFileSource::new(&path, 1000, false);
        let mut device = source.open().unwrap();
        assert_eq!(device.read_buffer().unwrap().unwrap().frame_count(), 1000);
        assert_eq!(device.read_buffer().unwrap().unwrap().frame_count(), 1000);
        // 500 trailing frames are not a full buffer.
        assert!(device.read_buffer().unwrap().is_none());
    }

    #[test]
    fn test_wav_source_normalizes_and_downmixes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("stereo.wav");
        // Left channel at half scale, right channel silent.
        let frames: Vec<i16> = (0..8).flat_map(|_| [16384i16, 0]).collect();
        write_wav(&path, 2, &frames);

        let mut device = WavFileSource::new(&path, 8, false).open_file().unwrap();
        assert_eq!(device.sample_rate(), 16000);
        let buffer = device.read_buffer().unwrap().unwrap();
        assert_eq!(buffer.frame_count(), 8);
        for s in buffer.samples {
            assert!((s - 0.25).abs() < 1e-4, "unexpected sample {s}");
        }
    }

    #[test]
    fn test_wav_source_missing_file_errors() {
        let source = WavFileSource::new("/nonexistent/clip.wav", 1024, false);
        assert!(source.open().is_err());
    }
}
