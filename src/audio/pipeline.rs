// Capture pipeline: pulls buffers from a capture device and hands each one to
// the session's per-buffer step (VAD + window accumulation).
//
// The blocking read happens outside any lock; `process` is expected to take
// the engine lock itself and return `false` once the session has been
// cancelled, so no buffer is processed after teardown begins.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::capture::{AudioBuffer, CaptureDevice};

/// Why the capture loop stopped.
#[derive(Debug)]
pub enum PipelineExit {
    /// The shutdown flag was set or `process` refused a buffer.
    Shutdown,
    /// The device reported the end of its stream.
    StreamEnded,
    /// Reading from the device failed.
    DeviceFailed(anyhow::Error),
}

/// Runs the capture loop on the calling thread until shutdown, end of stream, or failure.
pub fn run_capture_pipeline(
    source_name: &str,
    device: &mut dyn CaptureDevice,
    mut process: impl FnMut(&AudioBuffer) -> bool,
    shutdown: &AtomicBool,
) -> PipelineExit {
    let mut buffers: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let buffer = match device.read_buffer() {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                tracing::info!("{}: capture stream ended after {} buffers", source_name, buffers);
                return PipelineExit::StreamEnded;
            }
            Err(e) => {
                tracing::warn!("{}: capture read failed: {:?}", source_name, e);
                return PipelineExit::DeviceFailed(e);
            }
        };

        if !process(&buffer) {
            break;
        }
        buffers += 1;
    }

    tracing::debug!("{}: capture loop shut down after {} buffers", source_name, buffers);
    PipelineExit::Shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::VecDeque;

    /// Replays a fixed script of read results.
    struct ScriptedDevice {
        script: VecDeque<Result<Option<AudioBuffer>>>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read_buffer(&mut self) -> Result<Option<AudioBuffer>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn buffer() -> AudioBuffer {
        AudioBuffer::new(vec![0.1; 160], 16000)
    }

    #[test]
    fn test_pipeline_processes_until_stream_ends() {
        let mut device = ScriptedDevice {
            script: VecDeque::from(vec![Ok(Some(buffer())), Ok(Some(buffer())), Ok(None)]),
        };
        let shutdown = AtomicBool::new(false);
        let mut seen = 0;

        let exit = run_capture_pipeline(
            "test-mic",
            &mut device,
            |b| {
                assert_eq!(b.frame_count(), 160);
                seen += 1;
                true
            },
            &shutdown,
        );

        assert!(matches!(exit, PipelineExit::StreamEnded));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_pipeline_reports_device_failure() {
        let mut device = ScriptedDevice {
            script: VecDeque::from(vec![
                Ok(Some(buffer())),
                Err(anyhow::anyhow!("device unplugged")),
            ]),
        };
        let shutdown = AtomicBool::new(false);

        let exit = run_capture_pipeline("test-mic", &mut device, |_| true, &shutdown);

        match exit {
            PipelineExit::DeviceFailed(e) => assert!(e.to_string().contains("unplugged")),
            other => panic!("Expected DeviceFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_shutdown_flag() {
        let mut device = ScriptedDevice {
            script: VecDeque::from(vec![Ok(Some(buffer()))]),
        };
        let shutdown = AtomicBool::new(true); // already shut down

        let exit = run_capture_pipeline(
            "test-mic",
            &mut device,
            |_| panic!("process should not be called when shutdown is set"),
            &shutdown,
        );

        assert!(matches!(exit, PipelineExit::Shutdown));
        // Nothing was read from the device either.
        assert_eq!(device.script.len(), 1);
    }

    #[test]
    fn test_pipeline_stops_when_process_refuses() {
        let mut device = ScriptedDevice {
            script: VecDeque::from(vec![Ok(Some(buffer())), Ok(Some(buffer())), Ok(None)]),
        };
        let shutdown = AtomicBool::new(false);
        let mut seen = 0;

        let exit = run_capture_pipeline(
            "test-mic",
            &mut device,
            |_| {
                seen += 1;
                false
            },
            &shutdown,
        );

        assert!(matches!(exit, PipelineExit::Shutdown));
        assert_eq!(seen, 1);
    }
}
