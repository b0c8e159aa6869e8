// Tactile output: the actuator contract, two console actuators, and the
// pulse-burst sequencer that plays one alert pattern on a timer thread.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{ActuatorKind, AlertConfig};

/// A device that can play one discrete tactile pulse. Fire-and-forget.
pub trait TactileOutput: Send + Sync {
    fn pulse(&self);
}

/// Rings the terminal bell on stderr for each pulse.
pub struct TerminalBell;

impl TactileOutput for TerminalBell {
    fn pulse(&self) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            tracing::warn!("Failed to ring terminal bell: {:?}", e);
        }
    }
}

/// Logs each pulse instead of actuating anything.
pub struct LogTactile;

impl TactileOutput for LogTactile {
    fn pulse(&self) {
        tracing::info!("Tactile pulse");
    }
}

pub fn actuator_for(kind: ActuatorKind) -> Arc<dyn TactileOutput> {
    match kind {
        ActuatorKind::Bell => Arc::new(TerminalBell),
        ActuatorKind::Log => Arc::new(LogTactile),
    }
}

struct Burst {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// Plays `count` pulses spaced `interval` apart on a dedicated thread.
///
/// At most one burst runs at a time; firing during a burst restarts the
/// pattern. `cancel` stops the running burst and waits for its thread, so no
/// pulse is played after it returns.
pub struct PulseSequencer {
    output: Arc<dyn TactileOutput>,
    count: u32,
    interval: Duration,
    burst: Option<Burst>,
}

impl PulseSequencer {
    pub fn new(output: Arc<dyn TactileOutput>, config: &AlertConfig) -> Self {
        Self {
            output,
            count: config.pulse_count,
            interval: config.pulse_interval(),
            burst: None,
        }
    }

    /// Start a burst, cutting short any burst still playing.
    pub fn fire(&mut self) {
        if self.is_playing() {
            tracing::debug!("Restarting pulse burst");
        }
        self.cancel();
        if self.count == 0 {
            return;
        }

        let (cancel, cancelled) = mpsc::channel::<()>();
        let output = self.output.clone();
        let count = self.count;
        let interval = self.interval;
        let spawned = std::thread::Builder::new()
            .name("pulse-burst".into())
            .spawn(move || {
                for i in 0..count {
                    if i > 0 {
                        match cancelled.recv_timeout(interval) {
                            Err(RecvTimeoutError::Timeout) => {}
                            // Explicit cancel or the sequencer went away.
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                        }
                    } else if cancelled.try_recv().is_ok() {
                        return;
                    }
                    output.pulse();
                }
            });

        match spawned {
            Ok(handle) => self.burst = Some(Burst { cancel, handle }),
            Err(e) => tracing::error!("Failed to spawn pulse burst thread: {:?}", e),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.burst
            .as_ref()
            .is_some_and(|burst| !burst.handle.is_finished())
    }

    /// Stop any running burst and wait for its thread to exit.
    pub fn cancel(&mut self) {
        if let Some(burst) = self.burst.take() {
            let _ = burst.cancel.send(());
            if burst.handle.join().is_err() {
                tracing::warn!("Pulse burst thread panicked");
            }
        }
    }

}

impl Drop for PulseSequencer {
    fn drop(&mut self) {
        self.cancel();
    }
}
