// Monitoring session: owns the per-session engine (VAD, rate estimator, alert
// controller, pulse sequencer), the capture and scheduler threads, and the
// lifecycle state machine.
//
//   Idle -> Starting -> Monitoring -> Idle
//   Starting -> PermissionDenied
//   Monitoring -> AudioError
//
// Lock order is control -> engine -> publisher. Workers only ever take the
// engine lock on their steady-state path, and check their shutdown flag while
// holding it; teardown sets that flag under the same lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Result;

use crate::alert::AlertController;
use crate::audio::capture::{AudioBuffer, CaptureDevice, CaptureSource};
use crate::audio::pipeline::{run_capture_pipeline, PipelineExit};
use crate::audio::vad::{EnergyVad, VadProcessor};
use crate::auth::Authorizer;
use crate::config::Config;
use crate::error::MonitorError;
use crate::haptics::{PulseSequencer, TactileOutput};
use crate::rate::RateEstimator;
use crate::status::{
    monitoring_message, rate_message, PublishedState, SessionStatus, StatePublisher,
    AUDIO_ERROR_MESSAGE, DENIED_MESSAGE,
};

/// External collaborators a session talks to.
pub struct SessionDeps {
    pub authorizer: Arc<dyn Authorizer>,
    pub source: Arc<dyn CaptureSource>,
    pub tactile: Arc<dyn TactileOutput>,
    /// Receives every published snapshot, in order.
    pub observer: Option<Sender<PublishedState>>,
}

/// Per-session algorithm state. Reset on every start and stop.
struct Engine {
    vad: EnergyVad,
    estimator: RateEstimator,
    alerts: AlertController,
    pulses: PulseSequencer,
    started_at: Option<Instant>,
}

impl Engine {
    fn reset(&mut self) {
        self.vad.reset();
        self.estimator.reset();
        self.alerts.reset();
        self.pulses.cancel();
        self.started_at = None;
    }

    fn elapsed_secs(&self) -> u64 {
        self.started_at.map_or(0, |t| t.elapsed().as_secs())
    }
}

struct Workers {
    shutdown: Arc<AtomicBool>,
    ticker: Sender<()>,
    capture: Option<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
}

impl Workers {
    /// Stop the scheduler and wait for both threads. A worker calling this on
    /// its own teardown path skips joining itself.
    fn join(mut self) {
        let _ = self.ticker.send(());
        let current = std::thread::current().id();
        for handle in [self.scheduler.take(), self.capture.take()].into_iter().flatten() {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!("{} thread panicked", name);
            }
        }
    }
}

struct Control {
    status: SessionStatus,
    /// Bumped on every start and stop; stale callbacks and workers compare against it.
    generation: u64,
    workers: Option<Workers>,
}

struct Shared {
    config: Config,
    authorizer: Arc<dyn Authorizer>,
    source: Arc<dyn CaptureSource>,
    publisher: StatePublisher,
    control: Mutex<Control>,
    engine: Mutex<Engine>,
}

/// A monitoring session. Dropping it stops monitoring.
pub struct MonitoringSession {
    shared: Arc<Shared>,
}

impl MonitoringSession {
    pub fn new(config: Config, deps: SessionDeps) -> Self {
        let engine = Engine {
            vad: EnergyVad::new(&config.vad),
            estimator: RateEstimator::new(&config.rate),
            alerts: AlertController::new(&config.alert),
            pulses: PulseSequencer::new(deps.tactile, &config.alert),
            started_at: None,
        };
        let shared = Shared {
            config,
            authorizer: deps.authorizer,
            source: deps.source,
            publisher: StatePublisher::new(deps.observer),
            control: Mutex::new(Control {
                status: SessionStatus::Idle,
                generation: 0,
                workers: None,
            }),
            engine: Mutex::new(engine),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Request capture access and, once granted, begin monitoring.
    ///
    /// No-op while already starting or monitoring.
    pub fn start(&self) {
        let generation = {
            let mut control = self.shared.lock_control();
            if !control.status.is_resting() {
                tracing::debug!("start() ignored while {}", control.status);
                return;
            }
            control.generation += 1;
            control.status = SessionStatus::Starting;
            self.shared.publisher.publish(PublishedState::starting());
            control.generation
        };

        tracing::info!("Requesting capture access for {}", self.shared.source.describe());
        let shared = self.shared.clone();
        self.shared
            .authorizer
            .request_access(Box::new(move |granted| {
                shared.on_authorization(generation, granted);
            }));
    }

    /// Halt monitoring and clear all per-session state. No-op when idle.
    ///
    /// When this returns no further buffer, tick, or pulse is processed.
    pub fn stop(&self) {
        let workers = {
            let mut control = self.shared.lock_control();
            match control.status {
                SessionStatus::Idle => return,
                SessionStatus::Monitoring => {}
                SessionStatus::Starting
                | SessionStatus::PermissionDenied
                | SessionStatus::AudioError => {
                    control.generation += 1;
                    control.status = SessionStatus::Idle;
                    self.shared.publisher.publish(PublishedState::ready());
                    return;
                }
            }
            control.generation += 1;
            control.status = SessionStatus::Idle;
            let workers = control.workers.take();
            self.shared.quiesce(workers.as_ref(), PublishedState::ready());
            workers
        };

        if let Some(workers) = workers {
            workers.join();
        }
        tracing::info!("Monitoring stopped");
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock_control().status
    }

    pub fn is_monitoring(&self) -> bool {
        self.status() == SessionStatus::Monitoring
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PublishedState {
        self.shared.publisher.latest()
    }
}

impl Drop for MonitoringSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_authorization(self: &Arc<Self>, generation: u64, granted: bool) {
        let mut control = self.lock_control();
        if control.generation != generation || control.status != SessionStatus::Starting {
            tracing::debug!("Ignoring stale authorization result (granted = {})", granted);
            return;
        }

        if !granted {
            tracing::warn!("{}", MonitorError::PermissionDenied);
            control.status = SessionStatus::PermissionDenied;
            self.publisher
                .publish(PublishedState::resting(SessionStatus::PermissionDenied, DENIED_MESSAGE));
            return;
        }

        {
            let mut engine = self.lock_engine();
            engine.reset();
            engine.started_at = Some(Instant::now());
        }

        match self.launch(generation) {
            Ok(workers) => {
                control.status = SessionStatus::Monitoring;
                control.workers = Some(workers);
                self.publisher
                    .publish(PublishedState::monitoring(0, monitoring_message(0), 0));
                tracing::info!("Monitoring started");
            }
            Err(e) => {
                tracing::error!("{}", MonitorError::CaptureDeviceFailure(e));
                control.status = SessionStatus::AudioError;
                self.quiesce(
                    None,
                    PublishedState::resting(SessionStatus::AudioError, AUDIO_ERROR_MESSAGE),
                );
            }
        }
    }

    /// Open the capture device and spawn the capture and scheduler threads.
    fn launch(self: &Arc<Self>, generation: u64) -> Result<Workers> {
        let device = self.source.open()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ticker, ticks_cancelled) = mpsc::channel::<()>();

        let capture = {
            let shared = self.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("capture".into())
                .spawn(move || shared.run_capture(device, generation, &shutdown))?
        };

        let scheduler = {
            let shared = self.clone();
            let shutdown_flag = shutdown.clone();
            let period = self.config.rate.update_period();
            let spawned = std::thread::Builder::new()
                .name("rate-scheduler".into())
                .spawn(move || loop {
                    match ticks_cancelled.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if !shared.tick(&shutdown_flag) {
                        break;
                    }
                });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // The capture thread exits on its next read; it cannot be
                    // joined here because it may be waiting on the control lock.
                    shutdown.store(true, Ordering::SeqCst);
                    drop(capture);
                    return Err(e.into());
                }
            }
        };

        Ok(Workers {
            shutdown,
            ticker,
            capture: Some(capture),
            scheduler: Some(scheduler),
        })
    }

    fn run_capture(
        self: &Arc<Self>,
        mut device: Box<dyn CaptureDevice>,
        generation: u64,
        shutdown: &AtomicBool,
    ) {
        let name = self.source.describe();
        let exit = run_capture_pipeline(
            &name,
            device.as_mut(),
            |buffer| self.ingest(buffer, shutdown),
            shutdown,
        );
        // Close the device before any teardown is reported.
        drop(device);

        match exit {
            PipelineExit::Shutdown => {}
            PipelineExit::StreamEnded => {
                self.finish(generation, SessionStatus::Idle, PublishedState::ready());
            }
            PipelineExit::DeviceFailed(e) => {
                tracing::error!("{}", MonitorError::CaptureDeviceFailure(e));
                self.finish(
                    generation,
                    SessionStatus::AudioError,
                    PublishedState::resting(SessionStatus::AudioError, AUDIO_ERROR_MESSAGE),
                );
            }
        }
    }

    /// Per-buffer step on the capture thread.
    fn ingest(&self, buffer: &AudioBuffer, shutdown: &AtomicBool) -> bool {
        let mut guard = self.lock_engine();
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let engine = &mut *guard;
        let classification = engine.vad.classify(buffer);
        engine
            .estimator
            .on_buffer(classification.is_voice, classification.duration);
        true
    }

    /// Per-period step on the scheduler thread.
    fn tick(&self, shutdown: &AtomicBool) -> bool {
        let mut guard = self.lock_engine();
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let engine = &mut *guard;
        let elapsed = engine.elapsed_secs();

        match engine.estimator.compute_if_due() {
            Some(rate) => {
                let decision = engine.alerts.evaluate(rate, true, Instant::now());
                if decision.fire {
                    engine.pulses.fire();
                }
                self.publisher.publish(PublishedState::monitoring(
                    rate,
                    rate_message(decision.label, rate, elapsed),
                    elapsed,
                ));
            }
            None if engine.estimator.current_rate() == 0 => {
                self.publisher
                    .publish(PublishedState::monitoring(0, monitoring_message(elapsed), elapsed));
            }
            None => {
                tracing::trace!("Rate window still accumulating");
            }
        }
        true
    }

    /// Worker-initiated teardown (end of stream or device failure).
    fn finish(&self, generation: u64, status: SessionStatus, published: PublishedState) {
        let workers = {
            let mut control = self.lock_control();
            if control.generation != generation || control.status != SessionStatus::Monitoring {
                return;
            }
            control.generation += 1;
            control.status = status;
            let workers = control.workers.take();
            self.quiesce(workers.as_ref(), published);
            workers
        };
        if let Some(workers) = workers {
            workers.join();
        }
        tracing::info!("Monitoring ended: {}", status);
    }

    /// Cancel workers, clear engine state, and publish the resting snapshot,
    /// all under the engine lock so no worker step can interleave.
    fn quiesce(&self, workers: Option<&Workers>, published: PublishedState) {
        let mut engine = self.lock_engine();
        if let Some(workers) = workers {
            workers.shutdown.store(true, Ordering::SeqCst);
        }
        engine.reset();
        self.publisher.publish(published);
    }
}
