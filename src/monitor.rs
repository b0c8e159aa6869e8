// Live monitoring orchestrator for the CLI: wires a WAV replay source, the
// file-access authorizer, and a tactile actuator into a session, then renders
// every published state until the stream ends or Ctrl+C is pressed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use paceguard::audio::capture::WavFileSource;
use paceguard::auth::FileAccessAuthorizer;
use paceguard::config::Config;
use paceguard::haptics::actuator_for;
use paceguard::session::{MonitoringSession, SessionDeps};
use paceguard::status::{PublishedState, SessionStatus};

#[derive(Serialize)]
struct JsonLine<'a> {
    at: String,
    #[serde(flatten)]
    state: &'a PublishedState,
}

pub fn run_monitor(config: Config, input: &Path, fast: bool, json: bool) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler.
    let shutdown_ctrlc = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        shutdown_ctrlc.store(true, Ordering::Relaxed);
    })?;

    let (observer, updates) = mpsc::channel::<PublishedState>();
    let source = WavFileSource::new(input, config.capture.frames_per_buffer, !fast);
    let session = MonitoringSession::new(
        config.clone(),
        SessionDeps {
            authorizer: Arc::new(FileAccessAuthorizer::new(input)),
            source: Arc::new(source),
            tactile: actuator_for(config.alert.actuator),
            observer: Some(observer),
        },
    );

    session.start();

    let mut seen_active = false;
    while !shutdown.load(Ordering::Relaxed) {
        match updates.recv_timeout(Duration::from_millis(100)) {
            Ok(state) => {
                render(&state, json)?;
                if state.is_monitoring || state.status == SessionStatus::Starting {
                    seen_active = true;
                } else if seen_active {
                    // Stream ended, access denied, or the device failed.
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("Shutting down...");
    session.stop();

    // Render whatever the teardown published.
    for state in updates.try_iter() {
        render(&state, json)?;
    }
    Ok(())
}

fn render(state: &PublishedState, json: bool) -> Result<()> {
    if json {
        let line = JsonLine {
            at: chrono::Local::now().to_rfc3339(),
            state,
        };
        println!("{}", serde_json::to_string(&line)?);
    } else {
        println!("[{}] {}", state.status, state.status_message);
    }
    Ok(())
}
