use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::alert::StatusLabel;

/// Externally observable lifecycle state of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Starting,
    Monitoring,
    PermissionDenied,
    AudioError,
}

impl SessionStatus {
    /// Resting states accept a new `start()`.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Idle | Self::PermissionDenied | Self::AudioError)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::AudioError => write!(f, "Audio error"),
        }
    }
}

pub const READY_MESSAGE: &str = "Ready";
pub const STARTING_MESSAGE: &str = "Starting…";
pub const DENIED_MESSAGE: &str = "Microphone access denied. Grant capture access and start again.";
pub const AUDIO_ERROR_MESSAGE: &str = "Audio error";

/// Status line for a rate classification.
pub fn rate_message(label: StatusLabel, rate: u32, elapsed_secs: u64) -> String {
    match label {
        StatusLabel::TooHigh => format!("Slow down! ({rate} WPM)"),
        StatusLabel::TooLow => format!("Speed up! ({rate} WPM)"),
        StatusLabel::Ok => format!("OK ({rate} WPM)"),
        StatusLabel::Inactive => monitoring_message(elapsed_secs),
    }
}

/// Status line while the first window is still accumulating.
pub fn monitoring_message(elapsed_secs: u64) -> String {
    format!("Monitoring: {elapsed_secs}s")
}

/// Snapshot handed to the presentation layer. Always published whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedState {
    pub status: SessionStatus,
    pub is_monitoring: bool,
    pub current_rate: u32,
    pub status_message: String,
    pub elapsed_secs: u64,
}

impl PublishedState {
    pub fn ready() -> Self {
        Self::resting(SessionStatus::Idle, READY_MESSAGE)
    }

    pub fn resting(status: SessionStatus, message: &str) -> Self {
        Self {
            status,
            is_monitoring: false,
            current_rate: 0,
            status_message: message.to_string(),
            elapsed_secs: 0,
        }
    }

    pub fn starting() -> Self {
        Self::resting(SessionStatus::Starting, STARTING_MESSAGE)
    }

    pub fn monitoring(current_rate: u32, status_message: String, elapsed_secs: u64) -> Self {
        Self {
            status: SessionStatus::Monitoring,
            is_monitoring: true,
            current_rate,
            status_message,
            elapsed_secs,
        }
    }
}

impl Default for PublishedState {
    fn default() -> Self {
        Self::ready()
    }
}

/// Single publication point for session state.
///
/// The latest snapshot is kept for polling and, when an observer is attached,
/// every snapshot is also queued on its channel.
#[derive(Clone)]
pub struct StatePublisher {
    latest: Arc<Mutex<PublishedState>>,
    observer: Option<Sender<PublishedState>>,
}

impl StatePublisher {
    pub fn new(observer: Option<Sender<PublishedState>>) -> Self {
        Self {
            latest: Arc::new(Mutex::new(PublishedState::ready())),
            observer,
        }
    }

    pub fn publish(&self, state: PublishedState) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if *latest == state {
            return;
        }
        *latest = state.clone();
        // Send while holding the lock so observers see snapshots in publication order.
        if let Some(observer) = &self.observer {
            if observer.send(state).is_err() {
                tracing::trace!("State observer disconnected");
            }
        }
    }

    pub fn latest(&self) -> PublishedState {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
