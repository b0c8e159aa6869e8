use thiserror::Error;

/// Failures that end a monitoring session.
///
/// Neither variant escapes the session: both are turned into a resting
/// status and the session is left ready for another `start()`.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("capture access was denied")]
    PermissionDenied,

    #[error("capture device failure: {0}")]
    CaptureDeviceFailure(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("invalid config value `{field}`: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}
