// Capture authorization. The request is asynchronous: the answer arrives via a
// callback, possibly on another thread, after `request_access` has returned.

use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

pub type AccessCallback = Box<dyn FnOnce(bool) + Send>;

type Job = Box<dyn FnOnce() + Send>;

pub trait Authorizer: Send + Sync {
    /// Ask for capture access. `respond` must be called exactly once.
    fn request_access(&self, respond: AccessCallback);
}

/// Grants access when the capture file can be opened for reading.
pub struct FileAccessAuthorizer {
    path: PathBuf,
}

impl FileAccessAuthorizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Authorizer for FileAccessAuthorizer {
    fn request_access(&self, respond: AccessCallback) {
        let path = self.path.clone();
        answer_in_background(respond, move || match std::fs::File::open(&path) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Cannot open {} for capture: {}", path.display(), e);
                false
            }
        });
    }
}

/// Always answers the same way, from a background thread.
pub struct StaticAuthorizer {
    granted: bool,
}

impl StaticAuthorizer {
    pub fn granting() -> Self {
        Self { granted: true }
    }

    pub fn denying() -> Self {
        Self { granted: false }
    }
}

impl Authorizer for StaticAuthorizer {
    fn request_access(&self, respond: AccessCallback) {
        let granted = self.granted;
        answer_in_background(respond, move || granted);
    }
}

fn answer_in_background(respond: AccessCallback, decide: impl FnOnce() -> bool + Send + 'static) {
    answer_with(respond, decide, |job| {
        std::thread::Builder::new()
            .name("authorize".into())
            .spawn(job)
            .map(drop)
    });
}

/// Run `decide` through `spawn` and pass its answer to `respond`. The callback
/// stays on this side until the job is running, so a failed spawn still
/// answers (with a denial).
fn answer_with(
    respond: AccessCallback,
    decide: impl FnOnce() -> bool + Send + 'static,
    spawn: impl FnOnce(Job) -> io::Result<()>,
) {
    let (handoff, callback) = mpsc::channel::<AccessCallback>();
    let job: Job = Box::new(move || {
        let granted = decide();
        if let Ok(respond) = callback.recv() {
            respond(granted);
        }
    });
    match spawn(job) {
        Ok(()) => {
            // The job blocks on `recv` until this arrives, so the receiver is alive.
            let _ = handoff.send(respond);
        }
        Err(e) => {
            tracing::error!("Failed to spawn authorization thread: {:?}", e);
            respond(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn ask(authorizer: &dyn Authorizer) -> bool {
        let (tx, rx) = mpsc::channel();
        authorizer.request_access(Box::new(move |granted| {
            let _ = tx.send(granted);
        }));
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_static_authorizer() {
        assert!(ask(&StaticAuthorizer::granting()));
        assert!(!ask(&StaticAuthorizer::denying()));
    }

    #[test]
    fn test_failed_spawn_still_answers() {
        let (tx, rx) = mpsc::channel();
        answer_with(
            Box::new(move |granted| {
                let _ = tx.send(granted);
            }),
            || true,
            |_job| Err(io::Error::other("no threads left")),
        );
        assert_eq!(rx.try_recv(), Ok(false));
    }

    #[test]
    fn test_file_access_authorizer() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("clip.wav");
        assert!(!ask(&FileAccessAuthorizer::new(&path)));
        std::fs::write(&path, b"RIFF").unwrap();
        assert!(ask(&FileAccessAuthorizer::new(&path)));
    }
}
