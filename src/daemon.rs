//! Daemon module - main event loop
//!
//! Builds the pipeline, connects the gesture session and waits for
//! signals:
//! - SIGUSR1: run the pipeline
//! - SIGUSR2: tap the letter named in the click request file
//! - SIGHUP: reload tap positions
//! - SIGINT/SIGTERM: shut down

use crate::click::ydotool::YdotoolBackend;
use crate::click::{DispatchSession, GestureBackend};
use crate::config::Config;
use crate::coords::CoordinateMap;
use crate::error::{McqError, Result};
use crate::notification;
use crate::pipeline::PipelineOrchestrator;
use crate::question::OptionLetter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Write state to file for external integrations (e.g., Waybar)
fn write_state_file(path: &Path, state: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

fn remove_file_quietly(path: &Path, what: &str) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove {}: {}", what, e);
        }
    }
}

/// PID file used by `mcqtap run` / `mcqtap click` to find the daemon
pub fn pid_file_path() -> PathBuf {
    Config::runtime_dir().join("pid")
}

/// File carrying the letter for the next SIGUSR2
pub fn click_request_path() -> PathBuf {
    Config::runtime_dir().join("click_request")
}

/// Write PID file for external control via signals
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = pid_file_path();

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Store a direct-click request for the daemon to pick up
pub fn write_click_request(path: &Path, letter: OptionLetter) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, letter.as_str())?;
    Ok(())
}

/// Read and remove a pending click request
pub fn take_click_request(path: &Path) -> Option<OptionLetter> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("No click request at {:?}: {}", path, e);
            return None;
        }
    };
    remove_file_quietly(path, "click request");

    match contents.parse::<OptionLetter>() {
        Ok(letter) => Some(letter),
        Err(bad) => {
            tracing::warn!("Ignoring click request for {:?}", bad);
            None
        }
    }
}

/// Connect the session if the backend has become usable
async fn ensure_connected(session: &DispatchSession, backend: &Arc<YdotoolBackend>) {
    if session.is_connected() {
        return;
    }
    if backend.is_available().await {
        session.connect(backend.clone());
    } else {
        tracing::warn!(
            "ydotool is not usable (is ydotoold running?). Taps will fail until it is.\n  \
             Start with: systemctl --user start ydotool"
        );
    }
}

/// Main daemon that owns the pipeline and the signal loop
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            state_file_path,
            pid_file_path: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting mcqtap daemon");

        Config::ensure_directories()
            .map_err(|e| McqError::Config(format!("Failed to create directories: {}", e)))?;

        self.pid_file_path = write_pid_file();

        let mut sigusr1 = signal(SignalKind::user_defined1())
            .map_err(|e| McqError::Config(format!("Failed to set up SIGUSR1 handler: {}", e)))?;
        let mut sigusr2 = signal(SignalKind::user_defined2())
            .map_err(|e| McqError::Config(format!("Failed to set up SIGUSR2 handler: {}", e)))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| McqError::Config(format!("Failed to set up SIGHUP handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| McqError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

        let backend = Arc::new(YdotoolBackend::new());
        let session = DispatchSession::new();
        ensure_connected(&session, &backend).await;

        let pipeline = Arc::new(PipelineOrchestrator::from_config(&self.config, session.clone())?);
        tracing::info!("Answer cache: {:?}", self.config.resolve_cache_path());
        tracing::info!(
            "Capture region: {:?} at {}",
            self.config.capture.region,
            self.config.capture.resolution
        );

        // Mirror every state change into the state file
        let state_writer = self.state_file_path.clone().map(|path| {
            tracing::info!("State file: {:?}", path);
            let mut rx = pipeline.subscribe();
            write_state_file(&path, &rx.borrow().as_state_str());
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = *rx.borrow_and_update();
                    write_state_file(&path, &state.as_state_str());
                }
            })
        });

        let click_request = click_request_path();
        tracing::info!("Ready. Trigger with `mcqtap run` (SIGUSR1)");

        loop {
            tokio::select! {
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (run)");
                    ensure_connected(&session, &backend).await;
                    let pipeline = pipeline.clone();
                    let notify = self.config.notification.clone();
                    tokio::spawn(async move {
                        let outcome = pipeline.trigger().await;
                        notification::notify_outcome(&notify, &outcome).await;
                    });
                }

                _ = sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (direct click)");
                    let Some(letter) = take_click_request(&click_request) else {
                        continue;
                    };
                    ensure_connected(&session, &backend).await;
                    let pipeline = pipeline.clone();
                    let notify = self.config.notification.clone();
                    tokio::spawn(async move {
                        let outcome = pipeline.direct_click(letter).await;
                        notification::notify_outcome(&notify, &outcome).await;
                    });
                }

                _ = sighup.recv() => {
                    tracing::debug!("Received SIGHUP (reload positions)");
                    match CoordinateMap::from_config(&self.config) {
                        Ok(coords) => pipeline.set_coordinates(coords),
                        Err(e) => tracing::error!("Keeping previous positions: {}", e),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        session.disconnect();

        if let Some(task) = state_writer {
            task.abort();
        }
        if let Some(ref path) = self.state_file_path {
            remove_file_quietly(path, "state file");
        }
        if let Some(ref path) = self.pid_file_path {
            remove_file_quietly(path, "PID file");
        }
        remove_file_quietly(&click_request, "click request");

        tracing::info!("Daemon stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_click_request_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run").join("click_request");

        write_click_request(&path, OptionLetter::D).unwrap();
        assert_eq!(take_click_request(&path), Some(OptionLetter::D));
        assert!(!path.exists());
        assert_eq!(take_click_request(&path), None);
    }

    #[test]
    fn test_bad_click_request_is_dropped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("click_request");
        std::fs::write(&path, "Z").unwrap();
        assert_eq!(take_click_request(&path), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_write_state_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state");
        write_state_file(&path, "failed:resolve");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "failed:resolve");
        remove_file_quietly(&path, "state file");
        assert!(!path.exists());
    }
}
