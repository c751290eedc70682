//! ydotool-based tap injection
//!
//! Moves the pointer to the target with an absolute move, then presses and
//! releases the left button with the configured hold time in between. On
//! touch-emulating compositors this reads as a tap.
//!
//! Requires:
//! - ydotool installed
//! - ydotoold daemon running (systemctl --user start ydotool)
//! - User in 'input' group

use super::{Gesture, GestureBackend, GestureCompletion};
use crate::error::DispatchError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Left button down / up codes for `ydotool click`
const LEFT_DOWN: &str = "0x40";
const LEFT_UP: &str = "0x80";

#[derive(Debug)]
pub struct YdotoolBackend {
    program: PathBuf,
}

impl Default for YdotoolBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl YdotoolBackend {
    pub fn new() -> Self {
        Self::with_program("ydotool")
    }

    /// Use a specific ydotool binary instead of the one on PATH
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn move_args(gesture: &Gesture) -> Vec<String> {
        vec![
            "mousemove".to_string(),
            "--absolute".to_string(),
            "-x".to_string(),
            gesture.x.to_string(),
            "-y".to_string(),
            gesture.y.to_string(),
        ]
    }

    /// Run the tap unless the dispatcher stops waiting before the press.
    ///
    /// Returns `Ok(false)` when the tap was abandoned. Once the button is
    /// down it is always released.
    async fn perform(
        program: &Path,
        gesture: Gesture,
        completion: &GestureCompletion,
    ) -> Result<bool, DispatchError> {
        if completion.is_abandoned() {
            return Ok(false);
        }
        run_ydotool(program, &Self::move_args(&gesture)).await?;

        if completion.is_abandoned() {
            return Ok(false);
        }
        run_ydotool(program, &["click", LEFT_DOWN]).await?;
        tokio::time::sleep(Duration::from_millis(gesture.duration_ms)).await;
        run_ydotool(program, &["click", LEFT_UP]).await?;
        Ok(true)
    }
}

async fn run_ydotool<S: AsRef<std::ffi::OsStr>>(program: &Path, args: &[S]) -> Result<(), DispatchError> {
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DispatchError::NotAvailable
            } else {
                DispatchError::Rejected(e.to_string())
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stderr.contains("socket") || stderr.contains("connect") || stderr.contains("daemon") {
            return Err(DispatchError::NotAvailable);
        }

        return Err(DispatchError::Rejected(stderr.trim().to_string()));
    }

    Ok(())
}

#[async_trait::async_trait]
impl GestureBackend for YdotoolBackend {
    fn dispatch(&self, gesture: Gesture, completion: GestureCompletion) -> Result<(), DispatchError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| DispatchError::Rejected("no async runtime to run ydotool on".into()))?;

        let program = self.program.clone();
        handle.spawn(async move {
            match Self::perform(&program, gesture, &completion).await {
                Ok(true) => completion.complete(),
                Ok(false) => {
                    tracing::debug!("Tap at ({}, {}) abandoned before the press", gesture.x, gesture.y);
                    completion.cancel();
                }
                Err(e) => {
                    tracing::warn!("ydotool tap at ({}, {}) failed: {}", gesture.x, gesture.y, e);
                    completion.cancel();
                }
            }
        });

        Ok(())
    }

    async fn is_available(&self) -> bool {
        if which::which(&self.program).is_err() {
            return false;
        }

        // A zero relative move only succeeds when ydotoold is reachable
        Command::new(&self.program)
            .args(["mousemove", "-x", "0", "-y", "0"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}
