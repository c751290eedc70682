//! Shell command capture
//!
//! Runs a user-supplied command that prints the text of the capture
//! region on stdout. The default screenshots the region with grim and
//! pipes it through tesseract.
//!
//! # Example Configuration
//!
//! ```toml
//! [capture]
//! command = 'grim -g "{x},{y} {width}x{height}" - | tesseract - - --psm 6'
//! region = { x = 0, y = 300, width = 1080, height = 1200 }
//! timeout_ms = 10000
//! ```

use super::{tidy_lines, TextCapture};
use crate::config::{CaptureConfig, Region, Resolution};
use crate::error::CaptureError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Capture source backed by an external command
pub struct CommandCapture {
    template: String,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            template: config.command.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Substitute region and resolution placeholders into the template
    pub fn render(&self, region: &Region, resolution: Resolution) -> String {
        self.template
            .replace("{x}", &region.x.to_string())
            .replace("{y}", &region.y.to_string())
            .replace("{width}", &region.width.to_string())
            .replace("{height}", &region.height.to_string())
            .replace("{resolution}", resolution.as_str())
            .replace("{lines}", &resolution.lines().to_string())
    }
}

#[async_trait::async_trait]
impl TextCapture for CommandCapture {
    async fn extract_text(&self, region: &Region, resolution: Resolution) -> Result<String, CaptureError> {
        let command = self.render(region, resolution);
        tracing::debug!("Running capture command: {}", command);

        // Spawn via shell so pipelines in the template work
        let child = Command::new("sh")
            .args(["-c", &command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::SpawnFailed(e.to_string()))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| CaptureError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::CommandFailed {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        // OCR output is not always clean UTF-8
        let text = tidy_lines(&String::from_utf8_lossy(&output.stdout));
        if text.is_empty() {
            return Err(CaptureError::Empty);
        }

        tracing::debug!("Captured {} lines", text.lines().count());
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
