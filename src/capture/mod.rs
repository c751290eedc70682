//! Screen text capture
//!
//! The pipeline only needs raw text for a screen region. How that text is
//! produced (screenshot plus OCR, accessibility tree, a test fixture) is
//! up to the `TextCapture` implementation.

pub mod command;

use crate::config::{CaptureConfig, Region, Resolution};
use crate::error::CaptureError;

pub use command::CommandCapture;

/// Trait for screen text sources
#[async_trait::async_trait]
pub trait TextCapture: Send + Sync {
    /// Extract the visible text inside `region`, one line per text line
    async fn extract_text(&self, region: &Region, resolution: Resolution) -> Result<String, CaptureError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory function to create the configured capture source
pub fn create_capture(config: &CaptureConfig) -> Box<dyn TextCapture> {
    Box::new(CommandCapture::new(config))
}

/// Trim every line and drop blank ones
pub fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tidy_lines() {
        assert_eq!(
            tidy_lines("  Which?\r\n\n A) one \n\tB) two\n\n"),
            "Which?\nA) one\nB) two"
        );
        assert_eq!(tidy_lines(" \n \n"), "");
    }
}
