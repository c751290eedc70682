//! Desktop notifications
//!
//! Linux only, through notify-send (libnotify). Other platforms log and
//! carry on.

use crate::config::NotificationConfig;
use crate::pipeline::RunOutcome;
use std::process::Stdio;
use tokio::process::Command;

/// Send a desktop notification with the given title and body.
///
/// Notification failures are logged but don't propagate errors
/// (notifications are best-effort).
pub async fn send(title: &str, body: &str) {
    #[cfg(target_os = "linux")]
    send_linux(title, body).await;

    #[cfg(not(target_os = "linux"))]
    {
        tracing::debug!("Notifications not supported on this platform");
        let _ = (title, body);
    }
}

#[cfg(target_os = "linux")]
async fn send_linux(title: &str, body: &str) {
    let result = Command::new("notify-send")
        .args(["--app-name=mcqtap", "--expire-time=2000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

/// Title and body for a finished run, if the config wants one
pub fn outcome_message(config: &NotificationConfig, outcome: &RunOutcome) -> Option<(String, String)> {
    match outcome {
        RunOutcome::Ignored => None,
        RunOutcome::Completed { letter, source } => config
            .on_success
            .then(|| (format!("Answered {}", letter), format!("Tapped option {} ({})", letter, source))),
        RunOutcome::Failed { kind, reason } => config
            .on_failure
            .then(|| (format!("Failed at {}", kind), reason.clone())),
    }
}

/// Notify about a finished run according to config
pub async fn notify_outcome(config: &NotificationConfig, outcome: &RunOutcome) {
    if let Some((title, body)) = outcome_message(config, outcome) {
        send(&title, &body).await;
    }
}
