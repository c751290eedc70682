//! State machine for the answer pipeline
//!
//! One run walks the states in order:
//! Idle → Capturing → Parsing → Resolving → Clicking → Done → Idle
//!
//! Any stage may instead end the run in `Failed(kind)`. Done and Failed
//! fall back to Idle after the reset delay.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which stage ended a run early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Capture,
    Parse,
    Resolve,
    Dispatch,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Capture => "capture",
            FailureKind::Parse => "parse",
            FailureKind::Resolve => "resolve",
            FailureKind::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Waiting for a trigger
    #[default]
    Idle,

    /// Reading text from the screen region
    Capturing,

    /// Turning raw text into a question
    Parsing,

    /// Looking up or asking for the answer
    Resolving,

    /// Tapping the answer's position
    Clicking,

    /// The tap completed
    Done,

    /// A stage failed
    Failed(FailureKind),
}

impl PipelineState {
    pub fn new() -> Self {
        PipelineState::Idle
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    /// A run is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Capturing
                | PipelineState::Parsing
                | PipelineState::Resolving
                | PipelineState::Clicking
        )
    }

    /// Done or Failed, waiting for the auto-reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            PipelineState::Failed(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The visible indicator for this state
    pub fn indicator(&self) -> Indicator {
        match self {
            PipelineState::Idle => Indicator::Ready,
            PipelineState::Done => Indicator::Success,
            PipelineState::Failed(_) => Indicator::Error,
            _ => Indicator::Working,
        }
    }

    /// Compact form written to the state file
    pub fn as_state_str(&self) -> String {
        match self {
            PipelineState::Idle => "idle".to_string(),
            PipelineState::Capturing => "capturing".to_string(),
            PipelineState::Parsing => "parsing".to_string(),
            PipelineState::Resolving => "resolving".to_string(),
            PipelineState::Clicking => "clicking".to_string(),
            PipelineState::Done => "done".to_string(),
            PipelineState::Failed(kind) => format!("failed:{}", kind),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Capturing => write!(f, "Capturing"),
            PipelineState::Parsing => write!(f, "Parsing"),
            PipelineState::Resolving => write!(f, "Resolving"),
            PipelineState::Clicking => write!(f, "Clicking"),
            PipelineState::Done => write!(f, "Done"),
            PipelineState::Failed(kind) => write!(f, "Failed ({})", kind),
        }
    }
}

impl FromStr for PipelineState {
    type Err = String;

    /// Parses the state file form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let state = match s {
            "idle" => PipelineState::Idle,
            "capturing" => PipelineState::Capturing,
            "parsing" => PipelineState::Parsing,
            "resolving" => PipelineState::Resolving,
            "clicking" => PipelineState::Clicking,
            "done" => PipelineState::Done,
            "failed:capture" => PipelineState::Failed(FailureKind::Capture),
            "failed:parse" => PipelineState::Failed(FailureKind::Parse),
            "failed:resolve" => PipelineState::Failed(FailureKind::Resolve),
            "failed:dispatch" => PipelineState::Failed(FailureKind::Dispatch),
            other => return Err(format!("unknown state '{}'", other)),
        };
        Ok(state)
    }
}

/// Tri-state user-facing indicator, plus Ready when nothing is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Ready,
    Working,
    Success,
    Error,
}

impl Indicator {
    pub fn as_str(self) -> &'static str {
        match self {
            Indicator::Ready => "ready",
            Indicator::Working => "working",
            Indicator::Success => "success",
            Indicator::Error => "error",
        }
    }

    /// Glyph for status bars
    pub fn icon(self) -> &'static str {
        match self {
            Indicator::Ready => "▶",
            Indicator::Working => "⟳",
            Indicator::Success => "✓",
            Indicator::Error => "✗",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
