//! Error types for mcqtap
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues. Each pipeline stage has
//! its own error enum; the orchestrator folds them into `FailureKind`.

use thiserror::Error;

/// Top-level error type for the mcqtap application
#[derive(Error, Debug)]
pub enum McqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolutionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the screen-text capture collaborator
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture command failed to start: {0}")]
    SpawnFailed(String),

    #[error("Capture command exited with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("Capture timed out after {0}ms")]
    Timeout(u64),

    #[error("No text was captured. Check the capture region and OCR setup.")]
    Empty,
}

/// Errors from turning raw text into a question
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Need at least 2 options, found {found}")]
    InsufficientOptions { found: usize },

    #[error("No question text found (every line looked like an option)")]
    NoQuestionText,
}

/// Errors from resolving a question to an answer letter
///
/// All variants mean the question is unresolved for this run; the variant
/// records why.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Unresolved: inference timed out after {0}s")]
    Timeout(u64),

    #[error("Unresolved: invalid response {response:?} (expected one of {expected})")]
    InvalidResponse { response: String, expected: String },

    #[error("Unresolved: transport failure: {0}")]
    TransportFailure(String),

    #[error("Unresolved: answer cache unavailable: {0}")]
    Cache(#[from] CacheError),
}

/// Errors from dispatching a tap gesture
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No gesture session connected. Is ydotoold running?\n  Start with: systemctl --user start ydotool")]
    NotAvailable,

    #[error("Gesture rejected: {0}")]
    Rejected(String),

    #[error("Gesture was cancelled before completion")]
    Cancelled,

    #[error("Gesture did not complete within {0}ms")]
    Timeout(u64),

    #[error("Not an option letter: {0:?}")]
    UnknownLetter(String),
}

/// Errors from the persistent answer cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry for {fingerprint}: {detail}")]
    Corrupt { fingerprint: String, detail: String },
}

/// Result type alias using McqError
pub type Result<T> = std::result::Result<T, McqError>;
