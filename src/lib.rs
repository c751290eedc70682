//! mcqtap: one-tap answers for on-screen multiple-choice questions
//!
//! This library provides the core functionality for:
//! - Capturing question text from a screen region (external OCR command)
//! - Parsing the text into a question and its lettered options
//! - Resolving the answer letter from a local SQLite cache or a Gemini model
//! - Tapping the calibrated position of that option via ydotool
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │              Daemon                 │
//!                            │   (SIGUSR1 run, SIGUSR2 click,      │
//!                            │    SIGHUP reload positions)         │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                                            ▼
//!          ┌─────────────────────────────────────────────────────────────────┐
//!          │                     PipelineOrchestrator                        │
//!          │  Idle ─▶ Capturing ─▶ Parsing ─▶ Resolving ─▶ Clicking ─▶ Done  │
//!          │                 any stage may end in Failed(kind)               │
//!          │            terminal states return to Idle after a delay         │
//!          └─────────────────────────────────────────────────────────────────┘
//!                   │                │                 │                │
//!                   ▼                ▼                 ▼                ▼
//!          ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!          │   Capture    │ │    Parser    │ │   Resolver   │ │    Click     │
//!          │ (sh command) │ │ (line rules) │ │ cache/Gemini │ │  (ydotool)   │
//!          └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘
//!                                                    │                ▲
//!                                                    ▼                │
//!                                            ┌──────────────┐ ┌──────────────┐
//!                                            │ AnswerCache  │ │ CoordinateMap│
//!                                            │  (rusqlite)  │ │ (positions)  │
//!                                            └──────────────┘ └──────────────┘
//! ```

pub mod cache;
pub mod capture;
pub mod cli;
pub mod click;
pub mod config;
pub mod coords;
pub mod daemon;
pub mod error;
pub mod notification;
pub mod parser;
pub mod pipeline;
pub mod question;
pub mod resolve;
pub mod state;

pub use cli::{CacheAction, Cli, Commands};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{McqError, Result};
pub use parser::QuestionParser;
pub use pipeline::{PipelineOrchestrator, RunOutcome};
pub use question::{OptionLetter, Question};
pub use state::PipelineState;
