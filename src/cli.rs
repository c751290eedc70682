// Command-line interface definitions for mcqtap

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mcqtap")]
#[command(author, version, about = "Answer on-screen multiple-choice questions with one tap")]
#[command(long_about = "
mcqtap reads a multiple-choice question from a region of the screen,
works out the answer (from its local cache, or by asking a Gemini model),
and taps the matching option.

SETUP:
  1. Install grim, tesseract and ydotool
  2. Start the ydotool daemon: systemctl --user enable --now ydotool
  3. Export your API key: export GEMINI_API_KEY=...
  4. Run: mcqtap setup (writes the default config and checks tools)
  5. Calibrate option positions: mcqtap calibrate A 540 1210 (etc.)
  6. Run: mcqtap (to start the daemon)

USAGE:
  Bind `mcqtap run` to a key or button in your compositor.
  `mcqtap click B` taps option B directly.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override inference model (e.g., gemini-2.0-flash-exp)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override capture resolution (480p, 720p, 1080p)
    #[arg(long, value_name = "RES")]
    pub resolution: Option<String>,

    /// Override answer cache database path
    #[arg(long, value_name = "FILE")]
    pub cache: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Ask the running daemon to answer the question on screen (SIGUSR1)
    Run,

    /// Ask the running daemon to tap an option directly (SIGUSR2)
    Click {
        /// Option letter (A-D)
        letter: String,
    },

    /// Show daemon status (for Waybar/polybar integration)
    Status {
        /// Continuously output status changes (for Waybar exec)
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json" (for Waybar)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Parse question text and print the result (reads stdin if no file)
    Parse {
        /// File containing captured text
        file: Option<std::path::PathBuf>,
    },

    /// Parse and resolve question text without tapping (reads stdin if no file)
    Ask {
        /// File containing captured text
        file: Option<std::path::PathBuf>,
    },

    /// Inspect the answer cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Set the tap position for an option letter
    Calibrate {
        /// Option letter (A-D)
        letter: Option<String>,

        /// X coordinate in pixels
        #[arg(allow_negative_numbers = true)]
        x: Option<i32>,

        /// Y coordinate in pixels
        #[arg(allow_negative_numbers = true)]
        y: Option<i32>,

        /// Remove the position for LETTER, or all positions if no letter is given
        #[arg(long)]
        clear: bool,
    },

    /// Show current configuration
    Config,

    /// Write the default config and check for required tools
    Setup {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry count and age range
    Stats,

    /// Look up the cached answer for a question text
    Lookup {
        /// Question text (matched case-insensitively, surrounding whitespace ignored)
        text: String,
    },
}
