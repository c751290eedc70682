//! Configuration loading and types for mcqtap
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/mcqtap/config.toml)
//! 3. Environment variables (MCQTAP_*)
//! 4. CLI arguments (highest priority)

use crate::error::McqError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# mcqtap Configuration
#
# Location: ~/.config/mcqtap/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/mcqtap/state),
# a custom path, or "disabled" to turn off. The daemon writes the pipeline
# state ("idle", "capturing", "resolving", "failed:parse", ...) to this file.
# Required for `mcqtap status`.
state_file = "auto"

[capture]
# Shell command that prints the text found in the capture region.
# Placeholders: {x} {y} {width} {height} {resolution} {lines}
# ({lines} is the resolution's line count: 480, 720 or 1080)
command = 'grim -g "{x},{y} {width}x{height}" - | tesseract - - --psm 6'

# Screen region holding the question and its options (pixels)
region = { x = 0, y = 0, width = 1080, height = 1920 }

# Capture resolution hint passed to the command: "480p", "720p" or "1080p"
resolution = "720p"

# Give up on the capture command after this many milliseconds
timeout_ms = 10000

[inference]
# Gemini-compatible generateContent endpoint
endpoint = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-2.0-flash-exp"

# API key. Prefer the MCQTAP_API_KEY or GEMINI_API_KEY environment variable
# over storing the key here.
# api_key = ""

# Request timeout in seconds
timeout_secs = 30

# temperature = 0.1
# max_output_tokens = 10

[cache]
# Answer cache database. "auto" = ~/.local/share/mcqtap/answers.db
path = "auto"

[click]
# How long the simulated finger stays down (ms)
duration_ms = 100

# Where to tap when a letter has not been calibrated
# Set positions with: mcqtap calibrate <LETTER> <X> <Y>
fallback_x = 540
fallback_y = 960

# Calibration file. "auto" = ~/.config/mcqtap/positions.toml
positions_file = "auto"

[pipeline]
# Upper bound on the Resolving stage (seconds)
resolve_timeout_secs = 35

# Upper bound on waiting for a tap to complete (ms)
click_timeout_ms = 3000

# How long Done/Failed is shown before returning to idle (ms)
reset_delay_ms = 2000

[notification]
# Desktop notification when a run answers a question
on_success = true

# Desktop notification when a run fails
on_failure = true
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub click: ClickConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    /// Optional path to state file for external integrations
    /// Example: "/run/user/1000/mcqtap/state" or "auto" for the default location
    #[serde(default)]
    pub state_file: Option<String>,
}

/// Screen region in pixels
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1080,
            height: 1920,
        }
    }
}

/// Capture resolution presets
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum Resolution {
    #[serde(rename = "480p")]
    Low,
    #[default]
    #[serde(rename = "720p")]
    Medium,
    #[serde(rename = "1080p")]
    High,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Low => "480p",
            Resolution::Medium => "720p",
            Resolution::High => "1080p",
        }
    }

    /// Vertical line count, the `{lines}` capture placeholder
    pub fn lines(self) -> u32 {
        match self {
            Resolution::Low => 480,
            Resolution::Medium => 720,
            Resolution::High => 1080,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "480p" | "480" | "low" => Ok(Resolution::Low),
            "720p" | "720" | "medium" => Ok(Resolution::Medium),
            "1080p" | "1080" | "high" => Ok(Resolution::High),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// Screen text capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Shell command printing the recognised text on stdout
    #[serde(default = "default_capture_command")]
    pub command: String,

    #[serde(default)]
    pub region: Region,

    #[serde(default)]
    pub resolution: Resolution,

    /// Timeout in milliseconds (default: 10000)
    #[serde(default = "default_capture_timeout")]
    pub timeout_ms: u64,
}

fn default_capture_command() -> String {
    r#"grim -g "{x},{y} {width}x{height}" - | tesseract - - --psm 6"#.to_string()
}

fn default_capture_timeout() -> u64 {
    10000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            region: Region::default(),
            resolution: Resolution::default(),
            timeout_ms: default_capture_timeout(),
        }
    }
}

/// Remote inference configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key (falls back to MCQTAP_API_KEY, then GEMINI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_inference_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    10
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_inference_timeout(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Answer cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// "auto" or an explicit database path
    #[serde(default = "default_auto")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_auto(),
        }
    }
}

fn default_auto() -> String {
    "auto".to_string()
}

/// Tap dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClickConfig {
    #[serde(default = "default_click_duration")]
    pub duration_ms: u64,

    #[serde(default = "default_fallback_x")]
    pub fallback_x: i32,

    #[serde(default = "default_fallback_y")]
    pub fallback_y: i32,

    /// "auto" or an explicit calibration file path
    #[serde(default = "default_auto")]
    pub positions_file: String,
}

fn default_click_duration() -> u64 {
    100
}

fn default_fallback_x() -> i32 {
    540
}

fn default_fallback_y() -> i32 {
    960
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_click_duration(),
            fallback_x: default_fallback_x(),
            fallback_y: default_fallback_y(),
            positions_file: default_auto(),
        }
    }
}

/// Stage timeouts and the auto-reset delay
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    #[serde(default = "default_click_timeout")]
    pub click_timeout_ms: u64,

    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,
}

fn default_resolve_timeout() -> u64 {
    35 // a little over the inference request timeout
}

fn default_click_timeout() -> u64 {
    3000
}

fn default_reset_delay() -> u64 {
    2000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_secs: default_resolve_timeout(),
            click_timeout_ms: default_click_timeout(),
            reset_delay_ms: default_reset_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub on_success: bool,

    #[serde(default = "default_true")]
    pub on_failure: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_success: true,
            on_failure: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            inference: InferenceConfig::default(),
            cache: CacheConfig::default(),
            click: ClickConfig::default(),
            pipeline: PipelineConfig::default(),
            notification: NotificationConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl Config {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("", "", "mcqtap")
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid, click requests)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("mcqtap")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for the answer cache)
    pub fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Answer cache database location
    pub fn resolve_cache_path(&self) -> PathBuf {
        if self.cache.path.eq_ignore_ascii_case("auto") {
            Self::data_dir().join("answers.db")
        } else {
            PathBuf::from(&self.cache.path)
        }
    }

    /// Calibration file location
    pub fn resolve_positions_path(&self) -> PathBuf {
        if self.click.positions_file.eq_ignore_ascii_case("auto") {
            Self::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("positions.toml")
        } else {
            PathBuf::from(&self.click.positions_file)
        }
    }

    /// API key from config or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.inference
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_nonempty("MCQTAP_API_KEY"))
            .or_else(|| env_nonempty("GEMINI_API_KEY"))
    }

    /// Ensure config and data directories exist
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let data_dir = Self::data_dir();
        std::fs::create_dir_all(&data_dir)?;
        tracing::debug!("Ensured data directory exists: {:?}", data_dir);

        Ok(())
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, McqError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| McqError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| McqError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, env_nonempty)?;

    Ok(config)
}

/// Override config values from MCQTAP_* variables
fn apply_env_overrides(
    config: &mut Config,
    get: impl Fn(&str) -> Option<String>,
) -> Result<(), McqError> {
    if let Some(model) = get("MCQTAP_MODEL") {
        config.inference.model = model;
    }
    if let Some(endpoint) = get("MCQTAP_ENDPOINT") {
        config.inference.endpoint = endpoint;
    }
    if let Some(command) = get("MCQTAP_CAPTURE_COMMAND") {
        config.capture.command = command;
    }
    if let Some(resolution) = get("MCQTAP_RESOLUTION") {
        config.capture.resolution = resolution
            .parse()
            .map_err(|e| McqError::Config(format!("MCQTAP_RESOLUTION: {}", e)))?;
    }
    if let Some(path) = get("MCQTAP_CACHE") {
        config.cache.path = path;
    }
    Ok(())
}
