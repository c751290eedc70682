//! mcqtap - answer on-screen multiple-choice questions
//!
//! Run with `mcqtap` or `mcqtap daemon` to start the daemon.
//! Use `mcqtap run` to answer the question on screen.
//! Use `mcqtap parse` / `mcqtap ask` to try the parser and resolver offline.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use mcqtap::cache::{AnswerCache, Fingerprint};
use mcqtap::cli::{CacheAction, Cli, Commands};
use mcqtap::config::{self, Config, DEFAULT_CONFIG};
use mcqtap::coords::{CalibrationStore, Position};
use mcqtap::daemon::{self, Daemon};
use mcqtap::parser::QuestionParser;
use mcqtap::question::OptionLetter;
use mcqtap::resolve::{self, AnswerResolver};
use mcqtap::state::PipelineState;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("mcqtap={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(model) = cli.model {
        config.inference.model = model;
    }
    if let Some(resolution) = cli.resolution {
        config.capture.resolution = resolution.parse().map_err(|e: String| anyhow!(e))?;
    }
    if let Some(cache) = cli.cache {
        config.cache.path = cache.to_string_lossy().to_string();
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(config).await?,

        Commands::Run => {
            signal_daemon(DaemonSignal::Run)?;
        }

        Commands::Click { letter } => {
            let letter = parse_letter(&letter)?;
            daemon::write_click_request(&daemon::click_request_path(), letter)?;
            signal_daemon(DaemonSignal::Click)?;
        }

        Commands::Status { follow, format } => {
            run_status(&config, follow, &format)?;
        }

        Commands::Parse { file } => {
            let raw = read_input(file.as_deref())?;
            let question = QuestionParser::new().parse(&raw)?;
            print!("{}", question);
        }

        Commands::Ask { file } => {
            run_ask(&config, file.as_deref()).await?;
        }

        Commands::Cache { action } => {
            run_cache(&config, action)?;
        }

        Commands::Calibrate {
            letter,
            x,
            y,
            clear,
        } => {
            run_calibrate(&config, letter.as_deref(), x, y, clear)?;
        }

        Commands::Config => {
            show_config(&config);
        }

        Commands::Setup { force } => {
            run_setup(&config, force)?;
        }
    }

    Ok(())
}

/// Start the daemon, refusing to run twice
async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let lock_path = Config::runtime_dir().join("daemon.lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_path_str = lock_path.to_string_lossy().to_string();
    let mut pidlock = pidlock::Pidlock::new(&lock_path_str);

    if pidlock.acquire().is_err() {
        bail!(
            "Another mcqtap daemon is already running (lock: {:?})",
            lock_path
        );
    }

    let mut daemon = Daemon::new(config);
    let result = daemon.run().await;

    if let Err(e) = pidlock.release() {
        tracing::debug!("Failed to release daemon lock: {:?}", e);
    }
    result.map_err(Into::into)
}

fn parse_letter(letter: &str) -> anyhow::Result<OptionLetter> {
    letter
        .parse::<OptionLetter>()
        .map_err(|bad| anyhow!("'{}' is not an option letter (expected A, B, C or D)", bad))
}

#[derive(Debug, Clone, Copy)]
enum DaemonSignal {
    Run,
    Click,
    Reload,
}

fn read_daemon_pid() -> anyhow::Result<i32> {
    let pid_path = daemon::pid_file_path();
    let contents = std::fs::read_to_string(&pid_path).with_context(|| {
        format!(
            "mcqtap daemon does not appear to be running (no PID file at {:?})",
            pid_path
        )
    })?;
    contents
        .trim()
        .parse::<i32>()
        .with_context(|| format!("Invalid PID file {:?}", pid_path))
}

/// Send a control signal to the running daemon
#[cfg(target_os = "linux")]
fn signal_daemon(which: DaemonSignal) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = match which {
        DaemonSignal::Run => Signal::SIGUSR1,
        DaemonSignal::Click => Signal::SIGUSR2,
        DaemonSignal::Reload => Signal::SIGHUP,
    };

    let pid = read_daemon_pid()?;
    kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow!("Failed to signal mcqtap daemon (pid {}): {}", pid, e))?;
    tracing::debug!("Sent {:?} to pid {}", signal, pid);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn signal_daemon(which: DaemonSignal) -> anyhow::Result<()> {
    let pid = read_daemon_pid()?;
    bail!("Cannot send {:?} to pid {}: daemon control is Linux-only", which, pid)
}

/// Read from a file, or stdin when no path is given
fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path)),
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

fn open_cache(config: &Config) -> anyhow::Result<AnswerCache> {
    let path = config.resolve_cache_path();
    AnswerCache::open(&path).with_context(|| format!("Failed to open answer cache {:?}", path))
}

/// Parse and resolve without tapping
async fn run_ask(config: &Config, file: Option<&Path>) -> anyhow::Result<()> {
    let raw = read_input(file)?;
    let question = QuestionParser::new().parse(&raw)?;
    print!("{}", question);

    let resolver = AnswerResolver::new(
        Arc::new(open_cache(config)?),
        resolve::create_client(config)?,
        Duration::from_secs(config.inference.timeout_secs),
    );
    let resolution = resolver.resolve_detailed(&question).await?;

    let body = question
        .options
        .get(&resolution.letter)
        .map(String::as_str)
        .unwrap_or("(not among the parsed options)");
    println!("\nAnswer: {}) {}  [{}]", resolution.letter, body, resolution.source);
    Ok(())
}

fn run_cache(config: &Config, action: CacheAction) -> anyhow::Result<()> {
    let cache = open_cache(config)?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            println!("Cache: {:?}", cache.path().unwrap_or_else(|| Path::new("(memory)")));
            println!("Entries: {}", stats.entries);
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("Oldest: {}", oldest.to_rfc3339());
                println!("Newest: {}", newest.to_rfc3339());
            }
        }
        CacheAction::Lookup { text } => {
            let fingerprint = Fingerprint::of(&text);
            match cache.get(&fingerprint)? {
                Some(hit) => println!(
                    "{}  (fingerprint {}, resolved {})",
                    hit.letter,
                    fingerprint,
                    hit.resolved_at.to_rfc3339()
                ),
                None => {
                    println!("Not cached (fingerprint {})", fingerprint);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn run_calibrate(
    config: &Config,
    letter: Option<&str>,
    x: Option<i32>,
    y: Option<i32>,
    clear: bool,
) -> anyhow::Result<()> {
    let mut store = CalibrationStore::load(&config.resolve_positions_path())?;
    let letter = letter.map(parse_letter).transpose()?;

    match (letter, x, y, clear) {
        (None, None, None, false) => {
            if store.positions().is_empty() {
                println!("No positions calibrated; every letter taps the fallback");
            }
            for (letter, position) in store.positions() {
                println!("{}: ({}, {})", letter, position.x, position.y);
            }
            println!(
                "Fallback: ({}, {})",
                config.click.fallback_x, config.click.fallback_y
            );
            return Ok(());
        }
        (Some(letter), None, None, true) => {
            if store.remove(letter).is_none() {
                println!("{} was not calibrated", letter);
            }
        }
        (None, None, None, true) => store.clear(),
        (Some(letter), Some(x), Some(y), false) => store.set(letter, Position::new(x, y)),
        _ => bail!("Usage: mcqtap calibrate <LETTER> <X> <Y>, or --clear [LETTER]"),
    }

    store.save()?;
    println!("Saved {:?}", store.path());

    // Pick up the change in a running daemon; not running is fine
    if signal_daemon(DaemonSignal::Reload).is_ok() {
        println!("Daemon reloaded positions");
    }
    Ok(())
}

/// Run the status command - show current daemon state
fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    let print_state = |state: &str| {
        if format == "json" {
            println!("{}", format_state_json(state));
        } else {
            println!("{}", format_state_text(state));
        }
    };

    let read_state = |path: &Path| {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "stopped".to_string())
    };

    let mut last_state = read_state(&state_path);
    print_state(&last_state);

    if !follow {
        return Ok(());
    }

    // Follow mode: watch for changes
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::{channel, RecvTimeoutError};

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the state file's parent directory (file may not exist yet)
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let new_state = read_state(&state_path);
                if new_state != last_state {
                    print_state(&new_state);
                    last_state = new_state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Daemon stopped
                if !state_path.exists() && last_state != "stopped" {
                    print_state("stopped");
                    last_state = "stopped".to_string();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn format_state_text(state: &str) -> String {
    match state.parse::<PipelineState>() {
        Ok(parsed) => format!("{} ({})", parsed.indicator(), state),
        Err(_) => state.to_string(),
    }
}

/// Format state as JSON for Waybar consumption
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state.parse::<PipelineState>() {
        Ok(parsed) => {
            let indicator = parsed.indicator();
            (
                indicator.icon().to_string(),
                indicator.as_str().to_string(),
                format!("mcqtap: {}", parsed),
            )
        }
        Err(_) if state == "stopped" => (
            String::new(),
            "stopped".to_string(),
            "mcqtap not running".to_string(),
        ),
        Err(_) => ("?".to_string(), "unknown".to_string(), "Unknown state".to_string()),
    };

    serde_json::json!({
        "text": text,
        "class": class,
        "alt": state,
        "tooltip": tooltip,
    })
    .to_string()
}

/// Show current configuration
fn show_config(config: &Config) {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[capture]");
    println!("  command = {:?}", config.capture.command);
    println!("  region = {:?}", config.capture.region);
    println!("  resolution = {}", config.capture.resolution);
    println!("  timeout_ms = {}", config.capture.timeout_ms);

    println!("\n[inference]");
    println!("  endpoint = {:?}", config.inference.endpoint);
    println!("  model = {:?}", config.inference.model);
    println!(
        "  api_key = {}",
        if config.resolve_api_key().is_some() {
            "(set)"
        } else {
            "(missing)"
        }
    );
    println!("  timeout_secs = {}", config.inference.timeout_secs);
    println!("  temperature = {}", config.inference.temperature);
    println!("  max_output_tokens = {}", config.inference.max_output_tokens);

    println!("\n[cache]");
    println!("  path = {:?}", config.cache.path);
    println!("  (resolves to: {:?})", config.resolve_cache_path());

    println!("\n[click]");
    println!("  duration_ms = {}", config.click.duration_ms);
    println!(
        "  fallback = ({}, {})",
        config.click.fallback_x, config.click.fallback_y
    );
    println!("  positions_file = {:?}", config.resolve_positions_path());

    println!("\n[pipeline]");
    println!("  resolve_timeout_secs = {}", config.pipeline.resolve_timeout_secs);
    println!("  click_timeout_ms = {}", config.pipeline.click_timeout_ms);
    println!("  reset_delay_ms = {}", config.pipeline.reset_delay_ms);

    println!("\n[notification]");
    println!("  on_success = {}", config.notification.on_success);
    println!("  on_failure = {}", config.notification.on_failure);

    if let Some(ref state_file) = config.state_file {
        println!("\n[integration]");
        println!("  state_file = {:?}", state_file);
        if let Some(resolved) = config.resolve_state_file() {
            println!("  (resolves to: {:?})", resolved);
        }
    }

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
}

/// Write the default config and check the external tools
fn run_setup(config: &Config, force: bool) -> anyhow::Result<()> {
    println!("mcqtap Setup\n");
    println!("============\n");

    println!("Creating directories...");
    Config::ensure_directories()?;
    println!("  ✓ Config directory: {:?}", Config::config_dir().unwrap_or_default());
    println!("  ✓ Data directory: {:?}", Config::data_dir());

    if let Some(config_path) = Config::default_path() {
        if !config_path.exists() || force {
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            println!("  ✓ Wrote default config: {:?}", config_path);
        } else {
            println!("  Config file exists: {:?} (use --force to overwrite)", config_path);
        }
    }

    let mut all_ok = true;

    println!("\nChecking tools...");
    for (tool, purpose) in [
        ("ydotool", "tapping answers"),
        ("grim", "screenshots (default capture command)"),
        ("tesseract", "OCR (default capture command)"),
    ] {
        match which::which(tool) {
            Ok(path) => println!("  ✓ {} found: {:?}", tool, path),
            Err(_) => {
                println!("  ✗ {} not found, needed for {}", tool, purpose);
                all_ok = false;
            }
        }
    }

    println!("\nChecking ydotool daemon...");
    let daemon_active = std::process::Command::new("systemctl")
        .args(["--user", "is-active", "ydotool"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if daemon_active {
        println!("  ✓ ydotool daemon running");
    } else {
        println!("  ✗ ydotool daemon not running");
        println!("    Run: systemctl --user enable --now ydotool");
        all_ok = false;
    }

    println!("\nChecking API key...");
    if config.resolve_api_key().is_some() {
        println!("  ✓ API key configured");
    } else {
        println!("  ✗ No API key. Export GEMINI_API_KEY or MCQTAP_API_KEY");
        all_ok = false;
    }

    println!("\n---");
    if all_ok {
        println!("✓ All checks passed! Calibrate positions, then run 'mcqtap' to start.");
    } else {
        println!("✗ Some checks failed. Please fix the issues above.");
    }

    Ok(())
}
