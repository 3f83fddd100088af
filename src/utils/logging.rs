//! Logging Module
//!
//! `tracing` subscriber setup for the CLI and the inference server, and the
//! per-epoch progress lines written by the training loop.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use super::format_duration;

/// Verbosity accepted by `--log-level`, from most to least chatty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Parse a level name case-insensitively (`warning` is accepted for `warn`)
    ///
    /// Used directly as a clap `value_parser`.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }

    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber settings for one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Print the module path of every event
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::cli()
    }
}

impl LogConfig {
    /// Colored terminal output for the command line tool
    pub fn cli() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Plain output for the server, which usually logs to a journal or file
    pub fn server() -> Self {
        Self {
            ansi_colors: false,
            ..Self::cli()
        }
    }

    /// Set the level from `--log-level`
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Apply `--verbose`: at least debug level, with targets and thread ids
    pub fn verbose(mut self) -> Self {
        self.level = self.level.min(LogLevel::Debug);
        self.include_target = true;
        self.include_thread_ids = true;
        self
    }

    /// Combine the preset with the `--log-level` and `--verbose` flags
    pub fn from_flags(self, level: LogLevel, verbose: bool) -> Self {
        let config = self.with_level(level);
        if verbose {
            config.verbose()
        } else {
            config
        }
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    debug!("Logging at level {}", config.level);
    Ok(())
}

/// Per-epoch progress lines for the training loop
///
/// Epochs are passed 0-based and printed 1-based.
pub struct TrainingLogger {
    total_epochs: usize,
    current: usize,
    started: Instant,
    epoch_started: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            current: 0,
            started: now,
            epoch_started: now,
        }
    }

    pub fn start_epoch(&mut self, epoch: usize) {
        self.current = epoch;
        self.epoch_started = Instant::now();
        debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Epochs left after the current one
    pub fn remaining_epochs(&self) -> usize {
        self.total_epochs.saturating_sub(self.current + 1)
    }

    /// Estimated seconds left, from the mean epoch time so far
    pub fn eta_secs(&self) -> f64 {
        let mean = self.started.elapsed().as_secs_f64() / (self.current + 1) as f64;
        mean * self.remaining_epochs() as f64
    }

    /// Log the metrics of the epoch that just finished
    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, val_accuracy: Option<f64>) {
        let val = match val_accuracy {
            Some(acc) => format!("{:.2}%", acc),
            None => "n/a".to_string(),
        };

        info!(
            "Epoch {}/{} in {:.1}s | loss {:.4} | train {:.2}% | val {} | ETA {}",
            self.current + 1,
            self.total_epochs,
            self.epoch_started.elapsed().as_secs_f64(),
            train_loss,
            train_accuracy,
            val,
            format_duration(self.eta_secs())
        );
    }

    pub fn log_complete(&self, best_val_accuracy: Option<f64>) {
        let elapsed = format_duration(self.started.elapsed().as_secs_f64());
        match best_val_accuracy {
            Some(acc) => info!(
                "Training finished: {} epochs in {}, best validation accuracy {:.2}%",
                self.total_epochs, elapsed, acc
            ),
            None => info!(
                "Training finished: {} epochs in {} without a validation split",
                self.total_epochs, elapsed
            ),
        }
    }
}
