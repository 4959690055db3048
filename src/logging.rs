//! Logging setup for binaries and tests.
//!
//! The library itself only emits `tracing` events (breaker transitions, retry
//! backoff, `safe_execute` failures). This module installs a subscriber that
//! writes them to stderr, honouring `RUST_LOG` when it is set.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level used when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything, including per-call breaker bookkeeping
    Trace,
    /// Breaker rejections and non-retryable short-circuits
    Debug,
    /// Breaker transitions
    #[default]
    Info,
    /// Retries, fallbacks and opened breakers
    Warn,
    /// Only `safe_execute` failures
    Error,
    /// Nothing
    Off,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Level for a `-v` count, or `Error` when quiet.
    ///
    /// 0 = Warn, 1 = Info, 2 = Debug, 3+ = Trace
    pub fn from_flags(verbosity: u8, quiet: bool) -> Self {
        if quiet {
            return LogLevel::Error;
        }
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Configuration for the stderr subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is absent
    pub level: LogLevel,
    /// Whether to prefix lines with timestamps
    pub with_timestamps: bool,
    /// Whether to include the module path
    pub with_target: bool,
    /// Whether to include thread ids
    pub with_thread_ids: bool,
    /// Whether to include source file and line
    pub with_file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            with_timestamps: true,
            with_target: true,
            with_thread_ids: false,
            with_file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set whether to include timestamps.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    /// Set whether to include the target (module path).
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Set whether to include thread ids.
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Set whether to include source file and line number.
    pub fn with_file_line(mut self, enabled: bool) -> Self {
        self.with_file_line = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }
}

/// Install the stderr subscriber.
///
/// Returns `false` if a global subscriber was already installed, which
/// happens when several tests initialise logging in one process.
///
/// ```no_run
/// use steadfast::logging::{init_logging, LogLevel, LoggingConfig};
///
/// init_logging(LoggingConfig::new().with_level(LogLevel::Debug));
/// ```
pub fn init_logging(config: LoggingConfig) -> bool {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file_line)
        .with_line_number(config.with_file_line);

    let installed = if config.with_timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.is_ok()
}
