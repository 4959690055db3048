use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use steadfast::config::ResilienceConfig;
use steadfast::logging::{init_logging, LogLevel, LoggingConfig};
use steadfast::retry::with_retry_using;
use steadfast::{ActionResult, RawError, DATABASE};

#[derive(Parser, Debug)]
#[command(name = "steadfast")]
#[command(version)]
#[command(about = "Classify failures and exercise retry and circuit-breaker policies")]
struct Cli {
    /// Suppress all log output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Include thread ids in log lines
    #[arg(long, global = true)]
    log_thread_ids: bool,

    /// Include source file and line number in log lines
    #[arg(long, global = true)]
    log_file_line: bool,

    /// Omit the module path from log lines
    #[arg(long, global = true)]
    log_no_target: bool,

    /// Path to a TOML configuration file
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a failure given as JSON (or plain text) and print the normalized error
    Classify {
        /// Failure description; reads stdin when omitted or "-"
        input: Option<String>,
    },

    /// Run scripted outcomes through the retry engine and a circuit breaker
    Simulate {
        /// Outcome of each successive attempt; attempts past the end succeed
        #[arg(long, value_enum, value_delimiter = ',', required = true)]
        outcomes: Vec<Outcome>,

        /// Breaker to route calls through
        #[arg(long, default_value = DATABASE)]
        dependency: String,

        /// Number of top-level calls to make
        #[arg(long, default_value = "1")]
        calls: u32,

        /// Total attempts per call (overrides configuration)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Delay before the first retry in milliseconds (overrides configuration)
        #[arg(long, value_name = "MS")]
        base_delay_ms: Option<u64>,

        /// Consecutive failures that open the breaker (overrides configuration)
        #[arg(long)]
        threshold: Option<u32>,

        /// Breaker cooldown in milliseconds (overrides configuration)
        #[arg(long, value_name = "MS")]
        cooldown_ms: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// A scripted attempt outcome for `simulate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Outcome {
    /// The attempt succeeds
    Ok,
    /// Unrecognized failure (not retryable)
    Fail,
    /// Request timeout (retryable)
    Timeout,
    /// Connection failure (retryable)
    Network,
    /// HTTP 401 (not retryable)
    Auth,
    /// HTTP 429 (retryable)
    RateLimit,
    /// Missing database row (not retryable)
    NotFound,
    /// Dropped database connection (retryable)
    Db,
}

impl Outcome {
    fn into_result(self) -> Result<&'static str, RawError> {
        match self {
            Outcome::Ok => Ok("ok"),
            Outcome::Fail => Err(RawError::message("simulated failure")),
            Outcome::Timeout => Err(RawError::Timeout("simulated timeout".to_string())),
            Outcome::Network => Err(RawError::FetchFailed("fetch failed".to_string())),
            Outcome::Auth => Err(RawError::Http {
                status: 401,
                message: "Unauthorized".to_string(),
            }),
            Outcome::RateLimit => Err(RawError::Http {
                status: 429,
                message: "Too Many Requests".to_string(),
            }),
            Outcome::NotFound => Err(RawError::database(
                "PGRST116",
                "The result contains 0 rows",
            )),
            Outcome::Db => Err(RawError::database(
                "57P01",
                "terminating connection due to administrator command",
            )),
        }
    }
}

/// Attempt outcomes consumed in order across all calls.
struct Script {
    outcomes: Mutex<VecDeque<Outcome>>,
    attempts: AtomicU32,
}

impl Script {
    fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            attempts: AtomicU32::new(0),
        }
    }

    fn next(&self) -> Result<&'static str, RawError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        outcome.unwrap_or(Outcome::Ok).into_result()
    }

    fn take_attempts(&self) -> u32 {
        self.attempts.swap(0, Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(
        LoggingConfig::new()
            .with_level(LogLevel::from_flags(cli.verbose, cli.quiet))
            .with_timestamps(false)
            .with_target(!cli.log_no_target)
            .with_thread_ids(cli.log_thread_ids)
            .with_file_line(cli.log_file_line),
    );

    let config = match &cli.config {
        Some(path) => ResilienceConfig::load(path),
        None => ResilienceConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    match cli.command {
        Commands::Classify { input } => run_classify(&config, input),
        Commands::Simulate {
            outcomes,
            dependency,
            calls,
            max_attempts,
            base_delay_ms,
            threshold,
            cooldown_ms,
        } => {
            let mut config = config;
            if let Some(max_attempts) = max_attempts {
                config.retry.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = base_delay_ms {
                config.retry.base_delay_ms = base_delay_ms;
            }
            let breaker = config.breakers.entry(dependency.clone()).or_default();
            if let Some(threshold) = threshold {
                breaker.failure_threshold = threshold;
            }
            if let Some(cooldown_ms) = cooldown_ms {
                breaker.cooldown_ms = cooldown_ms;
            }
            run_simulate(&config, &dependency, outcomes, calls).await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_classify(
    config: &ResilienceConfig,
    input: Option<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let text = match input.as_deref() {
        None | Some("-") => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        Some(text) => text.to_string(),
    };

    let raw = match serde_json::from_str::<Value>(&text) {
        Ok(value) => RawError::from_json(value),
        Err(_) => RawError::message(text.trim()),
    };

    let normalized = config.classifier().classify(raw);
    println!("{}", serde_json::to_string_pretty(&normalized)?);
    Ok(ExitCode::SUCCESS)
}

async fn run_simulate(
    config: &ResilienceConfig,
    dependency: &str,
    outcomes: Vec<Outcome>,
    calls: u32,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let classifier = config.classifier();
    let mut registry = config.registry();
    let breaker_config = config.breakers.get(dependency).cloned().unwrap_or_default();
    let breaker = registry.register(dependency, breaker_config);
    let script = Script::new(outcomes);

    let mut last_succeeded = true;
    for call in 1..=calls {
        let result: ActionResult<&str> = with_retry_using(
            &classifier,
            || breaker.execute(|| async { script.next() }),
            &config.retry,
        )
        .await
        .into();
        last_succeeded = result.is_success();

        let line = json!({
            "call": call,
            "attempts": script.take_attempts(),
            "result": serde_json::to_value(&result)?,
        });
        println!("{}", line);
    }

    println!("{}", json!({ "breaker": serde_json::to_value(breaker.state())? }));

    Ok(if last_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
