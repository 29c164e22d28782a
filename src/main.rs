use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, info};

use keybucket::config::{KeybucketConfig, LogFormat};
use keybucket::{BucketStore, LeakScheduler, TakeOutcome, TokenBucketStore};

/// In-process leaky token bucket rate limiter.
#[derive(Parser, Debug)]
#[command(name = "keybucket", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `keybucket=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read keys from stdin and print one JSON decision per line
    Run,
    /// Fire synthetic takes at random keys and print a summary
    Simulate {
        /// Number of distinct keys
        #[arg(long, default_value_t = 100)]
        keys: usize,
        /// Total number of takes
        #[arg(long, default_value_t = 10_000)]
        requests: usize,
        /// Number of worker threads
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct Decision<'a> {
    key: &'a str,
    #[serde(flatten)]
    outcome: TakeOutcome,
}

#[derive(Serialize)]
struct SimulationSummary {
    requests: usize,
    allowed: usize,
    denied: usize,
    tracked_keys: usize,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        KeybucketConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    setup_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting keybucket");
    info!(
        rate = config.limiter.rate,
        window_ms = config.limiter.window_ms,
        max_keys = config.limiter.max_keys,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await?,
        Command::Simulate {
            keys,
            requests,
            workers,
        } => simulate(&config, keys, requests, workers).await?,
        Command::Config => print!("{}", config.to_yaml()?),
    }

    info!("keybucket stopped");
    Ok(())
}

/// Install the tracing subscriber. Logs go to stderr so stdout stays
/// machine-readable.
fn setup_logging(config: &KeybucketConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true);

    match config.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

fn build_store(config: &KeybucketConfig) -> anyhow::Result<Arc<BucketStore>> {
    let rate = config.limiter.rate().context("Invalid limiter configuration")?;
    let store = BucketStore::with_max_keys(rate, config.limiter.max_keys)
        .context("Invalid limiter configuration")?;
    Ok(Arc::new(store))
}

async fn run(config: &KeybucketConfig) -> anyhow::Result<()> {
    let store = build_store(config)?;
    let leak = LeakScheduler::start(Arc::clone(&store))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                let key = line.trim();
                if key.is_empty() {
                    continue;
                }

                let outcome = store.take(key)?;
                let mut out = serde_json::to_vec(&Decision { key, outcome })?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
            }
            _ = &mut shutdown => break,
        }
    }

    stdout.flush().await?;
    leak.shutdown().await;
    Ok(())
}

async fn simulate(
    config: &KeybucketConfig,
    keys: usize,
    requests: usize,
    workers: usize,
) -> anyhow::Result<()> {
    if keys == 0 || workers == 0 {
        bail!("--keys and --workers must be at least 1");
    }

    let store = build_store(config)?;
    let leak = LeakScheduler::start(Arc::clone(&store))?;
    let started = Instant::now();

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let store: Arc<dyn TokenBucketStore> = store.clone();
        let share = requests / workers + usize::from(worker < requests % workers);

        tasks.spawn_blocking(move || -> keybucket::Result<usize> {
            let mut rng = rand::thread_rng();
            let mut allowed = 0;
            for _ in 0..share {
                let key = format!("key-{}", rng.gen_range(0..keys));
                if store.take(&key)?.allowed {
                    allowed += 1;
                }
            }
            Ok(allowed)
        });
    }

    let mut allowed = 0;
    while let Some(result) = tasks.join_next().await {
        allowed += result.context("Simulation worker panicked")??;
    }

    let summary = SimulationSummary {
        requests,
        allowed,
        denied: requests - allowed,
        tracked_keys: store.len(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    leak.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
