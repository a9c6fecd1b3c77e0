//! EventBatcher - batching event dispatcher
//!
//! A CLI tool that streams JSON-lines events into a batching dispatcher
//! which delivers them to an HTTP collector with retry and backoff.
//!
//! Exit codes:
//!   0 - Success (every batch delivered)
//!   1 - Runtime error (bad config, unreadable input, etc.)
//!   2 - At least one batch was dropped after exhausting retries

mod cli;
mod config;
mod dispatcher;
mod error;
mod input;
mod models;
mod report;
mod sink;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use dispatcher::{Dispatcher, DispatcherConfig, Notification};
use error::DispatchError;
use input::EventReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config comes first: its `verbose` setting decides the log level.
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose))?;

    info!("EventBatcher v{}", env!("CARGO_PKG_VERSION"));
    info!("Using config: {}", config_source);
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .eventbatcher.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", config::CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to set the endpoint, batch size and retry policy.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity settings.
fn init_logging(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Stream the input through a dispatcher. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let input_path = PathBuf::from(config.general.input.as_deref().unwrap_or("-"));
    let mut reader = EventReader::open(&input_path, args.strict).await?;

    if args.dry_run {
        return handle_dry_run(&mut reader).await;
    }

    let dispatcher_config = DispatcherConfig::from(&config.dispatcher);

    if !args.quiet {
        println!("📤 Delivering events to {}", dispatcher_config.endpoint);
        println!("   Batch size: {}", dispatcher_config.batch_size);
        println!("   Flush interval: {:?}", dispatcher_config.flush_interval);
        println!("   Attempts per batch: {}", dispatcher_config.retry_attempts);
    }

    let dispatcher = Dispatcher::connect(dispatcher_config).context("Failed to start dispatcher")?;
    let logger = spawn_notification_logger(dispatcher.subscribe());

    while let Some(record) = reader.next_record().await? {
        match dispatcher
            .record(record.event_type, record.subject_id, record.properties)
            .await
        {
            Ok(()) => {}
            Err(DispatchError::Delivery(e)) => warn!("Batch dropped: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    match dispatcher.flush().await {
        Ok(count) => debug!("Final flush delivered {} events", count),
        Err(DispatchError::Delivery(e)) => warn!("Batch dropped: {}", e),
        Err(e) => return Err(e.into()),
    }

    info!("Input exhausted, draining {} pending events", dispatcher.queue_len());
    if let Err(e) = dispatcher.shutdown().await {
        match e.as_delivery() {
            Some(delivery) => warn!("Shutdown drain stopped early: {}", delivery),
            None => return Err(e.into()),
        }
    }

    if let Some(ref path) = config.general.metrics_out {
        dispatcher
            .save_metrics(path)
            .with_context(|| format!("Failed to save metrics to {}", path))?;
    }

    let metrics = dispatcher.metrics();
    let undelivered = dispatcher.queue_len();
    drop(dispatcher);
    if let Err(e) = logger.await {
        debug!("Notification logger ended abnormally: {}", e);
    }

    let duration = start_time.elapsed().as_secs_f64();
    if !args.quiet {
        println!("\n📊 Delivery Summary:");
        println!("   Events accepted: {}", metrics.total_events);
        println!("   Batches delivered: {}", metrics.successful_flushes);
        println!("   Batches dropped: {}", metrics.failed_flushes);
        println!("   Average flush: {:.1}ms", metrics.average_flush_ms);
        if reader.skipped() > 0 {
            println!("   Skipped input lines: {}", reader.skipped());
        }
        if undelivered > 0 {
            println!("   Left undelivered: {}", undelivered);
        }
        println!("   Duration: {:.1}s", duration);
        if let Some(ref path) = config.general.metrics_out {
            println!("   Metrics saved to: {}", path);
        }
    }

    if metrics.failed_flushes > 0 {
        eprintln!(
            "\n⛔ {} batch(es) could not be delivered. Failing (exit code 2).",
            metrics.failed_flushes
        );
        return Ok(2);
    }

    if !args.quiet {
        println!("\n✅ All events delivered.");
    }
    Ok(0)
}

/// Handle --dry-run: parse the input, report what would be sent, exit.
async fn handle_dry_run(reader: &mut EventReader) -> Result<i32> {
    println!("\n🔍 Dry run: parsing input (nothing is sent)...\n");

    let mut count = 0usize;
    while let Some(record) = reader.next_record().await? {
        count += 1;
        debug!("{} for {}", record.event_type, record.subject_id);
    }

    println!("   Valid events: {}", count);
    println!("   Skipped lines: {}", reader.skipped());
    println!("\n✅ Dry run complete. No requests were made.");
    Ok(0)
}

/// Log dispatcher notifications until the dispatcher goes away.
fn spawn_notification_logger(mut rx: broadcast::Receiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(n @ Notification::EventRecorded { .. }) => trace!("{}", n),
                Ok(n) => debug!("{}", n),
                Err(RecvError::Lagged(missed)) => debug!("Missed {} notifications", missed),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Load configuration from file or use defaults. Runs before logging is
/// set up, so it returns a description of where the config came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, config::CONFIG_FILE.to_string())),
        Ok(None) => Ok((Config::default(), "defaults".to_string())),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}", config::CONFIG_FILE, e);
            Ok((Config::default(), "defaults".to_string()))
        }
    }
}
