use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use slotwatch::booking::{BookingEngine, resolve_request};
use slotwatch::daemon::{Daemon, KeepAlive};
use slotwatch::domain::Outcome;
use slotwatch::notify::{LogNotifier, Notifier, RelayNotifier};
use slotwatch::portal::{LuxmedPortal, PortalClient};
use slotwatch::scheduler::WatchScheduler;
use slotwatch::store::RequestStore;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::{Config, NotifierKind};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("slotwatch.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    Ok(match config.notifier.kind {
        NotifierKind::Log => Arc::new(LogNotifier::new()),
        NotifierKind::Relay => Arc::new(RelayNotifier::new(config.relay()).context("Failed to create relay notifier")?),
    })
}

fn build_engine(config: &Config, notifier: Arc<dyn Notifier>) -> BookingEngine {
    BookingEngine::new(notifier)
        .with_rule(config.auto_book_rule())
        .with_window(config.search_window())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None | Some(Commands::Run) => run_daemon(config).await,
        Some(Commands::Check { service }) => run_check(config, service.as_deref()).await,
    }
}

async fn run_daemon(config: &Config) -> Result<()> {
    let portal: Arc<dyn PortalClient> =
        Arc::new(LuxmedPortal::new(config.luxmed()).context("Failed to create portal client")?);
    let notifier = build_notifier(config)?;
    let store = Arc::new(RequestStore::new());
    let scheduler = WatchScheduler::new(store.clone(), notifier.clone(), config.scheduler());
    let engine = Arc::new(build_engine(config, notifier));
    let daemon = Daemon::new(config.tick(), store, scheduler, portal, engine);

    for request in &config.requests {
        match daemon.submit(request.to_new_request()).await {
            Ok(accepted) => println!("{} {} ({})", "Watching:".green(), accepted.service, accepted.id),
            Err(e) => {
                log::error!("Rejected request for {}: {}", request.service, e);
                println!("{} {}: {}", "Rejected:".red(), request.service, e);
            }
        }
    }

    let keep_alive_cancel = CancellationToken::new();
    let keep_alive = match &config.keep_alive {
        Some(ka) => Some(
            KeepAlive::new(&ka.url, Duration::from_secs(ka.interval_secs), config.luxmed().timeout)
                .context("Failed to create keep-alive")?
                .spawn(keep_alive_cancel.clone()),
        ),
        None => None,
    };

    println!("{}", "Slotwatch running, press Ctrl-C to stop".cyan());
    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    keep_alive_cancel.cancel();
    if let Some(handle) = keep_alive {
        handle.await.context("Keep-alive task failed")?;
    }
    Ok(())
}

async fn run_check(config: &Config, service: Option<&str>) -> Result<()> {
    let portal = LuxmedPortal::new(config.luxmed()).context("Failed to create portal client")?;
    let engine = build_engine(config, Arc::new(LogNotifier::new()));
    let cancel = CancellationToken::new();

    let selected = config
        .requests
        .iter()
        .filter(|r| service.is_none_or(|s| r.service.eq_ignore_ascii_case(s)));

    for request in selected {
        let mut new = request.to_new_request();
        new.auto_book = false;

        let result = async {
            let session = portal.login(&new.credentials).await?;
            let resolved = resolve_request(session.as_ref(), new).await?;
            engine.evaluate(session.as_ref(), &resolved, &cancel).await
        }
        .await;

        match result {
            Ok(outcome @ (Outcome::EmailSent | Outcome::BookOnBehalfFailedEmailSent | Outcome::BookedOnBehalf)) => {
                println!("{} {}: {}", "Available:".green(), request.service, outcome)
            }
            Ok(outcome) => println!("{} {}: {}", "Waiting:".yellow(), request.service, outcome),
            Err(e) => println!("{} {}: {}", "Error:".red(), request.service, e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
