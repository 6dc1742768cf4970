use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod aggregator;
mod analysis;
mod catalog;
mod config;
mod error;
mod models;
mod normalizer;
mod rarity;
mod report;
mod scraper;
mod scrapers;
mod store;
mod traits;
mod tradeup;
mod tradeup_trends;

use config::{AppConfig, DEFAULT_CONFIG_PATH};
use tradeup_trends::TradeUpTrends;

const DEFAULT_WATCH_SCHEDULE: &str = "0 */30 * * * *";

/// Scrape the Steam Community Market and rank CS2 trade-up contracts
#[derive(Parser)]
#[command(name = "tradeup-trends", version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "TRADEUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the known item categories
    Categories,
    /// Scrape every page of a category and store its listings
    Scrape { key: String },
    /// Summarize prices and wear of a category
    Market {
        key: String,
        /// Scrape again instead of using stored listings
        #[arg(long)]
        refresh: bool,
    },
    /// Rank profitable trade-up contracts for a category
    TradeUp {
        key: String,
        #[arg(long)]
        refresh: bool,
        /// Number of contracts to show
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Print contract summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-scrape and re-rank a category on a cron schedule
    Watch {
        key: String,
        #[arg(long, default_value = DEFAULT_WATCH_SCHEDULE)]
        schedule: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config);
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config.with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let app = TradeUpTrends::new(config)?;

    match cli.command {
        Command::Categories => report::print_categories(app.catalog()),
        Command::Scrape { key } => run_scrape(&app, key).await?,
        Command::Market { key, refresh } => {
            let listings = app.listings(&key, refresh, &cancel_on_ctrl_c()).await?;
            match analysis::summarize(&listings) {
                Some(summary) => {
                    let window = app.price_window();
                    let in_range = analysis::count_in_range(&listings, window.0, window.1);
                    report::print_market_summary(&app.category(&key)?.display_name, &summary, in_range, window);
                }
                None => println!("No listings stored for {}", key),
            }
        }
        Command::TradeUp {
            key,
            refresh,
            top,
            json,
        } => {
            let listings = app.listings(&key, refresh, &cancel_on_ctrl_c()).await?;
            info!("Searching trade-ups over {} listing(s)", listings.len());
            let contracts = app.find_trade_ups(listings).await?;
            if json {
                println!("{}", report::contracts_json(&contracts, top)?);
            } else {
                report::print_contracts(&contracts, top);
            }
        }
        Command::Watch { key, schedule } => run_watch(app, key, schedule).await?,
    }

    Ok(())
}

/// Scrape on a background task and log its progress events as they arrive.
async fn run_scrape(app: &TradeUpTrends, key: String) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = {
        let app = app.clone();
        let key = key.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { app.scrape(&key, Some(tx), &cancel).await })
    };

    while let Some(event) = rx.recv().await {
        report::log_event(&event);
    }

    let listings = task.await.context("Scrape task panicked")??;
    println!("Scraped {} listing(s) for {}", listings.len(), key);
    Ok(())
}

async fn run_watch(app: TradeUpTrends, key: String, schedule: String) -> Result<()> {
    app.category(&key)?;
    let cancel = CancellationToken::new();

    info!("Starting TradeUp Trends watch for {}", key);

    // Run once immediately
    if let Err(e) = app.check_category(&key, &cancel).await {
        error!("Error during initial check: {:#}", e);
    }

    let mut sched = JobScheduler::new().await?;

    let job_app = app.clone();
    let job_key = key.clone();
    let job_cancel = cancel.clone();
    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let app = job_app.clone();
            let key = job_key.clone();
            let cancel = job_cancel.clone();
            Box::pin(async move {
                if let Err(e) = app.check_category(&key, &cancel).await {
                    error!("Error checking {}: {:#}", key, e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started ({})", schedule);
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    warn!("Interrupted, stopping scheduler");
    cancel.cancel();
    sched.shutdown().await?;
    Ok(())
}

/// Token cancelled by the first Ctrl-C; scrapes stop before the next page.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the scrape");
            token.cancel();
        }
    });
    cancel
}
