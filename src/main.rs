//! Record Broker - vinyl market snapshot daemon
//!
//! Keeps the cached Discogs and eBay price statistics fresh for every
//! release in the catalog. Runs continuously with periodic refresh
//! scheduling; the pricing and submission workflow lives in the library
//! crate and reads whatever this daemon has cached.

use clap::Parser;
use record_broker::api::{DiscogsClient, EbayClient};
use record_broker::ingest::{sync_market_snapshots, IngestOptions};
use record_broker::storage::sqlite::SqliteStorage;
use record_broker::tiers;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

/// Market snapshot daemon - caches provider price statistics in SQLite
#[derive(Parser, Debug)]
#[command(name = "record_broker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Run one refresh batch and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Refresh interval in hours when running continuously
    #[arg(long, default_value_t = 6)]
    interval_hours: u64,

    /// Re-fetch a source only when its snapshot is older than this many hours
    #[arg(long, default_value_t = 24)]
    snapshot_max_age_hours: i64,

    /// Fetch attempts per provider before a release is given up on
    #[arg(long, default_value_t = 3)]
    fetch_attempts: u32,

    /// Seconds to wait between fetch attempts
    #[arg(long, default_value_t = 5)]
    retry_delay_secs: u64,

    /// Override the Discogs API base URL
    #[arg(long)]
    discogs_base_url: Option<String>,

    /// Override the eBay Finding API base URL
    #[arg(long)]
    ebay_base_url: Option<String>,
}

/// Returns the default database path: ~/.local/share/record_broker/broker.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("record_broker")
        .join("broker.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting record_broker...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    // Open database and initialize schema
    let storage = match SqliteStorage::open(&db_path) {
        Ok(storage) => {
            log::info!("Opened database: {}", db_path.display());
            storage
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tiers::ensure_default_tiers(&storage) {
        log::error!("Failed to seed condition tiers: {}", e);
        std::process::exit(1);
    }

    let discogs_token = std::env::var("DISCOGS_TOKEN").ok();
    if discogs_token.is_none() {
        log::info!("No DISCOGS_TOKEN set, using unauthenticated Discogs requests");
    }
    let ebay_app_id = std::env::var("EBAY_APP_ID").ok();
    if ebay_app_id.is_none() {
        log::info!("No EBAY_APP_ID set, eBay requests go out without an app id");
    }

    let discogs = match args.discogs_base_url.clone() {
        Some(base) => DiscogsClient::with_base_url(base, discogs_token),
        None => DiscogsClient::new(discogs_token),
    };
    let ebay = match args.ebay_base_url.clone() {
        Some(base) => EbayClient::with_base_url(base, ebay_app_id),
        None => EbayClient::new(ebay_app_id),
    };

    let options = IngestOptions {
        snapshot_max_age_hours: args.snapshot_max_age_hours,
        fetch_attempts: args.fetch_attempts,
        retry_delay: Duration::from_secs(args.retry_delay_secs),
    };

    if args.once {
        // Run once and exit
        run_refresh(&storage, &discogs, &ebay, &options).await;
    } else {
        // Run continuously with interval checks
        log::info!(
            "Running in daemon mode, refreshing every {} hour(s)",
            args.interval_hours
        );
        run_daemon(&storage, &discogs, &ebay, &options, args.interval_hours).await;
    }
}

/// Run the refresh daemon; the first tick fires immediately.
async fn run_daemon(
    storage: &SqliteStorage,
    discogs: &DiscogsClient,
    ebay: &EbayClient,
    options: &IngestOptions,
    interval_hours: u64,
) {
    let mut ticker = interval(Duration::from_secs(interval_hours * 3600));
    loop {
        ticker.tick().await;
        log::info!("Scheduled refresh triggered");
        run_refresh(storage, discogs, ebay, options).await;
    }
}

/// Run a single refresh batch
async fn run_refresh(
    storage: &SqliteStorage,
    discogs: &DiscogsClient,
    ebay: &EbayClient,
    options: &IngestOptions,
) {
    match sync_market_snapshots(storage, discogs, ebay, options).await {
        Ok(stats) => {
            if stats.failed > 0 {
                log::warn!("Refresh finished with {} failed release(s)", stats.failed);
            }
        }
        Err(e) => {
            log::error!("Snapshot refresh batch failed: {}", e);
        }
    }
}
