//! Listing crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use estate_crawler::{
    error::Result,
    models::{Config, Observation},
    pipeline,
    services::{DetailExtractor, HttpFetcher},
    storage::{ListingStore, SqliteStore},
};

/// Incremental real-estate listing crawler
#[derive(Parser, Debug)]
#[command(
    name = "estate-crawler",
    version,
    about = "Tracks new listings and price changes on a real-estate classifieds site"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// SQLite database (overrides storage.database_path)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one incremental crawl (default)
    Crawl,

    /// Fetch and extract one detail page without storing it
    Inspect {
        /// Detail page URL
        url: String,
    },

    /// Move the run watermark back so the next crawl re-examines that window
    Rewind {
        #[arg(long, default_value_t = 3)]
        hours: u32,
    },

    /// Show watermark and listing counts
    Info,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command.unwrap_or(Command::Crawl) {
        Command::Crawl => {
            config.validate()?;
            let store = SqliteStore::open(&config.storage.database_path)?;
            let fetcher = HttpFetcher::new(&config.crawler)?;

            pipeline::run_crawler(&config, &fetcher, store).await?;
            log::info!("Crawl complete!");
        }

        Command::Inspect { url } => {
            let fetcher = HttpFetcher::new(&config.crawler)?;
            match pipeline::inspect_listing(&config, &fetcher, &url).await? {
                Observation::Listing(listing) => {
                    println!("{}", serde_json::to_string_pretty(&listing)?);
                }
                Observation::Expired(signal) => {
                    log::info!("Listing {} is no longer online ({})", signal.item_id, signal.url);
                }
                Observation::StillListed { .. } => {}
            }
        }

        Command::Rewind { hours } => {
            let store = SqliteStore::open(&config.storage.database_path)?;
            let (old, new) = pipeline::rewind(&store, hours)?;
            log::info!("Old timestamp: {}", old.format("%Y-%m-%d %H:%M:%S"));
            log::info!("New timestamp: {}", new.format("%Y-%m-%d %H:%M:%S"));
        }

        Command::Info => {
            let store = SqliteStore::open(&config.storage.database_path)?;
            let summary = store.summary()?;
            let cutoff = Utc::now() - TimeDelta::days(i64::from(config.expiry.recheck_after_days));
            let due = store.due_for_expiration(cutoff)?;

            log::info!("Database: {}", config.storage.database_path.display());
            log::info!(
                "Last run: {}",
                store.read_watermark()?.format("%Y-%m-%d %H:%M:%S")
            );
            log::info!(
                "Listings: {} ({} active, {} expired)",
                summary.listings,
                summary.active,
                summary.expired
            );
            log::info!("Due for expiry check: {}", due.len());
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            DetailExtractor::from_config(&config)?;
            log::info!(
                "✓ Config OK ({} categories, selectors compile)",
                config.site.categories.len()
            );
        }
    }

    Ok(())
}
