mod config;
mod models;
mod pipeline;
mod scraper;
mod sink;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::pipeline::{SyncPipeline, SyncSummary};
use crate::sink::RestSink;

#[derive(Parser)]
#[command(name = "fightstats-etl", about = "Fight-event statistics ingestion pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the full events index and upsert event rows
    SyncEvents,

    /// Sync cards + results for the last N completed events
    SyncHistory {
        /// How many completed events to sync (default from config)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Sync the card of the nearest upcoming event
    SyncNext,

    /// Show datastore row counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "fightstats_etl=info,warn",
        1 => "fightstats_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::SyncEvents => {
            let _t = utils::Timer::start("Events sync");
            let summary = SyncPipeline::new(&config)?.sync_events().await?;
            print_summary("sync-events", &summary);
        }

        Command::SyncHistory { count } => {
            let count = count.unwrap_or(config.sync.history_count);
            let _t = utils::Timer::start("Historical sync");
            info!("Target: last {} completed events", count);
            let summary = SyncPipeline::new(&config)?.sync_history(count).await?;
            print_summary("sync-history", &summary);
        }

        Command::SyncNext => {
            let _t = utils::Timer::start("Next-event sync");
            let summary = SyncPipeline::new(&config)?.sync_next().await?;
            print_summary("sync-next", &summary);
        }

        Command::Stats => {
            let sink = RestSink::new(&config.datastore)?;
            let events = sink.count("events").await?;
            let bouts = sink.count("bouts").await?;
            let results = sink.count("results").await?;
            println!("─────────────────────────────────");
            println!("  fightstats-etl — Datastore");
            println!("─────────────────────────────────");
            println!("  Events  : {}", utils::fmt_number(events as i64));
            println!("  Bouts   : {}", utils::fmt_number(bouts as i64));
            println!("  Results : {}", utils::fmt_number(results as i64));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}

fn print_summary(mode: &str, summary: &SyncSummary) {
    println!("─────────────────────────────────────────────────");
    println!("  fightstats-etl — {} summary", mode);
    println!("─────────────────────────────────────────────────");
    println!("  Events  : {}", summary.events);
    println!("  Bouts   : {}", summary.bouts);
    println!("  Results : {}", summary.results);
    println!("─────────────────────────────────────────────────");
}
