use anyhow::{Context, Result};
use bourbon_hunter::config::LoggingConfig;
use bourbon_hunter::models::{ScanScope, ScanStatus, Tier};
use bourbon_hunter::{AppConfig, BourbonHunter};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "bourbon-hunter", version, about = "Allocated bourbon inventory scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan and dispatch alerts for new finds
    Scan {
        /// Only scan the rarest tiers
        #[arg(long)]
        quick: bool,
        /// Highest tier included in a quick scan
        #[arg(long, requires = "quick", value_parser = clap::value_parser!(u8).range(1..=4))]
        tier: Option<u8>,
    },
    /// Search the catalog and show how listings match
    Search { term: String },
    /// Show recent new finds
    Finds {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show recent scan runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Send a sample alert on every enabled channel
    TestNotify,
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bourbon_hunter=info"));

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging);

    info!("Starting Bourbon Hunter...");
    let hunter = BourbonHunter::from_config(&config)
        .await
        .context("Failed to initialize")?;

    match cli.command {
        Command::Scan { quick, tier } => {
            let scope = if quick {
                let tier = Tier::new(tier.unwrap_or(2)).context("tier must be 1-4")?;
                ScanScope::Quick { tier }
            } else {
                ScanScope::Full
            };

            let run = hunter.run_scan(scope).await?;
            let s = &run.summary;
            println!(
                "{} {}: {}/{} entries, {} matched, {} errored, {} products, {} new finds",
                run.scope,
                run.status.as_str(),
                s.entries_processed,
                s.entries_total,
                s.entries_matched,
                s.entries_errored,
                s.products_found,
                s.new_finds
            );
            println!(
                "alerts: {} sent, {} failed, {} suppressed, {} misconfigured",
                s.alerts_sent, s.alerts_failed, s.alerts_suppressed, s.alerts_misconfigured
            );
            for failure in &s.failures {
                println!("  {}: {}", failure.entry_id, failure.message);
            }

            if run.status == ScanStatus::Failed {
                anyhow::bail!("scan failed: {}", run.error.unwrap_or_default());
            }
        }
        Command::Search { term } => {
            let hits = hunter.search(&term).await?;
            if hits.is_empty() {
                println!("No results for '{}'", term);
            }
            for hit in hits {
                let price = hit.listing.price.map(|p| format!("${:.2}", p)).unwrap_or_default();
                match (hit.result.entry(), hit.result.confidence()) {
                    (Some(entry), Some(confidence)) => println!(
                        "{:>10} {:<60} {:>9}  -> {} (tier {}, {})",
                        hit.listing.sku,
                        hit.listing.name,
                        price,
                        entry.name,
                        entry.tier,
                        confidence.as_str()
                    ),
                    _ => println!("{:>10} {:<60} {:>9}", hit.listing.sku, hit.listing.name, price),
                }
            }
        }
        Command::Finds { limit } => {
            for find in hunter.recent_finds(limit).await? {
                let name = find
                    .entry
                    .as_ref()
                    .map(|e| e.name.as_str())
                    .unwrap_or(find.snapshot.entry_id.as_str());
                println!(
                    "{}  {:<45} store #{:<6} qty {}",
                    find.snapshot.observed_at.format("%Y-%m-%d %H:%M"),
                    name,
                    find.snapshot.location_id,
                    find.snapshot.quantity
                );
            }
        }
        Command::History { limit } => {
            for run in hunter.scan_history(limit).await? {
                println!(
                    "{}  {:<18} {:<10} {} new finds, {} alerts sent",
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.scope.to_string(),
                    run.status.as_str(),
                    run.summary.new_finds,
                    run.summary.alerts_sent
                );
            }
        }
        Command::TestNotify => {
            let results = hunter.test_notifications().await;
            if results.is_empty() {
                println!("No notification channels enabled");
            }
            for (channel, result) in results {
                match result {
                    Ok(receipt) => println!("{}: ok ({})", channel, receipt.detail),
                    Err(e) => println!("{}: FAILED ({})", channel, e),
                }
            }
        }
    }

    info!("Shutting down...");
    Ok(())
}
