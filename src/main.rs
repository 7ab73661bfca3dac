use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pricesage::config::{AppConfig, LoggingConfig};
use pricesage::models::{NewProduct, Product};
use pricesage::plugins::Notifier;
use pricesage::plugins::notifiers::{EmailNotifier, LogNotifier};
use pricesage::scheduler::RunScheduler;
use pricesage::scraper::Fetcher;
use pricesage::{AppError, Differ, NotificationPolicy, Store, Tracker, metrics};

/// Upper bound for `--days` and `--minutes`, about a century.
const MAX_WINDOW_DAYS: i64 = 36_500;

/// PriceSage - track product prices and get alerted when they move
#[derive(Parser, Debug)]
#[command(name = "pricesage", version, about)]
struct Cli {
    /// Extra configuration file, layered over config/default and config/local
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single cycle over all tracked products
    Run,

    /// Run cycles on the configured schedule until interrupted
    Watch,

    /// Start tracking a product
    Add {
        name: String,
        url: String,

        /// Price you are waiting for; shown in alerts
        #[arg(long)]
        target_price: Option<Decimal>,

        /// Do not alert when the price goes up
        #[arg(long)]
        no_increase_alerts: bool,

        /// Do not alert when the price goes down
        #[arg(long)]
        no_decrease_alerts: bool,
    },

    /// List tracked products with their latest price
    List,

    /// Show observations for a product (id or URL)
    History {
        product: String,

        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS))]
        days: i64,
    },

    /// Show price changes across all products
    Changes {
        #[arg(long, default_value_t = 1440, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS * 24 * 60))]
        minutes: i64,
    },
}

fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).context("invalid logging level")?,
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn sync_configured_products(store: &Store, config: &AppConfig) {
    for product in &config.products {
        match store.register_product(NewProduct::from(product)).await {
            Ok(registered) => info!(product_id = %registered.id, url = %registered.url, "Tracking {}", registered.name),
            Err(e) => warn!(url = %product.url, "Skipping configured product: {}", e),
        }
    }
}

fn build_tracker(config: &AppConfig) -> Result<Tracker> {
    let fetcher = Fetcher::new(config.scraper.clone())?;
    let differ = Differ::new(NotificationPolicy::from(&config.notifications));
    let notifier: Arc<dyn Notifier> = if config.email.enabled {
        Arc::new(EmailNotifier::new(&config.email)?)
    } else {
        info!("Email disabled, alerts go to the log");
        Arc::new(LogNotifier)
    };

    Ok(Tracker::new(Arc::new(fetcher), differ, notifier).with_delay(config.scraper.delay_between_products()))
}

async fn resolve_product(store: &Store, key: &str) -> Result<Product> {
    if let Some(product) = store.get_product(key).await? {
        return Ok(product);
    }
    if let Ok(Some(product)) = store.find_product_by_url(key).await {
        return Ok(product);
    }
    Err(AppError::NotFound {
        resource: format!("product '{}'", key),
    }
    .into())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_logging(&config.logging)?;
    metrics::init(&config.metrics).context("failed to start metrics exporter")?;

    info!("Starting PriceSage {}", env!("CARGO_PKG_VERSION"));

    let store = Store::open(&config.database).await?;
    sync_configured_products(&store, &config).await;

    match cli.command {
        Command::Run => {
            let tracker = build_tracker(&config)?;
            let report = tracker.run_cycle(&store).await?;
            for product in &report.products {
                println!("{:<36}  {:<14}  {}", product.product_id, product.outcome.label(), product.url);
            }
            println!(
                "{} product(s), {} notified, {} failed",
                report.products.len(),
                report.notified(),
                report.failed()
            );
            store.close().await;
        }
        Command::Watch => {
            // Each tick opens its own store.
            store.close().await;
            let tracker = Arc::new(build_tracker(&config)?);
            let mut scheduler =
                RunScheduler::new(tracker, config.database.clone(), config.scheduler.clone()).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
        Command::Add {
            name,
            url,
            target_price,
            no_increase_alerts,
            no_decrease_alerts,
        } => {
            let mut new_product = NewProduct::new(name, url);
            new_product.target_price = target_price;
            new_product.alert_on_increase = !no_increase_alerts;
            new_product.alert_on_decrease = !no_decrease_alerts;

            let product = store.register_product(new_product).await?;
            println!("Tracking {} ({}) as {}", product.name, product.site, product.id);
            store.close().await;
        }
        Command::List => {
            for product in store.list_products().await? {
                let latest = store
                    .latest(&product.id)
                    .await?
                    .and_then(|o| o.price.map(|p| p.to_string()))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<36}  {:<9}  {:>16}  {}", product.id, product.site.as_str(), latest, product.display_title());
            }
            store.close().await;
        }
        Command::History { product, days } => {
            let product = resolve_product(&store, &product).await?;
            println!("{} ({})", product.display_title(), product.url);

            let history = store.history(&product.id, ChronoDuration::days(days));
            let mut observations = history.stream();
            while let Some(observation) = observations.next().await {
                let observation = observation?;
                let detail = match (&observation.price, &observation.error) {
                    (Some(price), _) => price.to_string(),
                    (None, Some(error)) => format!("failed: {}", error),
                    (None, None) => "failed".to_string(),
                };
                println!("{}  {}", observation.observed_at.format("%Y-%m-%d %H:%M"), detail);
            }
            store.close().await;
        }
        Command::Changes { minutes } => {
            for change in store.changes_since(ChronoDuration::minutes(minutes)).await? {
                println!(
                    "{}  {:<8}  {} -> {}  {}  {}",
                    change.observed_at.format("%Y-%m-%d %H:%M"),
                    change.direction.as_str(),
                    change.formatted_old(),
                    change.formatted_new(),
                    change.formatted_delta(),
                    change.title
                );
            }
            store.close().await;
        }
    }

    Ok(())
}
