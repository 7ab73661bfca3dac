use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::differ::Differ;
use crate::metrics;
use crate::models::{NotificationDecision, NotificationLog, Observation, Product, SkipReason};
use crate::plugins::traits::Notifier;
use crate::scraper::ProductFetcher;
use crate::store::Store;
use crate::utils::error::{FetchErrorKind, StoreError};

/// What happened to one product during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProductOutcome {
    /// Observation stored; no alert was due.
    Recorded { reason: SkipReason },
    Notified { channel: &'static str },
    FetchFailed { kind: FetchErrorKind, message: String },
    /// The price changed but delivery failed. The observation is stored.
    NotifyFailed { message: String },
    StorageFailed { message: String },
}

impl ProductOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProductOutcome::Recorded { .. } => "recorded",
            ProductOutcome::Notified { .. } => "notified",
            ProductOutcome::FetchFailed { .. } => "fetch_failed",
            ProductOutcome::NotifyFailed { .. } => "notify_failed",
            ProductOutcome::StorageFailed { .. } => "storage_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, ProductOutcome::Recorded { .. } | ProductOutcome::Notified { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductReport {
    pub product_id: String,
    pub url: String,
    pub outcome: ProductOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub products: Vec<ProductReport>,
}

impl CycleReport {
    pub fn notified(&self) -> usize {
        self.count(|o| matches!(o, ProductOutcome::Notified { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(ProductOutcome::is_failure)
    }

    fn count(&self, predicate: impl Fn(&ProductOutcome) -> bool) -> usize {
        self.products.iter().filter(|p| predicate(&p.outcome)).count()
    }
}

/// Runs the fetch, store, diff and notify pipeline over every tracked product.
pub struct Tracker {
    fetcher: Arc<dyn ProductFetcher>,
    differ: Differ,
    notifier: Arc<dyn Notifier>,
    delay_between_products: Duration,
}

impl Tracker {
    pub fn new(fetcher: Arc<dyn ProductFetcher>, differ: Differ, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            fetcher,
            differ,
            notifier,
            delay_between_products: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_between_products = delay;
        self
    }

    /// One pass over all products in registration order. Per-product failures
    /// are reported, not returned; only failing to list products is an error.
    pub async fn run_cycle(&self, store: &Store) -> Result<CycleReport, StoreError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let products = store.list_products().await?;
        info!("Starting run cycle over {} product(s)", products.len());

        let mut reports = Vec::with_capacity(products.len());
        for (index, product) in products.iter().enumerate() {
            if index > 0 && !self.delay_between_products.is_zero() {
                tokio::time::sleep(self.delay_between_products).await;
            }

            let outcome = self.process(store, product).await;
            metrics::record_product_outcome(outcome.label());
            reports.push(ProductReport {
                product_id: product.id.clone(),
                url: product.url.clone(),
                outcome,
            });
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            products: reports,
        };
        metrics::record_cycle(timer.elapsed());
        info!(
            products = report.products.len(),
            notified = report.notified(),
            failed = report.failed(),
            "Run cycle finished in {:?}",
            timer.elapsed()
        );
        Ok(report)
    }

    async fn process(&self, store: &Store, product: &Product) -> ProductOutcome {
        let scraped = match self.fetcher.fetch(product).await {
            Ok(scraped) => scraped,
            Err(fetch_error) => {
                warn!(
                    product_id = %product.id,
                    url = %product.url,
                    error_kind = %fetch_error.kind(),
                    attempts = fetch_error.attempts(),
                    "Fetch failed: {}",
                    fetch_error
                );
                let observation = Observation::failure(&product.id, &fetch_error, Utc::now());
                if let Err(e) = store.append(&observation).await {
                    return self.storage_failed(product, e);
                }
                return ProductOutcome::FetchFailed {
                    kind: fetch_error.kind(),
                    message: fetch_error.to_string(),
                };
            }
        };

        let observation = Observation::success(&product.id, scraped, Utc::now());
        if let Err(e) = store.append(&observation).await {
            return self.storage_failed(product, e);
        }

        let decision = match self.differ.evaluate(store, product, &observation).await {
            Ok(decision) => decision,
            Err(e) => return self.storage_failed(product, e),
        };

        let change = match decision {
            NotificationDecision::RecordOnly(reason) => return ProductOutcome::Recorded { reason },
            NotificationDecision::Notify(change) => change,
        };

        let channel = self.notifier.channel();
        let (outcome, log) = match self.notifier.notify(&change).await {
            Ok(()) => {
                info!(
                    product_id = %product.id,
                    channel,
                    "Notified {} change {}",
                    change.direction.as_str(),
                    change.formatted_delta()
                );
                (ProductOutcome::Notified { channel }, NotificationLog::sent(&change, channel))
            }
            Err(notify_error) => {
                error!(
                    product_id = %product.id,
                    url = %product.url,
                    channel,
                    "Notification failed: {}",
                    notify_error
                );
                (
                    ProductOutcome::NotifyFailed {
                        message: notify_error.to_string(),
                    },
                    NotificationLog::failed(&change, channel, &notify_error),
                )
            }
        };
        metrics::record_notification(channel, log.status.as_str());

        if let Err(e) = store.record_notification(&log).await {
            // The alert itself went out (or failed) already; only the log entry is lost.
            warn!(product_id = %product.id, "Failed to record notification: {}", e);
        }
        outcome
    }

    fn storage_failed(&self, product: &Product, error: StoreError) -> ProductOutcome {
        error!(
            product_id = %product.id,
            url = %product.url,
            "Storage failed: {}",
            error
        );
        ProductOutcome::StorageFailed {
            message: error.to_string(),
        }
    }
}
