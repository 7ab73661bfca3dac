// Shared helpers for the integration tests: a throwaway on-disk store, a
// scraper config with millisecond backoff and a notifier that records what
// it was asked to send.

pub mod fetcher_tests;
pub mod pipeline_tests;
pub mod store_tests;

use async_trait::async_trait;
use pricesage::config::ScraperConfig;
use pricesage::models::{NewProduct, PriceChange, Product, Site};
use pricesage::plugins::Notifier;
use pricesage::store::Store;
use pricesage::utils::error::NotifyError;
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::MockServer;

/// Scraper settings for tests: three attempts, tiny delays.
pub fn get_test_scraper_config() -> ScraperConfig {
    ScraperConfig {
        request_timeout: 5,
        connect_timeout: 2,
        max_attempts: 3,
        backoff_base_ms: 2,
        max_backoff_ms: 10,
        delay_between_products_ms: 0,
        referer: None,
        ..ScraperConfig::default()
    }
}

/// A store backed by a SQLite file in a temporary directory. Keep the
/// directory alive for as long as the store is used.
pub async fn create_test_store() -> anyhow::Result<(TempDir, Store)> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("prices.db").display());
    let store = Store::connect(&url).await?;
    Ok((dir, store))
}

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path, e))
}

/// The generic product fixture with its placeholders filled in.
pub fn product_page(title: &str, price: &str, currency: &str) -> String {
    fixture("generic_product.html")
        .replace("{title}", title)
        .replace("{price}", price)
        .replace("{currency}", currency)
}

/// Register a product served by the mock server at `path`.
pub async fn track(store: &Store, server: &MockServer, name: &str, path: &str, site: Site) -> anyhow::Result<Product> {
    let mut new_product = NewProduct::new(name, format!("{}{}", server.uri(), path));
    new_product.site = Some(site);
    Ok(store.register_product(new_product).await?)
}

/// Records every change it is handed; optionally fails delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<PriceChange>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<PriceChange> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, change: &PriceChange) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(change.clone());
        if self.fail {
            return Err(NotifyError::Config("delivery disabled in test".to_string()));
        }
        Ok(())
    }
}
