// Integration tests for PriceSage
//
// These exercise the fetcher against a local HTTP server and run whole
// cycles against an on-disk database.

mod integration;

use integration::*;
use pricesage::config::AppConfig;
use pricesage::scheduler::RunScheduler;
use pricesage::{Differ, Tracker};
use std::sync::Arc;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scheduled_tick_uses_configured_database() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("prices.db").display());
    config.scraper = get_test_scraper_config();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kettle"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Kettle", "1499", "INR")))
        .expect(2)
        .mount(&server)
        .await;

    let store = pricesage::Store::open(&config.database).await?;
    let product = track(&store, &server, "Kettle", "/kettle", pricesage::models::Site::Generic).await?;
    store.close().await;

    let fetcher = pricesage::scraper::Fetcher::new(config.scraper.clone())?;
    let tracker = Arc::new(Tracker::new(
        Arc::new(fetcher),
        Differ::default(),
        Arc::new(RecordingNotifier::default()),
    ));
    let running = Arc::new(Mutex::new(()));

    for _ in 0..2 {
        let report = RunScheduler::tick(Arc::clone(&tracker), config.database.clone(), Arc::clone(&running))
            .await
            .expect("tick runs a cycle");
        assert_eq!(report.products.len(), 1);
        assert_eq!(report.failed(), 0);
    }

    let store = pricesage::Store::open(&config.database).await?;
    let history = store.history(&product.id, chrono::Duration::hours(1)).collect().await?;
    assert_eq!(history.len(), 2);
    Ok(())
}

#[test]
fn test_default_configuration_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.products.is_empty());
    assert!(!config.email.enabled);
}

#[test]
fn test_shipped_default_file_loads() -> anyhow::Result<()> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let config = AppConfig::load(Some(&path))?;
    assert_eq!(config.scheduler.runs_per_day, 6);
    assert_eq!(config.scraper.default_currency, "INR");
    Ok(())
}
