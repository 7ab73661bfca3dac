use super::*;
use chrono::Duration;
use pricesage::differ::{Differ, NotificationPolicy};
use pricesage::models::{Direction, NotificationStatus, SkipReason};
use pricesage::scraper::Fetcher;
use pricesage::tracker::{ProductOutcome, Tracker};
use pricesage::utils::error::FetchErrorKind;
use rust_decimal::Decimal;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

async fn serve_price(server: &MockServer, route: &str, title: &str, price: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page(title, price, "INR")))
        .mount(server)
        .await;
}

async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn tracker(notifier: Arc<RecordingNotifier>, policy: NotificationPolicy) -> anyhow::Result<Tracker> {
    let fetcher = Fetcher::new(get_test_scraper_config())?;
    Ok(Tracker::new(Arc::new(fetcher), Differ::new(policy), notifier))
}

#[tokio::test]
async fn test_failing_product_does_not_stop_the_cycle() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let server = MockServer::start().await;
    let broken = track(&store, &server, "Broken", "/broken", Site::Generic).await?;
    let kettle = track(&store, &server, "Kettle", "/kettle", Site::Generic).await?;

    serve_status(&server, "/broken", 500).await;
    serve_price(&server, "/kettle", "Electric Kettle", "1000").await;

    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(Arc::clone(&notifier), NotificationPolicy::default())?;

    let report = tracker.run_cycle(&store).await?;
    assert_eq!(report.products.len(), 2);
    assert_eq!(report.products[0].product_id, broken.id);
    assert!(matches!(
        report.products[0].outcome,
        ProductOutcome::FetchFailed {
            kind: FetchErrorKind::Network,
            ..
        }
    ));
    assert_eq!(report.products[1].product_id, kettle.id);
    assert_eq!(
        report.products[1].outcome,
        ProductOutcome::Recorded {
            reason: SkipReason::FirstObservation
        }
    );
    assert_eq!(report.failed(), 1);
    assert!(notifier.sent().is_empty());

    // Failed fetches leave no priced observation behind.
    assert!(store.latest(&broken.id).await?.is_none());
    let broken_history = store.history(&broken.id, Duration::hours(1)).collect().await?;
    assert_eq!(broken_history.len(), 1);
    assert!(!broken_history[0].is_success());
    assert_eq!(broken_history[0].error_kind, Some(FetchErrorKind::Network));

    let latest = store.latest(&kettle.id).await?.expect("kettle was observed");
    assert_eq!(latest.price.map(|p| p.amount), Some(Decimal::new(1000, 0)));
    assert_eq!(latest.title.as_deref(), Some("Electric Kettle"));
    Ok(())
}

#[tokio::test]
async fn test_price_drop_is_notified_on_second_cycle() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let server = MockServer::start().await;
    let kettle = track(&store, &server, "Kettle", "/kettle", Site::Generic).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(Arc::clone(&notifier), NotificationPolicy::default())?;

    serve_price(&server, "/kettle", "Electric Kettle", "1000").await;
    let first = tracker.run_cycle(&store).await?;
    assert_eq!(first.notified(), 0);

    server.reset().await;
    serve_price(&server, "/kettle", "Electric Kettle", "800").await;
    let second = tracker.run_cycle(&store).await?;
    assert_eq!(second.notified(), 1);
    assert_eq!(
        second.products[0].outcome,
        ProductOutcome::Notified { channel: "recording" }
    );

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].product_id, kettle.id);
    assert_eq!(sent[0].direction, Direction::Decrease);
    assert_eq!(sent[0].old_price, Decimal::new(1000, 0));
    assert_eq!(sent[0].new_price, Decimal::new(800, 0));
    assert_eq!(sent[0].delta, Decimal::new(-200, 0));
    assert_eq!(sent[0].currency, "INR");

    let history = store.history(&kettle.id, Duration::hours(1)).collect().await?;
    assert_eq!(history.len(), 2);
    assert!(history[0].observed_at <= history[1].observed_at);

    let changes = store.changes_since(Duration::hours(1)).await?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new_price, Decimal::new(800, 0));
    assert!(store.changed_within(&kettle.id, Duration::hours(1)).await?);

    let log = store.notifications(&kettle.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, NotificationStatus::Sent);
    assert_eq!(log[0].channel, "recording");
    Ok(())
}

#[tokio::test]
async fn test_policy_suppresses_small_and_upward_moves() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let server = MockServer::start().await;
    let kettle = track(&store, &server, "Kettle", "/kettle", Site::Generic).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let policy = NotificationPolicy {
        price_change_threshold: Decimal::new(50, 0),
        only_price_drop: true,
    };
    let tracker = tracker(Arc::clone(&notifier), policy)?;

    for (price, expected) in [
        ("1000", SkipReason::FirstObservation),
        ("1020", SkipReason::BelowThreshold),
        ("1200", SkipReason::IncreaseSuppressed),
        ("1200", SkipReason::Unchanged),
    ] {
        server.reset().await;
        serve_price(&server, "/kettle", "Electric Kettle", price).await;
        let report = tracker.run_cycle(&store).await?;
        assert_eq!(report.products[0].outcome, ProductOutcome::Recorded { reason: expected });
    }

    assert!(notifier.sent().is_empty());
    assert!(store.notifications(&kettle.id).await?.is_empty());
    assert_eq!(store.history(&kettle.id, Duration::hours(1)).collect().await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_keeps_observation_and_logs_failure() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let server = MockServer::start().await;
    let kettle = track(&store, &server, "Kettle", "/kettle", Site::Generic).await?;

    let notifier = Arc::new(RecordingNotifier::failing());
    let tracker = tracker(Arc::clone(&notifier), NotificationPolicy::default())?;

    serve_price(&server, "/kettle", "Electric Kettle", "1000").await;
    tracker.run_cycle(&store).await?;

    server.reset().await;
    serve_price(&server, "/kettle", "Electric Kettle", "1100").await;
    let report = tracker.run_cycle(&store).await?;

    assert!(matches!(report.products[0].outcome, ProductOutcome::NotifyFailed { .. }));
    assert_eq!(notifier.sent().len(), 1);

    let latest = store.latest(&kettle.id).await?.expect("observation stored");
    assert_eq!(latest.price.map(|p| p.amount), Some(Decimal::new(1100, 0)));

    let log = store.notifications(&kettle.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, NotificationStatus::Failed);
    assert!(log[0].error.as_deref().unwrap_or_default().contains("delivery disabled"));
    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_between_prices_does_not_break_baseline() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let server = MockServer::start().await;
    track(&store, &server, "Kettle", "/kettle", Site::Generic).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(Arc::clone(&notifier), NotificationPolicy::default())?;

    serve_price(&server, "/kettle", "Electric Kettle", "1000").await;
    tracker.run_cycle(&store).await?;

    server.reset().await;
    serve_status(&server, "/kettle", 404).await;
    let report = tracker.run_cycle(&store).await?;
    assert_eq!(report.failed(), 1);

    server.reset().await;
    serve_price(&server, "/kettle", "Electric Kettle", "950").await;
    tracker.run_cycle(&store).await?;

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].old_price, Decimal::new(1000, 0));
    assert_eq!(sent[0].new_price, Decimal::new(950, 0));
    Ok(())
}
