use super::*;
use pricesage::scraper::{Fetcher, ProductFetcher};
use pricesage::utils::error::{FetchError, FetchErrorKind};
use rust_decimal::Decimal;
use std::str::FromStr;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

fn product_at(server: &MockServer, route: &str, site: Site) -> Product {
    let mut new_product = NewProduct::new("Test product", format!("{}{}", server.uri(), route));
    new_product.site = Some(site);
    Product::new(new_product, Site::Generic)
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("content-type", "text/html; charset=utf-8").set_body_string(body)
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kettle"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/kettle"))
        .respond_with(html(product_page("Electric Kettle", "1299.00", "INR")))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let scraped = fetcher.fetch(&product_at(&server, "/kettle", Site::Generic)).await?;

    assert_eq!(scraped.price.amount, Decimal::from_str("1299.00")?);
    assert_eq!(scraped.price.currency, "INR");
    assert_eq!(scraped.title.as_deref(), Some("Electric Kettle"));
    assert_eq!(scraped.availability.as_deref(), Some("InStock"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_parse_failure_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(html(fixture("no_price.html")))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let error = fetcher
        .fetch(&product_at(&server, "/gone", Site::Generic))
        .await
        .expect_err("page without a price must fail");

    assert_eq!(error.kind(), FetchErrorKind::Parse);
    assert_eq!(error.attempts(), 1);
    assert!(error.url().ends_with("/gone"));
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_reported_as_blocked_after_all_attempts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        // Longer than max_backoff_ms; the delay is capped.
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let started = std::time::Instant::now();
    let error = fetcher
        .fetch(&product_at(&server, "/busy", Site::Generic))
        .await
        .expect_err("429 on every attempt must fail");

    assert_eq!(error.kind(), FetchErrorKind::Blocked);
    assert_eq!(error.attempts(), 3);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn test_forbidden_is_terminal() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let error = fetcher.fetch(&product_at(&server, "/private", Site::Generic)).await.unwrap_err();

    assert!(matches!(error, FetchError::Blocked { attempts: 1, .. }));
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_terminal_status_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let error = fetcher.fetch(&product_at(&server, "/missing", Site::Generic)).await.unwrap_err();

    assert!(matches!(error, FetchError::Status { status: 404, attempts: 1, .. }));
    assert_eq!(error.kind(), FetchErrorKind::Network);
    Ok(())
}

#[tokio::test]
async fn test_captcha_page_is_retried_as_blocked() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B0B1XYZ123"))
        .respond_with(html(fixture("amazon_captcha.html")))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let error = fetcher
        .fetch(&product_at(&server, "/dp/B0B1XYZ123", Site::Amazon))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), FetchErrorKind::Blocked);
    assert_eq!(error.attempts(), 3);
    Ok(())
}

#[tokio::test]
async fn test_amazon_page_extraction() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B09XS7JWHH"))
        .respond_with(html(fixture("amazon_product.html")))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let scraped = fetcher.fetch(&product_at(&server, "/dp/B09XS7JWHH", Site::Amazon)).await?;

    assert_eq!(
        scraped.title.as_deref(),
        Some("Sony WH-1000XM5 Wireless Noise Cancelling Headphones, Black")
    );
    assert_eq!(scraped.price.amount, Decimal::from_str("26990.00")?);
    assert_eq!(scraped.price.currency, "INR");
    assert_eq!(scraped.raw_price, "₹26,990.00");
    assert_eq!(scraped.rating, Some(4.3));
    assert_eq!(scraped.review_count, Some(12845));
    assert_eq!(scraped.availability.as_deref(), Some("In stock"));
    Ok(())
}

#[tokio::test]
async fn test_browser_headers_are_sent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lamp"))
        .and(header_exists("user-agent"))
        .and(header_exists("accept-language"))
        .respond_with(html(product_page("Desk Lamp", "899", "INR")))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    fetcher.fetch(&product_at(&server, "/lamp", Site::Generic)).await?;
    Ok(())
}

#[tokio::test]
async fn test_parse_failure_after_retries_counts_all_requests() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html(fixture("no_price.html")))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(get_test_scraper_config())?;
    let error = fetcher
        .fetch(&product_at(&server, "/flaky", Site::Generic))
        .await
        .expect_err("page without a price must fail");

    assert_eq!(error.kind(), FetchErrorKind::Parse);
    assert_eq!(error.attempts(), 3);
    assert!(error.to_string().contains("after 3 attempt(s)"));
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 3);
    Ok(())
}
