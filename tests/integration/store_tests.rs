use super::*;
use chrono::{Duration, Utc};
use futures::StreamExt;
use pricesage::models::{Observation, Price, ScrapedProduct};
use rust_decimal::Decimal;

fn scraped(url: &str, amount: i64) -> ScrapedProduct {
    ScrapedProduct {
        url: url.to_string(),
        title: Some("Desk Lamp".to_string()),
        price: Price::new(Decimal::new(amount, 2), "INR"),
        raw_price: format!("₹{}", Decimal::new(amount, 2)),
        rating: Some(4.1),
        review_count: Some(87),
        availability: Some("In stock".to_string()),
    }
}

#[tokio::test]
async fn test_data_survives_reopening_the_database() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("nested/prices.db").display());

    let product_id = {
        let store = Store::connect(&url).await?;
        let product = store
            .register_product(NewProduct::new("Lamp", "https://www.amazon.in/Desk-Lamp/dp/b0abc12345/ref=sr_1_1"))
            .await?;
        store
            .append(&Observation::success(&product.id, scraped(&product.url, 89900), Utc::now()))
            .await?;
        store.close().await;
        product.id
    };

    let store = Store::connect(&url).await?;
    let products = store.list_products().await?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, product_id);
    assert_eq!(products[0].url, "https://www.amazon.in/dp/B0ABC12345");
    assert_eq!(products[0].site, Site::Amazon);
    assert_eq!(products[0].title.as_deref(), Some("Desk Lamp"));

    let latest = store.latest(&product_id).await?.expect("observation persisted");
    assert_eq!(latest.price, Some(Price::new(Decimal::new(89900, 2), "INR")));
    assert_eq!(latest.rating, Some(4.1));
    assert_eq!(latest.review_count, Some(87));
    Ok(())
}

#[tokio::test]
async fn test_history_stream_is_lazy_and_ordered() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let product = store
        .register_product(NewProduct::new("Lamp", "https://shop.example.com/lamp"))
        .await?;

    let now = Utc::now();
    // Appended out of order on purpose.
    for hours_ago in [3, 30, 1, 2] {
        let observation = Observation::success(
            &product.id,
            scraped(&product.url, 10_000 + hours_ago),
            now - Duration::hours(hours_ago),
        );
        store.append(&observation).await?;
    }

    let history = store.history(&product.id, Duration::hours(24));
    let mut stream = history.stream();
    let mut seen = Vec::new();
    while let Some(observation) = stream.next().await {
        seen.push(observation?.observed_at);
    }

    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|t| *t >= now - Duration::hours(24)));

    let first_only: Vec<_> = history.stream().take(1).collect().await;
    assert_eq!(first_only.len(), 1);
    Ok(())
}
