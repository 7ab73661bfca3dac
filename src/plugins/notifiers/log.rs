use async_trait::async_trait;
use tracing::info;

use crate::models::PriceChange;
use crate::plugins::traits::Notifier;
use crate::utils::error::NotifyError;

/// Writes alerts to the log instead of delivering them. Used when email is
/// not configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, change: &PriceChange) -> Result<(), NotifyError> {
        info!(
            product_id = %change.product_id,
            url = %change.url,
            direction = change.direction.as_str(),
            old_price = %change.formatted_old(),
            new_price = %change.formatted_new(),
            target_reached = change.target_reached(),
            "Price change for {}: {}",
            change.title,
            change.formatted_delta()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let change = PriceChange {
            product_id: "product123".to_string(),
            title: "Test Product".to_string(),
            url: "https://shop.example.com/p".to_string(),
            currency: "USD".to_string(),
            old_price: Decimal::new(2499, 2),
            new_price: Decimal::new(1999, 2),
            delta: Decimal::new(-500, 2),
            direction: Direction::Decrease,
            target_price: None,
            observed_at: Utc::now(),
        };

        let notifier = LogNotifier;
        assert_eq!(notifier.channel(), "log");
        assert!(notifier.notify(&change).await.is_ok());
    }
}
