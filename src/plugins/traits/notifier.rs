use async_trait::async_trait;

use crate::models::PriceChange;
use crate::utils::error::NotifyError;

/// Delivery channel for price change alerts (email, log, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name recorded in the notification log.
    fn channel(&self) -> &'static str;

    async fn notify(&self, change: &PriceChange) -> Result<(), NotifyError>;
}
