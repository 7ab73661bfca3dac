use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{NotificationStatus, PriceChange, generate_id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationLog {
    pub id: String,
    pub product_id: String,
    pub channel: String,
    pub status: NotificationStatus,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub currency: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationLog {
    pub fn new(change: &PriceChange, channel: impl Into<String>, status: NotificationStatus, error: Option<String>) -> Self {
        Self {
            id: generate_id(),
            product_id: change.product_id.clone(),
            channel: channel.into(),
            status,
            old_price: change.old_price,
            new_price: change.new_price,
            currency: change.currency.clone(),
            error,
            created_at: Utc::now(),
        }
    }

    pub fn sent(change: &PriceChange, channel: impl Into<String>) -> Self {
        Self::new(change, channel, NotificationStatus::Sent, None)
    }

    pub fn failed(change: &PriceChange, channel: impl Into<String>, error: impl ToString) -> Self {
        Self::new(change, channel, NotificationStatus::Failed, Some(error.to_string()))
    }
}
