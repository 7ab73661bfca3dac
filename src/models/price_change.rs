use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::price::format_amount;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }
}

/// Payload handed to a notifier when a price moves past the policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub product_id: String,
    pub title: String,
    pub url: String,
    pub currency: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub delta: Decimal,
    pub direction: Direction,
    pub target_price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

impl PriceChange {
    pub fn formatted_old(&self) -> String {
        format!("{} {}", self.currency, format_amount(self.old_price))
    }

    pub fn formatted_new(&self) -> String {
        format!("{} {}", self.currency, format_amount(self.new_price))
    }

    /// Signed difference with a percentage, e.g. `-INR 500.00 (-16.7%)`.
    pub fn formatted_delta(&self) -> String {
        let sign = if self.delta.is_sign_negative() { "-" } else { "+" };
        let mut text = format!("{}{} {}", sign, self.currency, format_amount(self.delta.abs()));
        if !self.old_price.is_zero() {
            let percent = (self.delta / self.old_price * Decimal::ONE_HUNDRED).round_dp(1);
            text.push_str(&format!(" ({}{}%)", if percent.is_sign_negative() { "" } else { "+" }, percent));
        }
        text
    }

    pub fn target_reached(&self) -> bool {
        self.target_price.is_some_and(|target| self.new_price <= target)
    }
}

/// Why an observation was recorded without alerting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FirstObservation,
    FetchFailed,
    CurrencyChanged,
    Unchanged,
    BelowThreshold,
    IncreaseSuppressed,
    DecreaseSuppressed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationDecision {
    Notify(PriceChange),
    RecordOnly(SkipReason),
}

impl NotificationDecision {
    pub fn should_notify(&self) -> bool {
        matches!(self, NotificationDecision::Notify(_))
    }
}
