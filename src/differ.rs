use rust_decimal::Decimal;
use tracing::debug;

use crate::config::NotificationsConfig;
use crate::models::{Direction, NotificationDecision, Observation, PriceChange, Product, SkipReason};
use crate::store::Store;
use crate::utils::error::StoreError;

/// Global alerting policy; per-product direction flags apply on top.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPolicy {
    /// Minimum absolute movement, in the product's currency.
    pub price_change_threshold: Decimal,
    pub only_price_drop: bool,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            price_change_threshold: Decimal::ZERO,
            only_price_drop: false,
        }
    }
}

impl From<&NotificationsConfig> for NotificationPolicy {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            price_change_threshold: config.price_change_threshold,
            only_price_drop: config.only_price_drop,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Differ {
    policy: NotificationPolicy,
}

impl Differ {
    pub fn new(policy: NotificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Compare `current` with the successful observation that precedes it.
    pub async fn evaluate(
        &self,
        store: &Store,
        product: &Product,
        current: &Observation,
    ) -> Result<NotificationDecision, StoreError> {
        if !current.is_success() {
            return Ok(NotificationDecision::RecordOnly(SkipReason::FetchFailed));
        }
        let baseline = store.baseline_for(current).await?;
        let decision = self.decide(product, baseline.as_ref(), current);
        debug!(product_id = %product.id, ?decision, "Evaluated observation");
        Ok(decision)
    }

    /// The pure decision: no I/O, baseline supplied by the caller.
    pub fn decide(
        &self,
        product: &Product,
        baseline: Option<&Observation>,
        current: &Observation,
    ) -> NotificationDecision {
        use NotificationDecision::RecordOnly;

        let Some(new) = current.priced() else {
            return RecordOnly(SkipReason::FetchFailed);
        };
        let Some(old) = baseline.and_then(Observation::priced) else {
            return RecordOnly(SkipReason::FirstObservation);
        };
        if old.currency != new.currency {
            return RecordOnly(SkipReason::CurrencyChanged);
        }

        let delta = new.amount - old.amount;
        if delta.is_zero() {
            return RecordOnly(SkipReason::Unchanged);
        }
        if delta.abs() < self.policy.price_change_threshold {
            return RecordOnly(SkipReason::BelowThreshold);
        }

        let direction = if delta.is_sign_positive() {
            Direction::Increase
        } else {
            Direction::Decrease
        };
        match direction {
            Direction::Increase if self.policy.only_price_drop || !product.alert_on_increase => {
                return RecordOnly(SkipReason::IncreaseSuppressed);
            }
            Direction::Decrease if !product.alert_on_decrease => {
                return RecordOnly(SkipReason::DecreaseSuppressed);
            }
            _ => {}
        }

        NotificationDecision::Notify(PriceChange {
            product_id: product.id.clone(),
            title: current
                .title
                .clone()
                .unwrap_or_else(|| product.display_title().to_string()),
            url: product.url.clone(),
            currency: new.currency.clone(),
            old_price: old.amount,
            new_price: new.amount,
            delta,
            direction,
            target_price: product.target_price,
            observed_at: current.observed_at,
        })
    }
}
