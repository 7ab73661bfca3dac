use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{FetchStatus, generate_id};
use crate::utils::error::{FetchError, FetchErrorKind};
use crate::utils::price::format_amount;

/// A positive monetary amount in a given ISO currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Price {
    pub amount: Decimal,
    pub currency: String,
}

impl Price {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.currency, format_amount(self.amount))
    }
}

/// Fields pulled from a product page by a site extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedProduct {
    pub url: String,
    pub title: Option<String>,
    pub price: Price,
    pub raw_price: String,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub availability: Option<String>,
}

/// One timestamped scrape result. Successful observations always carry a
/// positive price; failed ones never do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: String,
    pub product_id: String,
    pub status: FetchStatus,
    pub price: Option<Price>,
    pub title: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub availability: Option<String>,
    pub raw_price: Option<String>,
    pub error_kind: Option<FetchErrorKind>,
    pub error: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn success(product_id: impl Into<String>, scraped: ScrapedProduct, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            product_id: product_id.into(),
            status: FetchStatus::Success,
            price: Some(scraped.price),
            title: scraped.title,
            rating: scraped.rating,
            review_count: scraped.review_count,
            availability: scraped.availability,
            raw_price: Some(scraped.raw_price),
            error_kind: None,
            error: None,
            observed_at,
        }
    }

    pub fn failure(product_id: impl Into<String>, error: &FetchError, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            product_id: product_id.into(),
            status: FetchStatus::Failed,
            price: None,
            title: None,
            rating: None,
            review_count: None,
            availability: None,
            raw_price: None,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            observed_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// The price, only for successful observations.
    pub fn priced(&self) -> Option<&Price> {
        if self.is_success() {
            self.price.as_ref()
        } else {
            None
        }
    }
}
