use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Site, generate_id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    /// User-chosen nickname.
    pub name: String,
    /// Normalized product URL; the product's identity.
    pub url: String,
    pub site: Site,
    /// Title as last seen on the product page.
    pub title: Option<String>,
    pub target_price: Option<Decimal>,

    // Notification rules
    pub alert_on_increase: bool,
    pub alert_on_decrease: bool,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(url)]
    pub url: String,
    /// Overrides the site detected from the URL host.
    pub site: Option<Site>,
    pub target_price: Option<Decimal>,
    pub alert_on_increase: bool,
    pub alert_on_decrease: bool,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            site: None,
            target_price: None,
            alert_on_increase: true,
            alert_on_decrease: true,
        }
    }
}

impl Product {
    /// Build a product from a registration whose URL is already normalized.
    pub fn new(new_product: NewProduct, site: Site) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: new_product.name,
            url: new_product.url,
            site: new_product.site.unwrap_or(site),
            title: None,
            target_price: new_product.target_price,
            alert_on_increase: new_product.alert_on_increase,
            alert_on_decrease: new_product.alert_on_decrease,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title to show in alerts: the scraped title when known, else the nickname.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}
