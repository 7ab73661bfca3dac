use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use validator::Validate;

use crate::config::DatabaseConfig;
use crate::models::{
    Direction, FetchStatus, NewProduct, NotificationLog, NotificationStatus, Observation, Price,
    PriceChange, Product, Site,
};
use crate::utils::error::{FetchErrorKind, StoreError};
use crate::utils::url::normalize_product_url;

/// SQLite-backed product registry and append-only observation history.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    url: String,
    site: Site,
    title: Option<String>,
    target_price: Option<String>,
    alert_on_increase: bool,
    alert_on_decrease: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ObservationRow {
    id: String,
    product_id: String,
    status: FetchStatus,
    price: Option<String>,
    currency: Option<String>,
    title: Option<String>,
    rating: Option<f64>,
    review_count: Option<i64>,
    availability: Option<String>,
    raw_price: Option<String>,
    error_kind: Option<FetchErrorKind>,
    error_message: Option<String>,
    observed_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ChangeRow {
    product_id: String,
    name: String,
    product_title: Option<String>,
    url: String,
    target_price: Option<String>,
    price: String,
    currency: String,
    prev_price: Option<String>,
    prev_currency: Option<String>,
    observed_at: DateTime<Utc>,
}

fn parse_decimal(table: &'static str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|e| StoreError::Corrupt {
        table,
        message: format!("bad decimal '{}': {}", value, e),
    })
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let target_price = row
            .target_price
            .as_deref()
            .map(|v| parse_decimal("products", v))
            .transpose()?;
        Ok(Product {
            id: row.id,
            name: row.name,
            url: row.url,
            site: row.site,
            title: row.title,
            target_price,
            alert_on_increase: row.alert_on_increase,
            alert_on_decrease: row.alert_on_decrease,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ObservationRow> for Observation {
    type Error = StoreError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        let price = match (row.status, row.price, row.currency) {
            (FetchStatus::Success, Some(amount), Some(currency)) => {
                Some(Price::new(parse_decimal("observations", &amount)?, currency))
            }
            (FetchStatus::Success, _, _) => {
                return Err(StoreError::Corrupt {
                    table: "observations",
                    message: format!("successful observation {} has no price", row.id),
                });
            }
            (FetchStatus::Failed, _, _) => None,
        };
        let review_count = row
            .review_count
            .map(|count| {
                u32::try_from(count).map_err(|_| StoreError::Corrupt {
                    table: "observations",
                    message: format!("review count {} out of range", count),
                })
            })
            .transpose()?;

        Ok(Observation {
            id: row.id,
            product_id: row.product_id,
            status: row.status,
            price,
            title: row.title,
            rating: row.rating,
            review_count,
            availability: row.availability,
            raw_price: row.raw_price,
            error_kind: row.error_kind,
            error: row.error_message,
            observed_at: row.observed_at,
        })
    }
}

impl ChangeRow {
    fn into_change(self) -> Result<Option<PriceChange>, StoreError> {
        let (Some(prev_price), Some(prev_currency)) = (self.prev_price, self.prev_currency) else {
            return Ok(None);
        };
        if prev_currency != self.currency {
            return Ok(None);
        }
        let old_price = parse_decimal("observations", &prev_price)?;
        let new_price = parse_decimal("observations", &self.price)?;
        let delta = new_price - old_price;
        if delta.is_zero() {
            return Ok(None);
        }
        let target_price = self
            .target_price
            .as_deref()
            .map(|v| parse_decimal("products", v))
            .transpose()?;

        Ok(Some(PriceChange {
            product_id: self.product_id,
            title: self.product_title.unwrap_or(self.name),
            url: self.url,
            currency: self.currency,
            old_price,
            new_price,
            delta,
            direction: if delta.is_sign_positive() {
                Direction::Increase
            } else {
                Direction::Decrease
            },
            target_price,
            observed_at: self.observed_at,
        }))
    }
}

const OBSERVATION_COLUMNS: &str = "id, product_id, status, price, currency, title, rating, review_count, \
     availability, raw_price, error_kind, error_message, observed_at";

const PRODUCT_COLUMNS: &str =
    "id, name, url, site, title, target_price, alert_on_increase, alert_on_decrease, created_at, updated_at";

const HISTORY_SQL: &str = r#"
SELECT id, product_id, status, price, currency, title, rating, review_count,
       availability, raw_price, error_kind, error_message, observed_at
FROM observations
WHERE product_id = ? AND observed_at >= ? AND observed_at <= ?
ORDER BY observed_at, rowid
"#;

// An observation that is not stored yet sorts after every stored row.
const BASELINE_SQL: &str = r#"
SELECT id, product_id, status, price, currency, title, rating, review_count,
       availability, raw_price, error_kind, error_message, observed_at
FROM observations
WHERE product_id = ? AND status = 'success' AND id <> ?
  AND (observed_at < ?
       OR (observed_at = ?
           AND rowid < COALESCE((SELECT rowid FROM observations WHERE id = ?), 9223372036854775807)))
ORDER BY observed_at DESC, rowid DESC
LIMIT 1
"#;

// Consecutive successful observations per product; the window filter is
// applied after LAG so the first in-window row still sees its predecessor.
const CHANGES_SQL: &str = r#"
SELECT c.product_id, p.name, p.title AS product_title, p.url, p.target_price,
       c.price, c.currency, c.prev_price, c.prev_currency, c.observed_at
FROM (
    SELECT product_id, price, currency, observed_at,
           LAG(price) OVER w AS prev_price,
           LAG(currency) OVER w AS prev_currency
    FROM observations
    WHERE status = 'success'
    WINDOW w AS (PARTITION BY product_id ORDER BY observed_at, rowid)
) c
JOIN products p ON p.id = c.product_id
WHERE c.observed_at >= ? AND (? IS NULL OR c.product_id = ?)
ORDER BY c.observed_at, p.created_at
"#;

/// `now - window`, saturating at the earliest representable instant.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::open(&DatabaseConfig {
            url: url.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Each connection to an in-memory database is its own database, so
        // keep exactly one alive for the lifetime of the pool.
        let pool_options = if config.url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {}", config.url);

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Register a product, or update its settings if the normalized URL is
    /// already tracked.
    pub async fn register_product(&self, new_product: NewProduct) -> Result<Product, StoreError> {
        new_product.validate()?;
        let url = normalize_product_url(&new_product.url)?;
        let site = Site::detect(&url);
        let product = Product::new(
            NewProduct {
                url: url.to_string(),
                ..new_product
            },
            site,
        );

        sqlx::query(
            r#"
            INSERT INTO products (id, name, url, site, title, target_price,
                                  alert_on_increase, alert_on_decrease, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                site = excluded.site,
                target_price = excluded.target_price,
                alert_on_increase = excluded.alert_on_increase,
                alert_on_decrease = excluded.alert_on_decrease,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.url)
        .bind(product.site)
        .bind(&product.title)
        .bind(product.target_price.map(|p| p.to_string()))
        .bind(product.alert_on_increase)
        .bind(product.alert_on_decrease)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        let stored = self
            .find_product_by_url(&product.url)
            .await?
            .ok_or_else(|| StoreError::InvalidProduct(format!("product {} vanished after upsert", product.url)))?;
        debug!(product_id = %stored.id, url = %stored.url, "Registered product");
        Ok(stored)
    }

    /// All products in registration order.
    pub async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let sql = format!("SELECT {} FROM products ORDER BY created_at, rowid", PRODUCT_COLUMNS);
        sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Product::try_from)
            .collect()
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Look a product up by URL; the URL is normalized first.
    pub async fn find_product_by_url(&self, url: &str) -> Result<Option<Product>, StoreError> {
        let url = normalize_product_url(url)?;
        let sql = format!("SELECT {} FROM products WHERE url = ?", PRODUCT_COLUMNS);
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Append an observation. A successful one also refreshes the product's
    /// display title, in the same transaction.
    pub async fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        let price = observation.priced();
        match price {
            None if observation.is_success() => {
                return Err(StoreError::InvalidObservation(format!(
                    "successful observation {} has no price",
                    observation.id
                )));
            }
            Some(p) if p.amount <= Decimal::ZERO => {
                return Err(StoreError::InvalidObservation(format!(
                    "observation {} has non-positive price {}",
                    observation.id, p.amount
                )));
            }
            _ => {}
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO observations (id, product_id, status, price, currency, title, rating, review_count,
                                      availability, raw_price, error_kind, error_message, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&observation.id)
        .bind(&observation.product_id)
        .bind(observation.status)
        .bind(price.map(|p| p.amount.to_string()))
        .bind(price.map(|p| p.currency.clone()))
        .bind(&observation.title)
        .bind(observation.rating)
        .bind(observation.review_count.map(i64::from))
        .bind(&observation.availability)
        .bind(&observation.raw_price)
        .bind(observation.error_kind)
        .bind(&observation.error)
        .bind(observation.observed_at)
        .execute(&mut *tx)
        .await?;

        if let (true, Some(title)) = (observation.is_success(), observation.title.as_deref()) {
            sqlx::query("UPDATE products SET title = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(Utc::now())
                .bind(&observation.product_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Most recent successful observation.
    pub async fn latest(&self, product_id: &str) -> Result<Option<Observation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM observations WHERE product_id = ? AND status = 'success' \
             ORDER BY observed_at DESC, rowid DESC LIMIT 1",
            OBSERVATION_COLUMNS
        );
        sqlx::query_as::<_, ObservationRow>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Observation::try_from)
            .transpose()
    }

    /// Most recent successful observation strictly before `before`.
    pub async fn latest_before(
        &self,
        product_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<Observation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM observations WHERE product_id = ? AND status = 'success' AND observed_at < ? \
             ORDER BY observed_at DESC, rowid DESC LIMIT 1",
            OBSERVATION_COLUMNS
        );
        sqlx::query_as::<_, ObservationRow>(&sql)
            .bind(product_id)
            .bind(before)
            .fetch_optional(&self.pool)
            .await?
            .map(Observation::try_from)
            .transpose()
    }

    /// The successful observation that precedes `observation` in the
    /// product's order: an earlier timestamp, or the same timestamp and
    /// inserted before it.
    pub async fn baseline_for(&self, observation: &Observation) -> Result<Option<Observation>, StoreError> {
        sqlx::query_as::<_, ObservationRow>(BASELINE_SQL)
            .bind(&observation.product_id)
            .bind(&observation.id)
            .bind(observation.observed_at)
            .bind(observation.observed_at)
            .bind(&observation.id)
            .fetch_optional(&self.pool)
            .await?
            .map(Observation::try_from)
            .transpose()
    }

    /// Observations in `[now - window, now]`, oldest first.
    pub fn history(&self, product_id: &str, window: Duration) -> History<'_> {
        let now = Utc::now();
        self.history_between(product_id, window_start(now, window), now)
    }

    pub fn history_between(&self, product_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> History<'_> {
        History {
            pool: &self.pool,
            product_id: product_id.to_string(),
            from,
            to,
        }
    }

    /// Price changes whose newer observation falls within the last `window`.
    pub async fn changes_since(&self, window: Duration) -> Result<Vec<PriceChange>, StoreError> {
        self.changes(None, window_start(Utc::now(), window)).await
    }

    pub async fn changed_within(&self, product_id: &str, window: Duration) -> Result<bool, StoreError> {
        Ok(!self
            .changes(Some(product_id), window_start(Utc::now(), window))
            .await?
            .is_empty())
    }

    async fn changes(&self, product_id: Option<&str>, since: DateTime<Utc>) -> Result<Vec<PriceChange>, StoreError> {
        let rows = sqlx::query_as::<_, ChangeRow>(CHANGES_SQL)
            .bind(since)
            .bind(product_id)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        let mut changes = Vec::new();
        for row in rows {
            if let Some(change) = row.into_change()? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    pub async fn record_notification(&self, log: &NotificationLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, product_id, channel, status, old_price, new_price, currency, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.product_id)
        .bind(&log.channel)
        .bind(log.status)
        .bind(log.old_price.to_string())
        .bind(log.new_price.to_string())
        .bind(&log.currency)
        .bind(&log.error)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delivery attempts for a product, oldest first.
    pub async fn notifications(&self, product_id: &str) -> Result<Vec<NotificationLog>, StoreError> {
        #[derive(FromRow)]
        struct NotificationRow {
            id: String,
            product_id: String,
            channel: String,
            status: NotificationStatus,
            old_price: String,
            new_price: String,
            currency: String,
            error: Option<String>,
            created_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, product_id, channel, status, old_price, new_price, currency, error, created_at \
             FROM notifications WHERE product_id = ? ORDER BY created_at, rowid",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NotificationLog {
                    id: row.id,
                    product_id: row.product_id,
                    channel: row.channel,
                    status: row.status,
                    old_price: parse_decimal("notifications", &row.old_price)?,
                    new_price: parse_decimal("notifications", &row.new_price)?,
                    currency: row.currency,
                    error: row.error,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

/// A bounded, restartable view over one product's observations. Every call to
/// [`History::stream`] runs the query again from the start.
pub struct History<'a> {
    pool: &'a SqlitePool,
    product_id: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl<'a> History<'a> {
    pub fn stream(&self) -> BoxStream<'a, Result<Observation, StoreError>> {
        sqlx::query_as::<_, ObservationRow>(HISTORY_SQL)
            .bind(self.product_id.clone())
            .bind(self.from)
            .bind(self.to)
            .fetch(self.pool)
            .map(|row| row.map_err(StoreError::from).and_then(Observation::try_from))
            .boxed()
    }

    pub async fn collect(&self) -> Result<Vec<Observation>, StoreError> {
        self.stream().try_collect().await
    }
}
