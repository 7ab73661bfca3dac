use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::models::{NewProduct, Site};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub notifications: NotificationsConfig,
    pub email: EmailConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub acquire_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/prices.db".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub referer: Option<String>,
    /// Whole-request timeout in seconds.
    pub request_timeout: u64,
    pub connect_timeout: u64,
    /// Total HTTP attempts per fetch, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    pub delay_between_products_ms: u64,
    pub default_currency: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-IN,en;q=0.9".to_string(),
            referer: Some("https://www.google.com/".to_string()),
            request_timeout: 30,
            connect_timeout: 10,
            max_attempts: 4,
            backoff_base_ms: 1000,
            max_backoff_ms: 30_000,
            delay_between_products_ms: 3000,
            default_currency: "INR".to_string(),
        }
    }
}

impl ScraperConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn delay_between_products(&self) -> Duration {
        Duration::from_millis(self.delay_between_products_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Minimum absolute price movement that triggers an alert.
    pub price_change_threshold: Decimal,
    pub only_price_drop: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            price_change_threshold: Decimal::ZERO,
            only_price_drop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Environment variable consulted when `password` is not set.
    pub password_env_var: String,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to_addresses: Vec<String>,
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            password_env_var: "PRICESAGE_SMTP_PASSWORD".to_string(),
            from_address: None,
            from_name: "PriceSage".to_string(),
            to_addresses: Vec::new(),
            use_tls: true,
        }
    }
}

impl EmailConfig {
    pub fn resolve_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| env::var(&self.password_env_var).ok())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Used when `times` is empty: runs are spread evenly over the day.
    pub runs_per_day: u32,
    /// Wall-clock run times as `HH:MM`, in UTC.
    pub times: Vec<String>,
    pub immediate_run: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            runs_per_day: 6,
            times: Vec::new(),
            immediate_run: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(24 * 60 * 60 / u64::from(self.runs_per_day.max(1)))
    }

    /// Parse `times` into `(hour, minute)` pairs.
    pub fn parsed_times(&self) -> Result<Vec<(u32, u32)>, ConfigError> {
        self.times.iter().map(|t| parse_time_of_day(t)).collect()
    }
}

fn parse_time_of_day(value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Message(format!("Invalid scheduler time '{}', expected HH:MM", value));
    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "pricesage.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub site: Option<Site>,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default = "default_true")]
    pub alert_on_increase: bool,
    #[serde(default = "default_true")]
    pub alert_on_decrease: bool,
}

fn default_true() -> bool {
    true
}

impl From<&ProductConfig> for NewProduct {
    fn from(product: &ProductConfig) -> Self {
        NewProduct {
            name: product.name.clone(),
            url: product.url.clone(),
            site: product.site,
            target_price: product.target_price,
            alert_on_increase: product.alert_on_increase,
            alert_on_decrease: product.alert_on_decrease,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(Environment::with_prefix("PRICESAGE").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.scraper.max_attempts == 0 {
            return Err(ConfigError::Message("Scraper max_attempts must be at least 1".into()));
        }

        if self.scraper.backoff_base_ms == 0 || self.scraper.max_backoff_ms < self.scraper.backoff_base_ms {
            return Err(ConfigError::Message(
                "Scraper backoff_base_ms must be positive and not exceed max_backoff_ms".into(),
            ));
        }

        let currency = &self.scraper.default_currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Message(format!(
                "Scraper default_currency '{}' is not an ISO currency code",
                currency
            )));
        }

        if self.notifications.price_change_threshold.is_sign_negative() {
            return Err(ConfigError::Message("price_change_threshold cannot be negative".into()));
        }

        if self.scheduler.times.is_empty() && !(1..=96).contains(&self.scheduler.runs_per_day) {
            return Err(ConfigError::Message("Scheduler runs_per_day must be between 1 and 96".into()));
        }
        self.scheduler.parsed_times()?;

        if self.email.enabled {
            if self.email.smtp_server.trim().is_empty() || self.email.smtp_port == 0 {
                return Err(ConfigError::Message("Email smtp_server and smtp_port are required".into()));
            }
            if self.email.to_addresses.is_empty() {
                return Err(ConfigError::Message("Email to_addresses cannot be empty".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        for product in &self.products {
            if Url::parse(&product.url).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid URL for product '{}': {}",
                    product.name, product.url
                )));
            }
        }

        Ok(())
    }
}
