use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use scraper::Html;
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::metrics;
use crate::models::{Product, ScrapedProduct, Site};
use crate::plugins::traits::RawFields;
use crate::utils::error::FetchError;
use crate::utils::price::{currency_for_host, detect_currency, parse_count, parse_price, parse_rating};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Retrieves and extracts a product page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductFetcher: Send + Sync {
    async fn fetch(&self, product: &Product) -> Result<ScrapedProduct, FetchError>;
}

/// Result of one step of an attempt: the HTTP exchange, then extraction.
#[derive(Debug)]
enum AttemptOutcome<T> {
    Success(T),
    Retryable {
        error: FetchError,
        retry_after: Option<Duration>,
    },
    Terminal(FetchError),
}

/// HTTP fetcher with a browser-like identity and bounded exponential backoff.
pub struct Fetcher {
    client: Client,
    config: ScraperConfig,
}

impl Fetcher {
    pub fn new(config: ScraperConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        let language = HeaderValue::from_str(&config.accept_language)
            .map_err(|e| FetchError::network("", format!("invalid Accept-Language header: {}", e)))?;
        headers.insert(ACCEPT_LANGUAGE, language);
        if let Some(referer) = &config.referer {
            let referer = HeaderValue::from_str(referer)
                .map_err(|e| FetchError::network("", format!("invalid Referer header: {}", e)))?;
            headers.insert(REFERER, referer);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .gzip(true)
            .build()
            .map_err(|e| FetchError::network("", format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Delays between attempts: `base`, `2 * base`, `4 * base`, ... capped at
    /// `max_backoff_ms`, one fewer than the number of attempts.
    fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        let base = self.config.backoff_base_ms.max(2);
        ExponentialBackoff::from_millis(2)
            .factor(base / 2)
            .max_delay(Duration::from_millis(self.config.max_backoff_ms))
            .take(self.config.max_attempts.saturating_sub(1) as usize)
    }

    async fn attempt(&self, url: &str, site: Site) -> AttemptOutcome<String> {
        metrics::record_fetch_attempt(site.as_str());

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return AttemptOutcome::Terminal(FetchError::network(url, format!("invalid request: {}", e)));
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return AttemptOutcome::Retryable {
                    error: FetchError::network(url, message),
                    retry_after: None,
                };
            }
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            return AttemptOutcome::Retryable {
                error: FetchError::blocked(url, "rate limited (HTTP 429)"),
                retry_after,
            };
        }
        if status == StatusCode::FORBIDDEN {
            return AttemptOutcome::Terminal(FetchError::blocked(url, "access denied (HTTP 403)"));
        }
        if status.is_server_error() {
            return AttemptOutcome::Retryable {
                error: FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                    attempts: 1,
                },
                retry_after,
            };
        }
        if !status.is_success() {
            return AttemptOutcome::Terminal(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                attempts: 1,
            });
        }

        match response.text().await {
            Ok(body) => AttemptOutcome::Success(body),
            Err(e) => AttemptOutcome::Retryable {
                error: FetchError::network(url, format!("failed to read body: {}", e)),
                retry_after: None,
            },
        }
    }

    /// Parse a page into a product. Blocked pages are reported separately so
    /// the caller can retry them.
    fn extract(&self, url: &str, site: Site, body: &str) -> AttemptOutcome<ScrapedProduct> {
        let extractor = site.extractor();
        // Html is !Send; keep it inside this synchronous scope.
        let fields = {
            let document = Html::parse_document(body);
            extractor.extract(&document)
        };

        match build_product(url, fields, &self.config.default_currency) {
            Ok(product) => AttemptOutcome::Success(product),
            Err(error) => match extractor.blocked_reason(body) {
                Some(reason) => AttemptOutcome::Retryable {
                    error: FetchError::blocked(url, reason),
                    retry_after: None,
                },
                None => AttemptOutcome::Terminal(error),
            },
        }
    }
}

/// Turn raw page text into a product. Fails when no positive price is found.
pub fn build_product(url: &str, fields: RawFields, default_currency: &str) -> Result<ScrapedProduct, FetchError> {
    let host = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase));
    let fallback_currency = fields
        .currency_hint
        .as_deref()
        .and_then(detect_currency)
        .filter(|code| code != "$")
        .or_else(|| host.as_deref().and_then(currency_for_host).map(str::to_string))
        .unwrap_or_else(|| default_currency.to_uppercase());

    let raw_price = fields
        .price_text
        .ok_or_else(|| FetchError::parse(url, "price element not found"))?;
    let price = parse_price(&raw_price, &fallback_currency)
        .ok_or_else(|| FetchError::parse(url, format!("no positive price in '{}'", raw_price)))?;

    Ok(ScrapedProduct {
        url: url.to_string(),
        title: fields.title,
        price,
        raw_price,
        rating: fields.rating_text.as_deref().and_then(parse_rating),
        review_count: fields.review_count_text.as_deref().and_then(parse_count),
        availability: fields.availability,
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ProductFetcher for Fetcher {
    async fn fetch(&self, product: &Product) -> Result<ScrapedProduct, FetchError> {
        let started = Instant::now();
        let site = product.site;
        let max_delay = Duration::from_millis(self.config.max_backoff_ms);
        let mut delays = self.backoff_schedule();
        let mut attempts = 0u32;

        let result = loop {
            attempts += 1;

            let outcome = match self.attempt(&product.url, site).await {
                AttemptOutcome::Success(body) => self.extract(&product.url, site, &body),
                AttemptOutcome::Retryable { error, retry_after } => AttemptOutcome::Retryable { error, retry_after },
                AttemptOutcome::Terminal(error) => AttemptOutcome::Terminal(error),
            };

            let (error, retry_after) = match outcome {
                AttemptOutcome::Success(scraped) => break Ok(scraped),
                AttemptOutcome::Terminal(error) => break Err(error.with_attempts(attempts)),
                AttemptOutcome::Retryable { error, retry_after } => (error, retry_after),
            };

            let Some(delay) = delays.next() else {
                break Err(error.with_attempts(attempts));
            };
            let delay = retry_after.map_or(delay, |hint| hint.max(delay)).min(max_delay);

            warn!(
                product_id = %product.id,
                url = %product.url,
                error_kind = %error.kind(),
                attempt = attempts,
                "Fetch attempt failed, retrying in {:?}: {}",
                delay,
                error
            );
            tokio::time::sleep(delay).await;
        };

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_fetch_result(site.as_str(), label, started.elapsed());
        debug!(product_id = %product.id, attempts, result = label, "Fetch finished");

        result
    }
}
