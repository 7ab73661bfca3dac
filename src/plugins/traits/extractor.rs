use scraper::Html;

/// Unparsed text pulled from a product page. Normalization into prices,
/// ratings and counts happens in one place, after extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub title: Option<String>,
    pub price_text: Option<String>,
    /// Currency symbol or code shown next to the price, if separate.
    pub currency_hint: Option<String>,
    pub rating_text: Option<String>,
    pub review_count_text: Option<String>,
    pub availability: Option<String>,
}

/// Per-site strategy for reading product fields out of a parsed page.
pub trait SiteExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, document: &Html) -> RawFields;

    /// Reason the page is a bot check rather than a product page.
    fn blocked_reason(&self, body: &str) -> Option<String> {
        const MARKERS: &[&str] = &["captcha", "Access Denied", "unusual traffic"];
        MARKERS
            .iter()
            .find(|marker| body.contains(*marker))
            .map(|marker| format!("bot check detected ({})", marker))
    }
}
