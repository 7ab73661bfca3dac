use scraper::Html;

use super::{first_attr, first_text};
use crate::plugins::traits::{RawFields, SiteExtractor};

const TITLE_META: &[&str] = &["meta[property='og:title']", "meta[name='twitter:title']"];
const PRICE_META: &[&str] = &[
    "meta[property='product:price:amount']",
    "meta[property='og:price:amount']",
    "meta[itemprop='price']",
];
const CURRENCY_META: &[&str] = &[
    "meta[property='product:price:currency']",
    "meta[property='og:price:currency']",
    "meta[itemprop='priceCurrency']",
];

/// Fallback for stores without a dedicated strategy: Open Graph, product
/// meta tags and schema.org microdata.
pub struct GenericExtractor;

impl SiteExtractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract(&self, document: &Html) -> RawFields {
        RawFields {
            title: first_attr(document, TITLE_META, "content")
                .or_else(|| first_text(document, &["[itemprop='name']", "h1", "title"])),
            price_text: first_attr(document, PRICE_META, "content")
                .or_else(|| first_attr(document, &["[itemprop='price']"], "content"))
                .or_else(|| first_text(document, &["[itemprop='price']"])),
            currency_hint: first_attr(document, CURRENCY_META, "content"),
            rating_text: first_attr(document, &["[itemprop='ratingValue']"], "content")
                .or_else(|| first_text(document, &["[itemprop='ratingValue']"])),
            review_count_text: first_attr(document, &["[itemprop='reviewCount']"], "content")
                .or_else(|| first_text(document, &["[itemprop='reviewCount']"])),
            availability: first_attr(document, &["[itemprop='availability']"], "href")
                .or_else(|| first_attr(document, &["[itemprop='availability']"], "content"))
                .map(|value| value.rsplit('/').next().unwrap_or(&value).to_string()),
        }
    }
}
