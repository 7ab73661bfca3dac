use scraper::Html;

use super::{first_attr, first_text};
use crate::plugins::traits::{RawFields, SiteExtractor};

const TITLE: &[&str] = &["#productTitle", "#title"];

// Current layout first, then the older price blocks.
const PRICE: &[&str] = &[
    "#corePrice_feature_div .a-price .a-offscreen",
    "#corePriceDisplay_desktop_feature_div .a-price .a-offscreen",
    ".a-price .a-offscreen",
    "#priceblock_dealprice",
    "#priceblock_ourprice",
    "#corePrice_feature_div .a-price-whole",
];

const CURRENCY: &[&str] = &["#corePrice_feature_div .a-price-symbol", ".a-price-symbol"];

const RATING: &[&str] = &["#acrPopover"];
const RATING_TEXT: &[&str] = &["#acrPopover span.a-icon-alt", "span.a-icon-alt"];
const REVIEWS: &[&str] = &["#acrCustomerReviewText"];
const AVAILABILITY: &[&str] = &["#availability span", "#availability"];

const CAPTCHA_MARKERS: &[&str] = &[
    "/errors/validateCaptcha",
    "Enter the characters you see below",
    "Type the characters you see in this image",
];

pub struct AmazonExtractor;

impl SiteExtractor for AmazonExtractor {
    fn name(&self) -> &'static str {
        "amazon"
    }

    fn extract(&self, document: &Html) -> RawFields {
        RawFields {
            title: first_text(document, TITLE),
            price_text: first_text(document, PRICE),
            currency_hint: first_text(document, CURRENCY),
            rating_text: first_attr(document, RATING, "title").or_else(|| first_text(document, RATING_TEXT)),
            review_count_text: first_text(document, REVIEWS),
            availability: first_text(document, AVAILABILITY),
        }
    }

    fn blocked_reason(&self, body: &str) -> Option<String> {
        CAPTCHA_MARKERS
            .iter()
            .any(|marker| body.contains(marker))
            .then(|| "captcha page".to_string())
    }
}
