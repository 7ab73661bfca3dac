use scraper::Html;

use super::first_text;
use crate::plugins::traits::{RawFields, SiteExtractor};

// Flipkart rotates its generated class names; newer ones are listed first.
const TITLE: &[&str] = &["span.VU-ZEz", "span.B_NuCI", "h1 span"];
const PRICE: &[&str] = &["div.Nx9bqj.CxhGGd", "div._30jeq3._16Jk6d", "div.Nx9bqj", "div._30jeq3"];
const RATING: &[&str] = &["div.XQDdHH", "div._3LWZlK"];
const REVIEWS: &[&str] = &["span.Wphh3N", "span._2_R_DZ"];
const AVAILABILITY: &[&str] = &["div.Z8JjpR", "div._16FRp0"];

pub struct FlipkartExtractor;

impl SiteExtractor for FlipkartExtractor {
    fn name(&self) -> &'static str {
        "flipkart"
    }

    fn extract(&self, document: &Html) -> RawFields {
        RawFields {
            title: first_text(document, TITLE),
            price_text: first_text(document, PRICE),
            currency_hint: Some("INR".to_string()),
            rating_text: first_text(document, RATING),
            review_count_text: first_text(document, REVIEWS),
            availability: first_text(document, AVAILABILITY),
        }
    }
}
