//! Extraction strategies, one per supported store.

pub mod amazon;
pub mod flipkart;
pub mod generic;

use scraper::{ElementRef, Html, Selector};

pub use amazon::AmazonExtractor;
pub use flipkart::FlipkartExtractor;
pub use generic::GenericExtractor;

use crate::models::Site;
use crate::plugins::traits::SiteExtractor;

impl Site {
    pub fn extractor(&self) -> &'static dyn SiteExtractor {
        match self {
            Site::Amazon => &AmazonExtractor,
            Site::Flipkart => &FlipkartExtractor,
            Site::Generic => &GenericExtractor,
        }
    }
}

/// Collapse runs of whitespace and trim; empty text becomes `None`.
pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    clean_text(&element.text().collect::<String>())
}

/// Text of the first element matching any of `selectors`, tried in order.
pub(crate) fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).find_map(element_text)
    })
}

/// Attribute of the first element matching any of `selectors`.
pub(crate) fn first_attr(document: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .find_map(|element| element.value().attr(attr).and_then(clean_text))
    })
}
