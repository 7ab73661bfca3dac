use url::Url;

use crate::models::Site;
use crate::utils::error::StoreError;

/// Canonical form of a product URL, used as the product's identity.
///
/// Amazon links collapse to `https://<host>/dp/<ASIN>`, Flipkart links keep
/// only the `pid` query parameter, anything else loses its fragment.
pub fn normalize_product_url(raw: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| StoreError::InvalidProduct(format!("invalid URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(StoreError::InvalidProduct(format!(
            "unsupported URL scheme '{}' in '{}'",
            url.scheme(),
            raw
        )));
    }
    if url.host_str().is_none() {
        return Err(StoreError::InvalidProduct(format!("URL '{}' has no host", raw)));
    }

    url.set_fragment(None);

    match Site::detect(&url) {
        Site::Amazon => {
            if let Some(asin) = amazon_asin(&url) {
                let host = url.host_str().unwrap_or_default().to_lowercase();
                let canonical = format!("https://{}/dp/{}", host, asin);
                return Url::parse(&canonical)
                    .map_err(|e| StoreError::InvalidProduct(format!("invalid URL '{}': {}", raw, e)));
            }
            Ok(url)
        }
        Site::Flipkart => {
            let pid = url
                .query_pairs()
                .find(|(key, _)| key == "pid")
                .map(|(_, value)| value.into_owned());
            url.set_query(None);
            if let Some(pid) = pid {
                url.query_pairs_mut().append_pair("pid", &pid);
            }
            Ok(url)
        }
        Site::Generic => Ok(url),
    }
}

fn amazon_asin(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let candidate = segments.windows(2).find_map(|pair| match pair {
        ["dp", asin] => Some(*asin),
        ["product", asin] => Some(*asin),
        _ => None,
    })?;
    let valid = candidate.len() == 10 && candidate.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| candidate.to_uppercase())
}
