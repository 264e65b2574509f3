//! Gallery page scraping: given an HTML document, discover the original
//! image urls it showcases.
//!
//! Supported pages embed their illustration metadata as JSON in the
//! `content` attribute of a `#meta-preload-data` element. Anything else
//! yields no candidates.

use std::collections::BTreeMap;

use scraper::{Html, Selector};
use serde::Deserialize;

#[derive(Deserialize)]
struct GalleryPreload {
    #[serde(default)]
    illust: BTreeMap<String, Illustration>,
}

#[derive(Deserialize)]
struct Illustration {
    #[serde(default)]
    urls: IllustrationUrls,
}

#[derive(Deserialize, Default)]
struct IllustrationUrls {
    #[serde(default)]
    original: Option<String>,
}

/// Extract candidate original-image urls from a gallery page, in
/// deterministic (illustration-id) order. Empty when the document is not a
/// recognized gallery page or carries no originals.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("#meta-preload-data") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let Some(element) = document.select(&selector).next() else {
        return Vec::new();
    };
    let Some(content) = element.value().attr("content") else {
        return Vec::new();
    };
    let Ok(preload) = serde_json::from_str::<GalleryPreload>(content) else {
        return Vec::new();
    };

    preload
        .illust
        .into_values()
        .filter_map(|illustration| illustration.urls.original)
        .filter(|url| !url.is_empty())
        .collect()
}
