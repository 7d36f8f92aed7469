//! Catalog identifier resolution
//!
//! The identifier is the cache and dedup key, so it gets the longest cascade:
//! URL path, hidden metadata, labeled detail row, then a labeled regex scan of
//! the raw page.

use once_cell::sync::Lazy;
use regex::Regex;

use super::cascade::{Cascade, Strategy};
use super::document::ProductPage;
use super::labeled_rows;
use super::selectors::CompiledSelectors;

/// Product-detail URL shapes: `/dp/<ID>`, `/gp/product/<ID>`, `/gp/aw/d/<ID>`
static URL_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:dp|gp/product|gp/aw/d|product|d)/([A-Z0-9]{10})(?:[/?#]|$)").expect("static regex")
});
static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{10}$").expect("static regex"));
/// Standalone 10-character tokens in serialized markup
static PAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z0-9]{10}\b").expect("static regex"));
static LABELED_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:ASIN|ISBN-10)\b[^A-Za-z0-9]{0,40}([A-Za-z0-9]{10})\b"#).expect("static regex")
});

const LABELS: &[&str] = &["ASIN", "ISBN-10"];

/// Identifier embedded in a product-detail URL path
pub fn from_url(url: &str) -> Option<String> {
    URL_PATH.captures(url).map(|caps| caps[1].to_string())
}

/// Whether a candidate looks like a catalog code
pub fn is_plausible(candidate: &str) -> bool {
    CODE.is_match(candidate)
}

/// Whether the serialized page mentions something shaped like a catalog code
///
/// Same shape as [`is_plausible`], but a token must carry at least one digit
/// so upper-case words in markup do not count.
pub fn page_mentions_code(serialized: &str) -> bool {
    PAGE_CODE
        .find_iter(serialized)
        .any(|m| is_plausible(m.as_str()) && m.as_str().bytes().any(|b| b.is_ascii_digit()))
}

fn normalize(candidate: &str) -> Option<String> {
    let upper = candidate.trim().to_ascii_uppercase();
    is_plausible(&upper).then_some(upper)
}

fn url_path(page: &ProductPage, _: &CompiledSelectors) -> Option<String> {
    from_url(page.url())
}

fn hidden_metadata(page: &ProductPage, selectors: &CompiledSelectors) -> Option<String> {
    selectors
        .identifier_meta
        .iter()
        .flat_map(|selector| page.html().select(selector))
        .filter_map(|el| el.value().attr("value").or_else(|| el.value().attr("data-asin")))
        .find_map(normalize)
}

fn detail_row(page: &ProductPage, selectors: &CompiledSelectors) -> Option<String> {
    LABELS.iter().find_map(|label| {
        labeled_rows::labeled_value(page, &selectors.detail_table_rows, &selectors.detail_list_items, label)
            .and_then(|value| normalize(&value))
    })
}

fn labeled_scan(page: &ProductPage, _: &CompiledSelectors) -> Option<String> {
    LABELED_CODE
        .captures_iter(page.serialized())
        .find_map(|caps| normalize(&caps[1]))
}

pub fn cascade() -> Cascade<CompiledSelectors, String> {
    Cascade::new(
        "product_id",
        vec![
            Strategy::new("url_path", url_path),
            Strategy::new("hidden_metadata", hidden_metadata),
            Strategy::new("detail_row", detail_row),
            Strategy::new("labeled_scan", labeled_scan),
        ],
    )
}
