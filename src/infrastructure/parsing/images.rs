//! Image URL normalization
//!
//! Main image elements carry a high-resolution URL in `data-old-hires` or a
//! JSON map of URL -> [width, height] in `data-a-dynamic-image`; thumbnails
//! only carry a low-resolution `src` whose size suffix is rewritten.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use super::document::ProductPage;

const HIRES_ATTR: &str = "data-old-hires";
const DYNAMIC_ATTR: &str = "data-a-dynamic-image";
const HIRES_SUFFIX: &str = "._AC_SL1500_.";

/// Filename fragments of sprites and placeholders that are never product images
const EXCLUDED_ASSETS: &[&str] = &[
    "sprite",
    "transparent-pixel",
    "grey-pixel",
    "placeholder",
    "loading",
    "play-icon",
    "play-button",
    "360_icon",
];

static SIZE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\._[A-Za-z0-9,_\-]+_\.(jpe?g|png|gif|webp)$").expect("static regex"));

/// Rewrite a sized rendition (`._AC_US40_.jpg`, `._SX38_SY50_CR,0,0,38,50_.jpg`)
/// to its high-resolution equivalent
pub fn upgrade_resolution(url: &str) -> String {
    SIZE_SUFFIX
        .replace(url, |caps: &regex::Captures<'_>| format!("{HIRES_SUFFIX}{}", &caps[1]))
        .into_owned()
}

/// URL with the largest pixel area from a dynamic-image map; first wins on ties
pub fn largest_from_dynamic_map(raw: &str) -> Option<String> {
    let map: BTreeMap<String, Vec<u64>> = serde_json::from_str(raw).ok()?;
    let mut best: Option<(&String, u64)> = None;
    for (url, dims) in &map {
        let area = match dims.as_slice() {
            [w, h, ..] => w.saturating_mul(*h),
            _ => 0,
        };
        if best.is_none_or(|(_, top)| area > top) {
            best = Some((url, area));
        }
    }
    best.map(|(url, _)| url.clone())
}

pub fn is_excluded_asset(url: &str) -> bool {
    if url.is_empty() || url.starts_with("data:") {
        return true;
    }
    let filename = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_lowercase();
    EXCLUDED_ASSETS.iter().any(|fragment| filename.contains(fragment))
}

/// Best URL for one image element: hi-res attribute, dynamic map, then `src`
pub fn element_image_url(element: ElementRef<'_>) -> Option<String> {
    let attrs = element.value();
    let chosen = attrs
        .attr(HIRES_ATTR)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| attrs.attr(DYNAMIC_ATTR).and_then(largest_from_dynamic_map))
        .or_else(|| attrs.attr("src").map(|s| s.trim().to_string()))?;
    Some(upgrade_resolution(&chosen))
}

/// Main images then thumbnails, first-seen order, sprites excluded
pub fn collect_images(page: &ProductPage, main: &[Selector], thumbnails: &[Selector]) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let candidates = page
        .select_first_matching(main)
        .into_iter()
        .chain(page.select_first_matching(thumbnails));

    for element in candidates {
        let Some(url) = element_image_url(element) else {
            continue;
        };
        if !is_excluded_asset(&url) && !images.contains(&url) {
            images.push(url);
        }
    }
    images
}
