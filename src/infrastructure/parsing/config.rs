//! Parsing configuration for product-page extraction
//!
//! Every cascade is driven by an ordered list of CSS selectors. Markup drifts
//! across template versions, locales and experiments, so selectors are data
//! that can be overridden from the config file.

use serde::{Deserialize, Serialize};

/// Main parsing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Attempts the engine makes before accepting a partial record
    pub max_attempts: u32,

    /// Fixed delay between extraction attempts
    pub retry_backoff_ms: u64,

    /// Upper bound on review summaries kept per record
    pub max_reviews: usize,

    pub selectors: ProductPageSelectors,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 1500,
            max_reviews: 10,
            selectors: ProductPageSelectors::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// CSS selectors for product-detail pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPageSelectors {
    /// Hidden metadata carrying the catalog identifier (value or data-asin)
    pub identifier_meta: Vec<String>,
    pub title: Vec<String>,
    pub brand: Vec<String>,
    pub price: Vec<String>,
    pub rating: Vec<String>,
    pub review_count: Vec<String>,
    pub purchase_action: Vec<String>,

    /// Table rows of the product-details section (th/td pairs)
    pub detail_table_rows: Vec<String>,
    /// Flat list items of the detail-bullets section (bold label + value)
    pub detail_list_items: Vec<String>,

    pub feature_bullets: Vec<String>,
    pub technical_rows: Vec<String>,
    pub reviews: Vec<String>,
    pub review_title: Vec<String>,
    pub review_rating: Vec<String>,
    pub review_body: Vec<String>,

    pub main_image: Vec<String>,
    pub thumbnail_images: Vec<String>,

    pub breadcrumb_items: Vec<String>,
    pub keywords_meta: Vec<String>,
}

impl Default for ProductPageSelectors {
    fn default() -> Self {
        Self {
            identifier_meta: strings(&[
                "input#ASIN",
                "input[name='ASIN']",
                "input[name='asin']",
                "#averageCustomerReviews[data-asin]",
                "div[data-asin]",
            ]),
            title: strings(&[
                "#productTitle",
                "#title",
                "h1.product-title-word-break",
                "h1#title span",
                "h1",
            ]),
            brand: strings(&[
                "#bylineInfo",
                "a#brand",
                "#brand",
                "tr.po-brand td.a-span9 span",
            ]),
            price: strings(&[
                "#corePrice_feature_div .a-price .a-offscreen",
                "#corePriceDisplay_desktop_feature_div .a-price .a-offscreen",
                "#priceblock_ourprice",
                "#priceblock_dealprice",
                "#price_inside_buybox",
                ".a-price .a-offscreen",
                "#price",
            ]),
            rating: strings(&[
                "#acrPopover span.a-icon-alt",
                "span[data-hook='rating-out-of-text']",
                "i.a-icon-star span.a-icon-alt",
                "#averageCustomerReviews .a-icon-alt",
            ]),
            review_count: strings(&[
                "#acrCustomerReviewText",
                "span[data-hook='total-review-count']",
                "#averageCustomerReviews #acrCustomerReviewLink span",
            ]),
            purchase_action: strings(&[
                "#add-to-cart-button",
                "#buy-now-button",
                "input[name='submit.add-to-cart']",
                "#addToCart",
            ]),
            detail_table_rows: strings(&[
                "#productDetails_detailBullets_sections1 tr",
                "#productDetails_db_sections tr",
                "#prodDetails tr",
                "table.prodDetTable tr",
            ]),
            detail_list_items: strings(&[
                "#detailBullets_feature_div li",
                "#detailBulletsWrapper_feature_div li",
                "#detail-bullets li",
                "#SalesRank",
            ]),
            feature_bullets: strings(&[
                "#feature-bullets ul li span.a-list-item",
                "#feature-bullets li",
                "#featurebullets_feature_div li",
            ]),
            technical_rows: strings(&[
                "#productDetails_techSpec_section_1 tr",
                "#technicalSpecifications_section_1 tr",
                "#productOverview_feature_div tr",
            ]),
            reviews: strings(&["[data-hook='review']", "div.review"]),
            review_title: strings(&["[data-hook='review-title'] span:not(.a-icon-alt)", "[data-hook='review-title']"]),
            review_rating: strings(&["[data-hook='review-star-rating'] .a-icon-alt", "i.review-rating .a-icon-alt"]),
            review_body: strings(&["[data-hook='review-body'] span", "[data-hook='review-body']"]),
            main_image: strings(&["#landingImage", "#imgBlkFront", "#main-image", "#imgTagWrapperId img"]),
            thumbnail_images: strings(&["#altImages img", ".imageThumbnail img", "#imageBlockThumbs img"]),
            breadcrumb_items: strings(&[
                "#wayfinding-breadcrumbs_feature_div ul li",
                "#wayfinding-breadcrumbs_container ul li",
                "nav.breadcrumb li",
                "ol.breadcrumb li",
            ]),
            keywords_meta: strings(&["meta[name='keywords']"]),
        }
    }
}
