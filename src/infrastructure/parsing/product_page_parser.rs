//! Single-pass product-page extraction
//!
//! Each field is resolved through its own selector cascade; only the
//! identifier is mandatory. Bounded re-reads of a page that is still loading
//! live in [`super::extraction_engine`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;

use super::cascade::{Cascade, Strategy};
use super::config::ParsingConfig;
use super::document::{ProductPage, clean_text, element_text};
use super::images;
use super::labeled_rows;
use super::selectors::CompiledSelectors;
use super::{ContextualParser, identifier};
use crate::domain::extraction::ExtractionResult;
use crate::domain::product::{CategoryPath, ProductRecord, ReviewSummary};
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

const RANK_LABEL: &str = "Best Sellers Rank";
const DATE_LABEL: &str = "Date First Available";
const BRAND_LABEL: &str = "Brand";
const SEPARATOR_GLYPHS: &[char] = &['›', '‹', '>', '<', '/', '»', '«', '|', '•'];

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("static selector"));
static OG_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[property='og:title']").expect("static selector"));
static ITEMPROP_PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse("[itemprop='price']").expect("static selector"));
static RATING_POPOVER: Lazy<Selector> = Lazy::new(|| Selector::parse("#acrPopover").expect("static selector"));
static VISIT_STORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^visit the (.+?) store$").expect("static regex"));
static BRAND_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^brand\s*:\s*(.+)$").expect("static regex"));

/// Per-call context; the timestamp is supplied so identical DOMs produce
/// identical records
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext {
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionContext {
    pub fn now() -> Self {
        Self { extracted_at: Utc::now() }
    }
}

type FieldStrategy<T> = Strategy<CompiledSelectors, T>;

/// Reads the fields a detail page exposes; `ctx` carries selectors and limits
pub struct FieldContext {
    pub selectors: CompiledSelectors,
    pub max_reviews: usize,
}

pub struct ProductPageParser {
    ctx: FieldContext,
    product_id: Cascade<CompiledSelectors, String>,
    title: Cascade<CompiledSelectors, String>,
    brand: Cascade<CompiledSelectors, String>,
    price: Cascade<CompiledSelectors, String>,
    rating: Cascade<CompiledSelectors, String>,
    review_count: Cascade<CompiledSelectors, String>,
    rank: Cascade<CompiledSelectors, String>,
    availability_date: Cascade<CompiledSelectors, String>,
    features: Cascade<CompiledSelectors, Vec<String>>,
    technical_details: Cascade<CompiledSelectors, BTreeMap<String, String>>,
    reviews: Cascade<FieldContext, Vec<ReviewSummary>>,
    images: Cascade<CompiledSelectors, Vec<String>>,
    keywords: Cascade<CompiledSelectors, Vec<String>>,
    category_path: Cascade<CompiledSelectors, CategoryPath>,
}

impl ProductPageParser {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        let selectors = CompiledSelectors::compile(&config.selectors)?;
        Ok(Self::with_selectors(selectors, config.max_reviews))
    }

    pub fn with_selectors(selectors: CompiledSelectors, max_reviews: usize) -> Self {
        Self {
            ctx: FieldContext { selectors, max_reviews },
            product_id: identifier::cascade(),
            title: Cascade::new("title", vec![
                FieldStrategy::new("title_element", |p, s| p.first_text(&s.title)),
                FieldStrategy::new("og_title", |p, _| p.first_attr(std::slice::from_ref(&*OG_TITLE), "content")),
            ]),
            brand: Cascade::new("brand", vec![
                FieldStrategy::new("byline", |p, s| p.first_text(&s.brand).map(|b| normalize_brand(&b))),
                FieldStrategy::new("detail_row", |p, s| {
                    labeled_rows::from_table_rows(p, &s.technical_rows, BRAND_LABEL)
                        .or_else(|| labeled_rows::from_table_rows(p, &s.detail_table_rows, BRAND_LABEL))
                }),
            ]),
            price: Cascade::new("price", vec![
                FieldStrategy::new("price_element", |p, s| p.first_text(&s.price)),
                FieldStrategy::new("itemprop", |p, _| {
                    p.first_attr(std::slice::from_ref(&*ITEMPROP_PRICE), "content")
                        .or_else(|| p.first_text(std::slice::from_ref(&*ITEMPROP_PRICE)))
                }),
            ]),
            rating: Cascade::new("rating", vec![
                FieldStrategy::new("rating_text", |p, s| p.first_text(&s.rating)),
                FieldStrategy::new("popover_title", |p, _| p.first_attr(std::slice::from_ref(&*RATING_POPOVER), "title")),
            ]),
            review_count: Cascade::new("review_count", vec![
                FieldStrategy::new("review_count_text", |p, s| p.first_text(&s.review_count).map(|t| digits_only(&t))),
            ]),
            rank: Cascade::new("rank", vec![
                FieldStrategy::new("table_row", |p, s| labeled_rows::from_table_rows(p, &s.detail_table_rows, RANK_LABEL)),
                FieldStrategy::new("list_item", |p, s| labeled_rows::from_list_items(p, &s.detail_list_items, RANK_LABEL)),
                FieldStrategy::new("text_split", |p, s| {
                    labeled_rows::from_text_split(p, &[&s.detail_table_rows, &s.detail_list_items], RANK_LABEL)
                }),
            ]),
            availability_date: Cascade::new("availability_date", vec![
                FieldStrategy::new("table_row", |p, s| labeled_rows::from_table_rows(p, &s.detail_table_rows, DATE_LABEL)),
                FieldStrategy::new("list_item", |p, s| labeled_rows::from_list_items(p, &s.detail_list_items, DATE_LABEL)),
                FieldStrategy::new("text_split", |p, s| {
                    labeled_rows::from_text_split(p, &[&s.detail_table_rows, &s.detail_list_items], DATE_LABEL)
                }),
            ]),
            features: Cascade::new("features", vec![
                FieldStrategy::new("feature_bullets", |p, s| Some(feature_bullets(p, &s.feature_bullets))),
            ]),
            technical_details: Cascade::new("technical_details", vec![
                FieldStrategy::new("tech_spec_table", |p, s| Some(labeled_rows::all_pairs(p, &s.technical_rows).into_iter().collect())),
                FieldStrategy::new("detail_table", |p, s| Some(labeled_rows::all_pairs(p, &s.detail_table_rows).into_iter().collect())),
            ]),
            reviews: Cascade::new("reviews", vec![Strategy::new("review_blocks", review_blocks)]),
            images: Cascade::new("images", vec![
                FieldStrategy::new("image_block", |p, s| Some(images::collect_images(p, &s.main_image, &s.thumbnail_images))),
            ]),
            keywords: Cascade::new("keywords", vec![
                FieldStrategy::new("keywords_meta", |p, s| p.first_attr(&s.keywords_meta, "content").map(|raw| split_keywords(&raw))),
            ]),
            category_path: Cascade::new("category_path", vec![
                FieldStrategy::new("breadcrumb_anchors", breadcrumb_anchors),
                FieldStrategy::new("breadcrumb_items", breadcrumb_items),
            ]),
        }
    }

    pub const fn selectors(&self) -> &CompiledSelectors {
        &self.ctx.selectors
    }

    /// Parse once and classify the result; never fails, failures are values
    pub fn extract(&self, page: &ProductPage, context: &ExtractionContext) -> ExtractionResult {
        match self.parse_with_context(page, context) {
            Ok(record) => ExtractionResult::from_record(record),
            Err(ParsingError::RequiredFieldMissing { .. }) => ExtractionResult::failure("no identifier"),
            Err(err) => ExtractionResult::failure(err.to_string()),
        }
    }
}

impl ContextualParser for ProductPageParser {
    type Output = ProductRecord;
    type Context = ExtractionContext;

    fn parse_with_context(&self, page: &ProductPage, context: &Self::Context) -> ParsingResult<Self::Output> {
        let sel = &self.ctx.selectors;
        let (strategy, product_id) = self
            .product_id
            .resolve_named(page, sel)
            .ok_or_else(|| ParsingError::required_field_missing("product_id", &self.product_id.strategy_names()))?;
        debug!(url = page.url(), %product_id, strategy, "resolved identifier");

        let mut record = ProductRecord::new(product_id, page.url(), context.extracted_at);
        record.title = self.title.resolve(page, sel);
        record.brand = self.brand.resolve(page, sel);
        record.price = self.price.resolve(page, sel);
        record.rating = self.rating.resolve(page, sel);
        record.review_count = self.review_count.resolve(page, sel);
        record.rank = self.rank.resolve(page, sel);
        record.availability_date = self.availability_date.resolve(page, sel);
        record.features = self.features.resolve(page, sel).unwrap_or_default();
        record.technical_details = self.technical_details.resolve(page, sel).unwrap_or_default();
        record.reviews = self.reviews.resolve(page, &self.ctx).unwrap_or_default();
        record.images = self.images.resolve(page, sel).unwrap_or_default();
        record.keywords = self.keywords.resolve(page, sel).unwrap_or_default();
        record.category_path = self.category_path.resolve(page, sel).unwrap_or_default();

        Ok(record)
    }
}

/// "Visit the Acme Store" / "Brand: Acme" -> "Acme"
fn normalize_brand(raw: &str) -> String {
    let raw = raw.trim();
    VISIT_STORE
        .captures(raw)
        .or_else(|| BRAND_PREFIX.captures(raw))
        .map_or_else(|| raw.to_string(), |caps| caps[1].trim().to_string())
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn feature_bullets(page: &ProductPage, selectors: &[Selector]) -> Vec<String> {
    let mut features: Vec<String> = Vec::new();
    for text in page.select_first_matching(selectors).into_iter().map(element_text) {
        if text.is_empty() || text.to_lowercase().contains("warranty") || features.contains(&text) {
            continue;
        }
        features.push(text);
    }
    features
}

fn split_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.split(',').map(clean_text).filter(|k| !k.is_empty()) {
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

fn first_text_within(block: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|s| block.select(s))
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn review_blocks(page: &ProductPage, ctx: &FieldContext) -> Option<Vec<ReviewSummary>> {
    let sel = &ctx.selectors;
    let reviews = page
        .select_first_matching(&sel.reviews)
        .into_iter()
        .map(|block| ReviewSummary {
            title: first_text_within(block, &sel.review_title),
            rating: first_text_within(block, &sel.review_rating),
            body: first_text_within(block, &sel.review_body),
        })
        .filter(|r| r.title.is_some() || r.body.is_some())
        .take(ctx.max_reviews)
        .collect();
    Some(reviews)
}

fn is_separator(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || SEPARATOR_GLYPHS.contains(&c))
}

fn breadcrumb_anchors(page: &ProductPage, sel: &CompiledSelectors) -> Option<CategoryPath> {
    let entries: Vec<String> = page
        .select_first_matching(&sel.breadcrumb_items)
        .into_iter()
        .flat_map(|item| item.select(&ANCHOR).map(element_text).collect::<Vec<_>>())
        .filter(|text| !is_separator(text))
        .collect();
    Some(CategoryPath::new(entries))
}

fn breadcrumb_items(page: &ProductPage, sel: &CompiledSelectors) -> Option<CategoryPath> {
    let entries: Vec<String> = page
        .select_first_matching(&sel.breadcrumb_items)
        .into_iter()
        .map(element_text)
        .filter(|text| !is_separator(text))
        .collect();
    Some(CategoryPath::new(entries))
}
