//! Compiled form of [`ProductPageSelectors`]

use scraper::Selector;
use tracing::warn;

use super::config::ProductPageSelectors;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub identifier_meta: Vec<Selector>,
    pub title: Vec<Selector>,
    pub brand: Vec<Selector>,
    pub price: Vec<Selector>,
    pub rating: Vec<Selector>,
    pub review_count: Vec<Selector>,
    pub purchase_action: Vec<Selector>,
    pub detail_table_rows: Vec<Selector>,
    pub detail_list_items: Vec<Selector>,
    pub feature_bullets: Vec<Selector>,
    pub technical_rows: Vec<Selector>,
    pub reviews: Vec<Selector>,
    pub review_title: Vec<Selector>,
    pub review_rating: Vec<Selector>,
    pub review_body: Vec<Selector>,
    pub main_image: Vec<Selector>,
    pub thumbnail_images: Vec<Selector>,
    pub breadcrumb_items: Vec<Selector>,
    pub keywords_meta: Vec<Selector>,
}

impl CompiledSelectors {
    pub fn compile(selectors: &ProductPageSelectors) -> ParsingResult<Self> {
        Ok(Self {
            identifier_meta: compile_selectors(&selectors.identifier_meta)?,
            title: compile_selectors(&selectors.title)?,
            brand: compile_selectors(&selectors.brand)?,
            price: compile_selectors(&selectors.price)?,
            rating: compile_selectors(&selectors.rating)?,
            review_count: compile_selectors(&selectors.review_count)?,
            purchase_action: compile_selectors(&selectors.purchase_action)?,
            detail_table_rows: compile_selectors(&selectors.detail_table_rows)?,
            detail_list_items: compile_selectors(&selectors.detail_list_items)?,
            feature_bullets: compile_selectors(&selectors.feature_bullets)?,
            technical_rows: compile_selectors(&selectors.technical_rows)?,
            reviews: compile_selectors(&selectors.reviews)?,
            review_title: compile_selectors(&selectors.review_title)?,
            review_rating: compile_selectors(&selectors.review_rating)?,
            review_body: compile_selectors(&selectors.review_body)?,
            main_image: compile_selectors(&selectors.main_image)?,
            thumbnail_images: compile_selectors(&selectors.thumbnail_images)?,
            breadcrumb_items: compile_selectors(&selectors.breadcrumb_items)?,
            keywords_meta: compile_selectors(&selectors.keywords_meta)?,
        })
    }
}

/// Compile selector strings, skipping broken ones as long as one survives
pub fn compile_selectors(selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::with_capacity(selector_strings.len());
    let mut first_error: Option<ParsingError> = None;

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                first_error.get_or_insert_with(|| ParsingError::InvalidSelector {
                    selector: selector_str.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    match first_error {
        Some(err) if selectors.is_empty() => Err(err),
        _ => Ok(selectors),
    }
}
