//! HTML parsing infrastructure for product-detail pages
//!
//! Page classification and field extraction over `scraper` documents. Field
//! lookups are selector cascades whose CSS selectors come from
//! [`ParsingConfig`].

pub mod cascade;
pub mod classifier;
pub mod config;
pub mod document;
pub mod extraction_engine;
pub mod identifier;
pub mod images;
pub mod labeled_rows;
pub mod product_page_parser;
pub mod selectors;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
pub use classifier::{Classification, PageClassifier, PageSignals};
pub use config::{ParsingConfig, ProductPageSelectors};
pub use document::ProductPage;
pub use extraction_engine::{ExtractionEngine, RetryPolicy};
pub use product_page_parser::{ExtractionContext, ProductPageParser};
pub use selectors::CompiledSelectors;

/// Parser trait with context support
pub trait ContextualParser {
    type Output;
    type Context;

    /// Parse a page with contextual information
    fn parse_with_context(&self, page: &ProductPage, context: &Self::Context) -> ParsingResult<Self::Output>;
}
