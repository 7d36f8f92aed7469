//! Product-page classifier
//!
//! URL conventions and markup drift independently, so a page is eligible when
//! the URL matches the product-detail pattern OR at least two structural
//! signals agree.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::document::ProductPage;
use super::identifier;
use super::selectors::CompiledSelectors;

/// Structural signals needed when the URL alone does not match
pub const MIN_STRUCTURAL_SIGNALS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignals {
    pub url_pattern: bool,
    pub price_element: bool,
    pub title_element: bool,
    pub purchase_action: bool,
    pub catalog_code: bool,
}

impl PageSignals {
    pub fn structural_count(&self) -> usize {
        [self.price_element, self.title_element, self.purchase_action, self.catalog_code]
            .into_iter()
            .filter(|s| *s)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub eligible: bool,
    pub signals: PageSignals,
}

impl Classification {
    /// Page could not be inspected; never eligible
    pub fn uncertain() -> Self {
        Self { eligible: false, signals: PageSignals::default() }
    }
}

pub struct PageClassifier {
    selectors: CompiledSelectors,
}

impl PageClassifier {
    pub const fn new(selectors: CompiledSelectors) -> Self {
        Self { selectors }
    }

    pub fn classify(&self, page: &ProductPage) -> Classification {
        let signals = PageSignals {
            url_pattern: identifier::from_url(page.url()).is_some(),
            price_element: page.exists(&self.selectors.price),
            title_element: page.first_text(&self.selectors.title).is_some(),
            purchase_action: page.exists(&self.selectors.purchase_action),
            catalog_code: identifier::page_mentions_code(page.serialized()),
        };
        let eligible = signals.url_pattern || signals.structural_count() >= MIN_STRUCTURAL_SIGNALS;
        debug!(url = page.url(), eligible, ?signals, "classified page");
        Classification { eligible, signals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::parsing::config::ProductPageSelectors;

    fn classifier() -> PageClassifier {
        PageClassifier::new(CompiledSelectors::compile(&ProductPageSelectors::default()).unwrap())
    }

    #[test]
    fn url_pattern_alone_is_enough() {
        let page = ProductPage::parse("https://www.amazon.com/dp/B000TESTAA", "<html><body></body></html>");
        let result = classifier().classify(&page);
        assert!(result.eligible);
        assert_eq!(result.signals.structural_count(), 0);
    }

    #[test]
    fn two_structural_signals_without_url_match() {
        let page = ProductPage::parse(
            "https://www.amazon.com/Widget-Deluxe/something",
            r#"<html><body><span id="productTitle">Widget</span><input id="add-to-cart-button" type="submit"></body></html>"#,
        );
        let result = classifier().classify(&page);
        assert!(result.eligible);
        assert!(result.signals.title_element && result.signals.purchase_action);
    }

    #[test]
    fn single_signal_is_not_enough() {
        let page = ProductPage::parse(
            "https://www.amazon.com/gp/help/customer",
            r#"<html><body><h1>Help Center</h1></body></html>"#,
        );
        let result = classifier().classify(&page);
        assert!(!result.eligible);
        assert_eq!(result.signals.structural_count(), 1);
    }

    #[test]
    fn uncertain_defaults_to_not_eligible() {
        assert!(!Classification::uncertain().eligible);
    }
}
