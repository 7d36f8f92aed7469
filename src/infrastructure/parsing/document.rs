//! Parsed product page plus the small DOM helpers every cascade uses

use once_cell::unsync::OnceCell;
use scraper::{ElementRef, Html, Selector};

use crate::domain::services::PageSnapshot;

/// A parsed page. Not `Send`: build it, extract, drop it before awaiting.
pub struct ProductPage {
    url: String,
    html: Html,
    serialized: OnceCell<String>,
}

impl ProductPage {
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            html: Html::parse_document(html),
            serialized: OnceCell::new(),
        }
    }

    pub fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        Self::parse(&snapshot.url, &snapshot.html)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn html(&self) -> &Html {
        &self.html
    }

    /// Whole document re-serialized, computed once
    pub fn serialized(&self) -> &str {
        self.serialized.get_or_init(|| self.html.html())
    }

    /// First element across the selector list, in selector order
    pub fn first_element(&self, selectors: &[Selector]) -> Option<ElementRef<'_>> {
        selectors.iter().find_map(|selector| self.html.select(selector).next())
    }

    pub fn exists(&self, selectors: &[Selector]) -> bool {
        self.first_element(selectors).is_some()
    }

    /// First non-empty cleaned text across the selector list
    pub fn first_text(&self, selectors: &[Selector]) -> Option<String> {
        selectors
            .iter()
            .flat_map(|selector| self.html.select(selector))
            .map(element_text)
            .find(|text| !text.is_empty())
    }

    /// First non-empty attribute value across the selector list
    pub fn first_attr(&self, selectors: &[Selector], attr: &str) -> Option<String> {
        selectors
            .iter()
            .flat_map(|selector| self.html.select(selector))
            .filter_map(|element| element.value().attr(attr))
            .map(clean_text)
            .find(|value| !value.is_empty())
    }

    /// All matches of the first selector that matches anything
    pub fn select_first_matching(&self, selectors: &[Selector]) -> Vec<ElementRef<'_>> {
        for selector in selectors {
            let elements: Vec<_> = self.html.select(selector).collect();
            if !elements.is_empty() {
                return elements;
            }
        }
        Vec::new()
    }
}

/// Cleaned text content of an element
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Collapse whitespace, drop bidi marks and non-breaking spaces
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\u{200e}' | '\u{200f}' | '\u{feff}'))
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
