//! Lookup of "Label: value" rows in product-detail sections
//!
//! Detail sections come in two shapes: a table (`th` label, `td` value) and a
//! flat bullet list (bold label span followed by the value). When neither
//! shape yields a value, the item's text is split on the label.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Node, Selector};

use super::document::{ProductPage, clean_text, element_text};

static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").expect("static selector"));
static LIST_LABEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span.a-text-bold, b, strong").expect("static selector"));
static LABEL_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s:：\-–]+|[\s:：\-–]+$").expect("static regex"));

fn trim_label_punctuation(text: &str) -> String {
    LABEL_PUNCTUATION.replace_all(text, "").into_owned()
}

fn label_matches(candidate: &str, label: &str) -> bool {
    candidate.to_lowercase().contains(&label.to_lowercase())
}

/// Table-row shape: first cell is the label, last cell is the value
pub fn from_table_rows(page: &ProductPage, rows: &[Selector], label: &str) -> Option<String> {
    rows.iter()
        .flat_map(|selector| page.html().select(selector))
        .find_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            if cells.len() < 2 || !label_matches(&element_text(cells[0]), label) {
                return None;
            }
            let value = trim_label_punctuation(&element_text(cells[cells.len() - 1]));
            (!value.is_empty()).then_some(value)
        })
}

/// Flat-list shape: bold label followed by sibling nodes holding the value
pub fn from_list_items(page: &ProductPage, items: &[Selector], label: &str) -> Option<String> {
    items
        .iter()
        .flat_map(|selector| page.html().select(selector))
        .find_map(|item| {
            let label_el = item.select(&LIST_LABEL).find(|el| label_matches(&element_text(*el), label))?;
            let value = trim_label_punctuation(&sibling_text(label_el));
            (!value.is_empty()).then_some(value)
        })
}

/// Text of every node after `element` within its parent
fn sibling_text(element: ElementRef<'_>) -> String {
    let raw: Vec<String> = element
        .next_siblings()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(text.to_string()),
            Node::Element(_) => ElementRef::wrap(node).map(|el| el.text().collect::<String>()),
            _ => None,
        })
        .collect();
    clean_text(&raw.join(" "))
}

/// Last resort: split the item's text on the label, keep the remainder
pub fn from_text_split(page: &ProductPage, containers: &[&[Selector]], label: &str) -> Option<String> {
    let splitter = Regex::new(&format!(r"(?i){}", regex::escape(label))).ok()?;
    containers
        .iter()
        .flat_map(|selectors| selectors.iter())
        .flat_map(|selector| page.html().select(selector))
        .map(element_text)
        .find_map(|text| {
            let remainder = splitter.splitn(&text, 2).nth(1)?;
            let value = trim_label_punctuation(remainder);
            (!value.is_empty()).then_some(value)
        })
}

/// Full lookup: table rows, then list items, then text split
pub fn labeled_value(page: &ProductPage, table_rows: &[Selector], list_items: &[Selector], label: &str) -> Option<String> {
    from_table_rows(page, table_rows, label)
        .or_else(|| from_list_items(page, list_items, label))
        .or_else(|| from_text_split(page, &[table_rows, list_items], label))
}

/// Every label/value pair from a set of two-cell rows, in document order
pub fn all_pairs(page: &ProductPage, rows: &[Selector]) -> Vec<(String, String)> {
    page.select_first_matching(rows)
        .into_iter()
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            if cells.len() < 2 {
                return None;
            }
            let key = trim_label_punctuation(&element_text(cells[0]));
            let value = element_text(cells[cells.len() - 1]);
            (!key.is_empty() && !value.is_empty()).then_some((key, value))
        })
        .collect()
}
