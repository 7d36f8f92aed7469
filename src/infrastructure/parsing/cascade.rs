//! Selector cascades: ordered strategy lists, first non-empty result wins

use std::collections::BTreeMap;

use tracing::trace;

use super::document::ProductPage;
use crate::domain::product::CategoryPath;

/// Values a strategy may produce; blank values fall through to the next one
pub trait Presence {
    fn is_blank(&self) -> bool;
}

impl Presence for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> Presence for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Presence for BTreeMap<K, V> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Presence for CategoryPath {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// A pure extraction function over the page and shared context `C`
pub struct Strategy<C, T> {
    pub name: &'static str,
    pub run: fn(&ProductPage, &C) -> Option<T>,
}

impl<C, T> Strategy<C, T> {
    pub const fn new(name: &'static str, run: fn(&ProductPage, &C) -> Option<T>) -> Self {
        Self { name, run }
    }
}

pub struct Cascade<C, T> {
    field: &'static str,
    strategies: Vec<Strategy<C, T>>,
}

impl<C, T: Presence> Cascade<C, T> {
    pub const fn new(field: &'static str, strategies: Vec<Strategy<C, T>>) -> Self {
        Self { field, strategies }
    }

    pub const fn field(&self) -> &'static str {
        self.field
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }

    /// Value from the first strategy that yields something non-blank
    pub fn resolve(&self, page: &ProductPage, ctx: &C) -> Option<T> {
        self.resolve_named(page, ctx).map(|(_, value)| value)
    }

    pub fn resolve_named(&self, page: &ProductPage, ctx: &C) -> Option<(&'static str, T)> {
        for strategy in &self.strategies {
            match (strategy.run)(page, ctx) {
                Some(value) if !value.is_blank() => {
                    trace!(field = self.field, strategy = strategy.name, "cascade hit");
                    return Some((strategy.name, value));
                }
                _ => {}
            }
        }
        trace!(field = self.field, tried = self.strategies.len(), "cascade exhausted");
        None
    }
}
