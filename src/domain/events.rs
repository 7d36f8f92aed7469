//! Events and derived counters published by the sync orchestrator
//!
//! Listeners subscribe to a broadcast of [`SyncEvent`]s; the visible counters
//! are a separate read-only projection ([`SyncStats`]) recomputed from the
//! cache after every cache change.

use serde::{Deserialize, Serialize};

use super::extraction::ProductField;

/// Lifecycle of a queued page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Extracting,
    Sent,
    Deduplicated,
    Discarded,
}

impl EntryState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Deduplicated | Self::Discarded)
    }
}

/// Counters shown to the user, derived from the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub cached_products: u64,
    pub analyzed_products: u64,
}

impl SyncStats {
    /// Badge text: number of analyzed products, empty when zero
    pub fn badge_text(&self) -> String {
        if self.analyzed_products == 0 {
            String::new()
        } else {
            self.analyzed_products.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Enqueued { url: String },
    CooldownSkipped { url: String },
    NotEligible { url: String },
    Extracted { product_id: String },
    PartialExtraction { product_id: String, missing: Vec<ProductField> },
    Deduplicated { product_id: String },
    Discarded { url: String, reason: String },
    Delivered { product_id: String },
    DeliveryFailed { product_id: String, error: String },
    AuthExpired { product_id: String },
    Analyzed { product_id: String },
}

impl SyncEvent {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::CooldownSkipped { .. } => "cooldown-skipped",
            Self::NotEligible { .. } => "not-eligible",
            Self::Extracted { .. } => "extracted",
            Self::PartialExtraction { .. } => "partial-extraction",
            Self::Deduplicated { .. } => "deduplicated",
            Self::Discarded { .. } => "discarded",
            Self::Delivered { .. } => "delivered",
            Self::DeliveryFailed { .. } => "delivery-failed",
            Self::AuthExpired { .. } => "auth-expired",
            Self::Analyzed { .. } => "analyzed",
        }
    }
}
