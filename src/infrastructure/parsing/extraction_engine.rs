//! Extraction engine: classification plus bounded re-extraction
//!
//! Secondary sections (detail bullets, ranks) often render after the title,
//! so a record that has its identifier and title but no rank or date is
//! re-read from a fresh snapshot. The loop is bounded by [`RetryPolicy`].

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::ContextualParser;
use super::classifier::{Classification, PageClassifier};
use super::config::ParsingConfig;
use super::document::ProductPage;
use super::product_page_parser::{ExtractionContext, ProductPageParser};
use crate::domain::extraction::ExtractionResult;
use crate::domain::product::ProductRecord;
use crate::domain::services::{PageSnapshot, PageSource};
use crate::infrastructure::parsing_error::ParsingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(1500) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ParsingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Whether `result`, produced by attempt number `attempt` (1-based),
    /// warrants another snapshot
    pub fn should_retry(&self, attempt: u32, result: &ExtractionResult) -> bool {
        attempt < self.max_attempts && (result.is_failure() || result.awaits_secondary_content())
    }
}

pub struct ExtractionEngine {
    parser: ProductPageParser,
    classifier: PageClassifier,
    policy: RetryPolicy,
}

impl ExtractionEngine {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        let parser = ProductPageParser::new(config)?;
        let classifier = PageClassifier::new(parser.selectors().clone());
        Ok(Self { parser, classifier, policy: RetryPolicy::from_config(config) })
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn classify_snapshot(&self, snapshot: &PageSnapshot) -> Classification {
        self.classifier.classify(&ProductPage::from_snapshot(snapshot))
    }

    /// Single pass over one snapshot
    pub fn extract_snapshot(&self, snapshot: &PageSnapshot, context: &ExtractionContext) -> ExtractionResult {
        self.parser.extract(&ProductPage::from_snapshot(snapshot), context)
    }

    /// Single pass that surfaces the identifier failure as an error
    pub fn parse_snapshot(&self, snapshot: &PageSnapshot, context: &ExtractionContext) -> ParsingResult<ProductRecord> {
        self.parser.parse_with_context(&ProductPage::from_snapshot(snapshot), context)
    }

    /// Snapshot and classify; an unreadable page is never eligible
    pub async fn check_eligibility(&self, source: &dyn PageSource) -> Classification {
        match source.snapshot().await {
            Ok(snapshot) => self.classify_snapshot(&snapshot),
            Err(e) => {
                warn!(url = source.url(), error = %e, "page could not be inspected");
                Classification::uncertain()
            }
        }
    }

    /// Extract with bounded re-snapshotting; the last result is accepted
    /// once the attempt ceiling is reached
    pub async fn extract_with_retry(&self, source: &dyn PageSource) -> ExtractionResult {
        let context = ExtractionContext { extracted_at: Utc::now() };
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = match source.snapshot().await {
                Ok(snapshot) => self.extract_snapshot(&snapshot, &context),
                Err(e) if e.is_recoverable() => ExtractionResult::failure(e.to_string()),
                Err(e) => {
                    warn!(url = source.url(), error = %e, "snapshot failed permanently");
                    return ExtractionResult::failure(e.to_string());
                }
            };

            if !self.policy.should_retry(attempt, &result) {
                if attempt > 1 {
                    info!(url = source.url(), attempt, failed = result.is_failure(), "extraction settled after retries");
                }
                return result;
            }

            debug!(
                url = source.url(),
                attempt,
                max_attempts = self.policy.max_attempts,
                missing = ?result.missing_fields(),
                "page not settled, re-reading after backoff"
            );
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}
