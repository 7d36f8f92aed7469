//! Seams to the outside world: where pages come from and where records go

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::product::{AnalysisRecord, CategoryHierarchy, ProductRecord};
use crate::infrastructure::parsing_error::ParsingError;
use crate::infrastructure::sync_error::SyncError;

/// Serialized page as seen at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self { url: url.into(), html: html.into() }
    }
}

/// Provider of the current page DOM
///
/// Every call returns the page as it is *now*; content that loads late shows
/// up in later snapshots.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn url(&self) -> &str;

    async fn snapshot(&self) -> Result<PageSnapshot, ParsingError>;
}

/// Body sent to `POST /products` and `POST /products/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSubmission {
    #[serde(flatten)]
    pub record: ProductRecord,
    pub project_id: String,
    pub user_id: String,
    pub breadcrumbs: Vec<String>,
    pub category_hierarchy: Option<CategoryHierarchy>,
    pub image_url: Option<String>,
}

impl ProductSubmission {
    pub fn new(record: ProductRecord, project_id: &str, user_id: &str) -> Self {
        Self {
            breadcrumbs: record.category_path.entries().to_vec(),
            category_hierarchy: record.category_path.hierarchy(),
            image_url: record.image_url().map(str::to_string),
            record,
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Identifier the remote service assigned to a submitted product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
}

/// Remote collection service
#[async_trait]
pub trait CollectionService: Send + Sync {
    async fn submit_product(&self, submission: &ProductSubmission) -> Result<RemoteProduct, SyncError>;

    /// Scoring is delegated entirely to the remote side
    async fn analyze_product(&self, submission: &ProductSubmission) -> Result<AnalysisRecord, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::CategoryPath;
    use chrono::Utc;

    #[test]
    fn submission_carries_breadcrumbs_and_hierarchy() {
        let mut record = ProductRecord::new("B000TESTAA", "https://example.com/dp/B000TESTAA", Utc::now());
        record.category_path = CategoryPath::new(vec!["Home".into(), "Tools".into()]);
        record.images = vec!["https://m.media-amazon.com/images/I/1.jpg".into()];

        let submission = ProductSubmission::new(record, "project-1", "user-1");
        let json = serde_json::to_value(&submission).unwrap();

        assert_eq!(json["asin"], "B000TESTAA");
        assert_eq!(json["project_id"], "project-1");
        assert_eq!(json["breadcrumbs"][1], "Tools");
        assert_eq!(json["category_hierarchy"]["main_category"], "Home");
        assert_eq!(json["image_url"], "https://m.media-amazon.com/images/I/1.jpg");
    }
}
