use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured product record extracted from a product-detail page
///
/// `product_id` is the retailer's catalog identifier and the key for the
/// local cache and the dedup set. A newer record for the same identifier
/// replaces the older one as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "asin")]
    pub product_id: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub rank: Option<String>,
    pub availability_date: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub technical_details: BTreeMap<String, String>,
    #[serde(default)]
    pub reviews: Vec<ReviewSummary>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category_path: CategoryPath,
    pub url: String,
    pub extracted_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Empty record for an identifier; fields are filled by the extractor
    pub fn new(product_id: impl Into<String>, url: impl Into<String>, extracted_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.into(),
            title: None,
            brand: None,
            price: None,
            rating: None,
            review_count: None,
            rank: None,
            availability_date: None,
            features: Vec::new(),
            technical_details: BTreeMap::new(),
            reviews: Vec::new(),
            images: Vec::new(),
            keywords: Vec::new(),
            category_path: CategoryPath::default(),
            url: url.into(),
            extracted_at,
        }
    }

    /// Primary image, if any
    pub fn image_url(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Single customer review as shown on the product page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub title: Option<String>,
    pub rating: Option<String>,
    pub body: Option<String>,
}

/// Ordered breadcrumb trail, broad to narrow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryPath(Vec<String>);

impl CategoryPath {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Top-level category (first breadcrumb)
    pub fn main_category(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Everything below the top level
    pub fn sub_categories(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    /// Backend shape: `{ main_category, sub_categories }`
    pub fn hierarchy(&self) -> Option<CategoryHierarchy> {
        self.main_category().map(|main| CategoryHierarchy {
            main_category: main.to_string(),
            sub_categories: self.sub_categories().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHierarchy {
    pub main_category: String,
    pub sub_categories: Vec<String>,
}

/// Scores and free-text sections returned by the analysis capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub product_id: String,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Cache row: latest record plus its analysis state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProduct {
    pub record: ProductRecord,
    pub analyzed: bool,
    pub analysis: Option<AnalysisRecord>,
    pub updated_at: DateTime<Utc>,
}
