use serde::{Deserialize, Serialize};
use std::fmt;

use super::product::ProductRecord;

/// Presentation fields whose absence makes an extraction partial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    Title,
    Price,
    Rank,
    AvailabilityDate,
}

impl ProductField {
    pub const TRACKED: [Self; 4] = [Self::Title, Self::Price, Self::Rank, Self::AvailabilityDate];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Price => "price",
            Self::Rank => "rank",
            Self::AvailabilityDate => "availability_date",
        }
    }

    /// Whether the field is populated on the record
    pub fn is_present(self, record: &ProductRecord) -> bool {
        let value = match self {
            Self::Title => &record.title,
            Self::Price => &record.price,
            Self::Rank => &record.rank,
            Self::AvailabilityDate => &record.availability_date,
        };
        value.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of extracting one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success { record: ProductRecord },
    PartialSuccess { record: ProductRecord, missing: Vec<ProductField> },
    Failure { reason: String },
}

impl ExtractionResult {
    /// Classify a record by which tracked fields are missing
    pub fn from_record(record: ProductRecord) -> Self {
        let missing: Vec<ProductField> = ProductField::TRACKED
            .into_iter()
            .filter(|field| !field.is_present(&record))
            .collect();

        if missing.is_empty() {
            Self::Success { record }
        } else {
            Self::PartialSuccess { record, missing }
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    pub fn record(&self) -> Option<&ProductRecord> {
        match self {
            Self::Success { record } | Self::PartialSuccess { record, .. } => Some(record),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_record(self) -> Option<ProductRecord> {
        match self {
            Self::Success { record } | Self::PartialSuccess { record, .. } => Some(record),
            Self::Failure { .. } => None,
        }
    }

    pub fn missing_fields(&self) -> &[ProductField] {
        match self {
            Self::PartialSuccess { missing, .. } => missing,
            _ => &[],
        }
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Secondary content may still be loading: identifier and title are
    /// present but rank or availability date is not.
    pub fn awaits_secondary_content(&self) -> bool {
        match self {
            Self::PartialSuccess { missing, .. } => {
                !missing.contains(&ProductField::Title)
                    && (missing.contains(&ProductField::Rank) || missing.contains(&ProductField::AvailabilityDate))
            }
            _ => false,
        }
    }
}

/// Wire shape of the extract reply: `{success, record?, error?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ProductRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<ProductField>,
}

impl From<ExtractionResult> for ExtractResponse {
    fn from(result: ExtractionResult) -> Self {
        match result {
            ExtractionResult::Success { record } => Self { success: true, record: Some(record), error: None, missing: Vec::new() },
            ExtractionResult::PartialSuccess { record, missing } => Self { success: true, record: Some(record), error: None, missing },
            ExtractionResult::Failure { reason } => Self { success: false, record: None, error: Some(reason), missing: Vec::new() },
        }
    }
}

impl From<ExtractResponse> for ExtractionResult {
    fn from(response: ExtractResponse) -> Self {
        match (response.success, response.record) {
            (true, Some(record)) if response.missing.is_empty() => Self::Success { record },
            (true, Some(record)) => Self::PartialSuccess { record, missing: response.missing },
            (_, _) => Self::Failure {
                reason: response.error.unwrap_or_else(|| "empty extract response".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> ProductRecord {
        let mut record = ProductRecord::new("B000TESTAA", "https://example.com/dp/B000TESTAA", Utc::now());
        record.title = Some("Widget".into());
        record.price = Some("$19.99".into());
        record
    }

    #[test]
    fn missing_rank_and_date_is_partial_and_awaits_content() {
        let result = ExtractionResult::from_record(record());
        assert_eq!(result.missing_fields(), [ProductField::Rank, ProductField::AvailabilityDate]);
        assert!(result.awaits_secondary_content());
    }

    #[test]
    fn missing_title_does_not_await_secondary_content() {
        let mut r = record();
        r.title = None;
        let result = ExtractionResult::from_record(r);
        assert!(!result.awaits_secondary_content());
    }

    #[test]
    fn complete_record_is_success() {
        let mut r = record();
        r.rank = Some("#1 in Tools".into());
        r.availability_date = Some("March 3, 2021".into());
        assert!(matches!(ExtractionResult::from_record(r), ExtractionResult::Success { .. }));
    }

    #[test]
    fn response_wire_shape_survives_conversion() {
        let result = ExtractionResult::from_record(record());
        let response = ExtractResponse::from(result.clone());
        assert!(response.success);
        assert_eq!(ExtractionResult::from(response), result);

        let failure = ExtractResponse::from(ExtractionResult::failure("no identifier"));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no identifier");
        assert!(json.get("record").is_none());
    }
}
