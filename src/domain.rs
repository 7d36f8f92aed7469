//! Domain layer: product records, extraction outcomes, sync events and the
//! service seams the pipeline is wired through.

pub mod events;
pub mod extraction;
pub mod product;
pub mod services;

pub use events::{EntryState, SyncEvent, SyncStats};
pub use extraction::{ExtractResponse, ExtractionResult, ProductField};
pub use product::{AnalysisRecord, CachedProduct, CategoryHierarchy, CategoryPath, ProductRecord, ReviewSummary};
pub use services::{CollectionService, PageSnapshot, PageSource, ProductSubmission, RemoteProduct};
