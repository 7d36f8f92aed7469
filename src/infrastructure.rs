//! Infrastructure layer: parsing, persistence, remote service and page sources

pub mod collection_client;
pub mod config;
pub mod database_connection;
pub mod logging;
pub mod page_sources;
pub mod parsing;
pub mod parsing_error;
pub mod product_cache;
pub mod sync_error;
pub mod sync_state_repository;

pub use collection_client::CollectionClient;
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use logging::{init_logging, init_logging_with_config};
pub use page_sources::{FetchedPage, StaticPage};
pub use parsing::{ExtractionEngine, ParsingConfig};
pub use parsing_error::{ParsingError, ParsingResult};
pub use product_cache::{MergeOutcome, ProductCache};
pub use sync_error::{SyncError, SyncResult};
pub use sync_state_repository::SyncStateRepository;
