//! Application layer: page agents and the sync orchestrator
//!
//! Page agents own a page and answer eligibility/extraction requests; the
//! orchestrator owns every piece of sync state. The two only talk over
//! channels.

pub mod dedup;
pub mod orchestrator;
pub mod page_agent;
pub mod queue;
pub mod rate_limiter;

pub use orchestrator::{AnalyzeOutcome, EnqueueOutcome, OrchestratorHandle, OrchestratorSettings, SyncOrchestrator};
pub use page_agent::{PageAgent, PageHandle};
pub use rate_limiter::OutboundRateLimiter;
