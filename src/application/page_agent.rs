//! Page agents: one task per open page
//!
//! An agent owns its [`PageSource`] and answers requests one at a time. The
//! orchestrator only ever talks to it through a [`PageHandle`]; nothing
//! crosses that boundary except typed requests and replies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::extraction::{ExtractResponse, ExtractionResult};
use crate::domain::services::PageSource;
use crate::infrastructure::parsing::{Classification, ExtractionEngine};
use crate::infrastructure::parsing_error::ParsingError;

const REQUEST_BUFFER: usize = 8;

#[derive(Debug)]
pub enum PageRequest {
    CheckEligible { reply: oneshot::Sender<Classification> },
    Extract { reply: oneshot::Sender<ExtractResponse> },
    Close,
}

/// Cloneable address of a page agent
#[derive(Debug, Clone)]
pub struct PageHandle {
    id: Uuid,
    url: String,
    tx: mpsc::Sender<PageRequest>,
}

impl PageHandle {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Eligibility round-trip; timeouts and closed pages count as uncertain
    pub async fn check_eligible(&self, limit: Duration) -> Classification {
        let deadline = Instant::now() + limit;
        let (reply, rx) = oneshot::channel();
        let round_trip = async {
            self.tx.send(PageRequest::CheckEligible { reply }).await.ok()?;
            rx.await.ok()
        };
        match timeout_at(deadline, round_trip).await {
            Ok(Some(classification)) => classification,
            Ok(None) => Classification::uncertain(),
            Err(_) => {
                debug!(url = %self.url, "eligibility check timed out");
                Classification::uncertain()
            }
        }
    }

    /// Extraction round-trip; transport problems become `Failure`
    pub async fn extract(&self, limit: Duration) -> ExtractionResult {
        let closed = || ExtractionResult::failure(ParsingError::PageClosed { url: self.url.clone() }.to_string());

        let deadline = Instant::now() + limit;
        let (reply, rx) = oneshot::channel();
        let round_trip = async {
            self.tx.send(PageRequest::Extract { reply }).await.ok()?;
            rx.await.ok()
        };
        match timeout_at(deadline, round_trip).await {
            Ok(Some(response)) => ExtractionResult::from(response),
            Ok(None) => closed(),
            Err(_) => ExtractionResult::failure(
                ParsingError::PageTimeout {
                    url: self.url.clone(),
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }
                .to_string(),
            ),
        }
    }

    /// Handle over a bare channel, for exercising queue logic without an agent
    #[cfg(test)]
    pub(crate) fn detached(url: &str, tx: mpsc::Sender<PageRequest>) -> Self {
        Self { id: Uuid::new_v4(), url: url.to_string(), tx }
    }

    /// Ask the agent to stop; pending requests still get answered first
    pub async fn close(&self) {
        let _ = self.tx.send(PageRequest::Close).await;
    }
}

pub struct PageAgent {
    id: Uuid,
    source: Box<dyn PageSource>,
    engine: Arc<ExtractionEngine>,
    rx: mpsc::Receiver<PageRequest>,
}

impl PageAgent {
    /// Start an agent for `source`; it stops when every handle is dropped or
    /// on [`PageHandle::close`]
    pub fn spawn(source: impl PageSource + 'static, engine: Arc<ExtractionEngine>) -> (PageHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let id = Uuid::new_v4();
        let handle = PageHandle { id, url: source.url().to_string(), tx };
        let agent = Self { id, source: Box::new(source), engine, rx };
        (handle, tokio::spawn(agent.run()))
    }

    async fn run(mut self) {
        debug!(page = %self.id, url = self.source.url(), "page agent started");
        while let Some(request) = self.rx.recv().await {
            match request {
                PageRequest::CheckEligible { reply } => {
                    let classification = self.engine.check_eligibility(self.source.as_ref()).await;
                    let _ = reply.send(classification);
                }
                PageRequest::Extract { reply } => {
                    let result = self.engine.extract_with_retry(self.source.as_ref()).await;
                    let _ = reply.send(ExtractResponse::from(result));
                }
                PageRequest::Close => break,
            }
        }
        info!(page = %self.id, url = self.source.url(), "page agent stopped");
    }
}
