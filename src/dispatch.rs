use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notify::Notice;
use crate::observability;

#[derive(Debug)]
pub enum DispatchError {
    /// The channel (mail, push, ...) refused the message.
    Rejected(String),
    Encode(serde_json::Error),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Rejected(msg) => write!(f, "delivery rejected: {msg}"),
            DispatchError::Encode(e) => write!(f, "notice encoding failed: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Encode(e)
    }
}

/// Where notices end up. Delivery never blocks or fails a booking.
#[async_trait]
pub trait NoticeSink: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<(), DispatchError>;
}

/// Writes every notice as a JSON line to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NoticeSink for LogSink {
    async fn deliver(&self, notice: &Notice) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(notice)?;
        info!(kind = notice.kind(), "notice: {payload}");
        Ok(())
    }
}

/// Drain `rx` into `sink` until the hub goes away.
pub async fn run_dispatcher(mut rx: broadcast::Receiver<Notice>, sink: Arc<dyn NoticeSink>) {
    loop {
        let notice = match rx.recv().await {
            Ok(n) => n,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("dispatcher lagged, {skipped} notices dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("notice hub closed, dispatcher exiting");
                return;
            }
        };
        let outcome = match sink.deliver(&notice).await {
            Ok(()) => "delivered",
            Err(e) => {
                warn!("{} notice for coach {} not delivered: {e}", notice.kind(), notice.coach_id());
                "failed"
            }
        };
        metrics::counter!(
            observability::NOTICES_TOTAL,
            "kind" => notice.kind(),
            "outcome" => outcome
        )
        .increment(1);
    }
}
