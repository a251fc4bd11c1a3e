use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::quote_cache::QuoteKey;

/// A request waiting in the intake queue for the next flush.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub key: QuoteKey,
    pub submitted_at: Instant,
    pub deadline: Instant,
}

impl PendingRequest {
    pub fn new(key: QuoteKey, timeout: std::time::Duration) -> Self {
        let submitted_at = Instant::now();
        Self {
            id: Uuid::new_v4(),
            key,
            submitted_at,
            deadline: submitted_at + timeout,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

/// Producer side of the intake queue. Never blocks the submitter.
#[derive(Debug, Clone)]
pub struct IntakeQueue {
    tx: mpsc::UnboundedSender<PendingRequest>,
}

impl IntakeQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PendingRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hands the request back if the flush task is gone.
    pub fn push(&self, request: PendingRequest) -> Result<(), PendingRequest> {
        self.tx.send(request).map_err(|e| e.0)
    }
}
