// Result Dispatcher - one-shot completion of pending quote requests
// Resolution removes the entry first, so each request completes exactly once
// no matter whether the compute path or the deadline gets there first.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::allocation::Quote;
use crate::errors::QuoteError;
use crate::metrics;

pub type QuoteResult = Result<Quote, QuoteError>;

#[derive(Debug, Default)]
pub struct ResultDispatcher {
    pending: DashMap<Uuid, oneshot::Sender<QuoteResult>>,
}

impl ResultDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) -> oneshot::Receiver<QuoteResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Completes `id` with `result`. Returns `false` if it was already resolved.
    pub fn resolve(&self, id: &Uuid, result: QuoteResult) -> bool {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                metrics::increment_quote_outcome(outcome_label(&result));
                // The waiter may have dropped its handle; the request still counts as resolved.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolves every outstanding request with `error`.
    pub fn fail_all(&self, error: QuoteError) -> usize {
        let ids: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.iter()
            .filter(|id| self.resolve(id, Err(error.clone())))
            .count()
    }
}

fn outcome_label(result: &QuoteResult) -> &'static str {
    match result {
        Ok(Quote::Single(_)) => "single",
        Ok(Quote::Split { .. }) => "split",
        Err(e) => e.kind(),
    }
}

/// Caller's side of a submitted request.
#[derive(Debug)]
pub struct QuoteHandle {
    id: Uuid,
    deadline: Instant,
    receiver: oneshot::Receiver<QuoteResult>,
    dispatcher: Arc<ResultDispatcher>,
}

impl QuoteHandle {
    pub(crate) fn new(
        id: Uuid,
        deadline: Instant,
        receiver: oneshot::Receiver<QuoteResult>,
        dispatcher: Arc<ResultDispatcher>,
    ) -> Self {
        Self {
            id,
            deadline,
            receiver,
            dispatcher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Waits for the result, failing with [`QuoteError::Timeout`] at the deadline.
    pub async fn wait(self) -> QuoteResult {
        let QuoteHandle {
            id,
            deadline,
            mut receiver,
            dispatcher,
        } = self;

        match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(QuoteError::Shutdown),
            Err(_) => {
                dispatcher.resolve(&id, Err(QuoteError::Timeout));
                // Whichever resolution won the race is already in the channel.
                receiver.try_recv().unwrap_or(Err(QuoteError::Timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle(dispatcher: &Arc<ResultDispatcher>, timeout: Duration) -> QuoteHandle {
        let id = Uuid::new_v4();
        let rx = dispatcher.register(id);
        QuoteHandle::new(id, Instant::now() + timeout, rx, Arc::clone(dispatcher))
    }

    #[tokio::test]
    async fn resolves_exactly_once() {
        let dispatcher = Arc::new(ResultDispatcher::new());
        let h = handle(&dispatcher, Duration::from_secs(1));
        let id = h.id();

        assert!(dispatcher.resolve(&id, Err(QuoteError::NoRouteFound)));
        assert!(!dispatcher.resolve(&id, Err(QuoteError::SimulationInfeasible)));
        assert_eq!(h.wait().await, Err(QuoteError::NoRouteFound));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_with_timeout() {
        let dispatcher = Arc::new(ResultDispatcher::new());
        let h = handle(&dispatcher, Duration::from_millis(500));
        let id = h.id();

        assert_eq!(h.wait().await, Err(QuoteError::Timeout));
        assert!(!dispatcher.is_pending(&id));
        // a late compute result is dropped
        assert!(!dispatcher.resolve(&id, Err(QuoteError::NoRouteFound)));
    }

    #[tokio::test]
    async fn fail_all_drains_pending() {
        let dispatcher = Arc::new(ResultDispatcher::new());
        let a = handle(&dispatcher, Duration::from_secs(5));
        let b = handle(&dispatcher, Duration::from_secs(5));

        assert_eq!(dispatcher.fail_all(QuoteError::Shutdown), 2);
        assert_eq!(a.wait().await, Err(QuoteError::Shutdown));
        assert_eq!(b.wait().await, Err(QuoteError::Shutdown));
    }
}
