//! # Quote Pipeline
//!
//! Request intake, batched flushing and result fan-out.
//!
//! [`QuoteEngine::submit`] never blocks: it registers the request with the
//! [`ResultDispatcher`], pushes it onto the intake queue and hands back a
//! [`QuoteHandle`]. A background worker flushes the queue every
//! `flush_interval`, answers what it can from the [`QuoteCache`], refreshes
//! stale pool state once per chain and computes each distinct key once.
//!
//! Every request resolves exactly once: with a quote, with a terminal error,
//! or with [`QuoteError::Timeout`] at its deadline. A failed refresh holds the
//! affected requests for the next flush rather than failing them.

pub mod dispatcher;
pub mod intake;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::quote_cache::{QuoteCache, QuoteKey};
use crate::refresh::RefreshController;
use crate::settings::Settings;
use crate::simulator::PoolSelection;
use crate::state_store::StateStore;
use crate::types::{validate_key, QuoteRequest};

pub use dispatcher::{QuoteHandle, QuoteResult, ResultDispatcher};
pub use intake::{IntakeQueue, PendingRequest};

use worker::FlushWorker;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub max_hops: usize,
    pub split_steps: usize,
    pub max_candidate_routes: usize,
    pub pool_selection: PoolSelection,
    pub serve_stale_on_failure: bool,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            flush_interval: settings.flush_interval(),
            request_timeout: settings.request_timeout(),
            cache_ttl: settings.cache_ttl(),
            cache_sweep_interval: Duration::from_millis(settings.quoter.cache_sweep_interval_ms),
            max_hops: settings.quoter.max_hops,
            split_steps: settings.quoter.split_steps,
            max_candidate_routes: settings.quoter.max_candidate_routes,
            pool_selection: settings.quoter.pool_selection,
            serve_stale_on_failure: settings.refresh.serve_stale_on_failure,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_serve_stale_on_failure(mut self, enabled: bool) -> Self {
        self.serve_stale_on_failure = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

pub struct QuoteEngine {
    intake: IntakeQueue,
    dispatcher: Arc<ResultDispatcher>,
    cache: Arc<QuoteCache>,
    store: Arc<StateStore>,
    config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QuoteEngine {
    /// Starts the flush worker on the current tokio runtime.
    pub fn new(config: EngineConfig, store: Arc<StateStore>, refresh: Arc<RefreshController>) -> Self {
        let (intake, rx) = IntakeQueue::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::new(ResultDispatcher::new());
        let cache = Arc::new(QuoteCache::new(config.cache_ttl));

        let worker = FlushWorker::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            refresh,
            Arc::clone(&dispatcher),
            config.clone(),
        );
        let handle = tokio::spawn(worker.run(rx, shutdown_rx));

        Self {
            intake,
            dispatcher,
            cache,
            store,
            config,
            shutdown_tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<StateStore>, refresh: Arc<RefreshController>) -> Self {
        Self::new(EngineConfig::from_settings(settings), store, refresh)
    }

    /// Queues a quote for `key`. Invalid requests come back already resolved.
    pub fn submit(&self, key: QuoteKey) -> QuoteHandle {
        if let Err(e) = self.validate(&key) {
            return self.rejected(e);
        }

        let request = PendingRequest::new(key, self.config.request_timeout);
        let receiver = self.dispatcher.register(request.id);
        let handle = QuoteHandle::new(request.id, request.deadline, receiver, Arc::clone(&self.dispatcher));

        if let Err(request) = self.intake.push(request) {
            self.dispatcher.resolve(&request.id, Err(QuoteError::Shutdown));
        }
        handle
    }

    /// Parses a wire request and queues it.
    pub fn submit_request(&self, request: &QuoteRequest) -> QuoteHandle {
        match request.to_key() {
            Ok(key) => self.submit(key),
            Err(e) => self.rejected(e),
        }
    }

    /// Submits and waits.
    pub async fn quote(&self, key: QuoteKey) -> QuoteResult {
        self.submit(key).wait().await
    }

    fn rejected(&self, error: QuoteError) -> QuoteHandle {
        let id = Uuid::new_v4();
        let receiver = self.dispatcher.register(id);
        self.dispatcher.resolve(&id, Err(error));
        QuoteHandle::new(id, Instant::now(), receiver, Arc::clone(&self.dispatcher))
    }

    fn validate(&self, key: &QuoteKey) -> Result<(), QuoteError> {
        validate_key(key)?;
        for token in [key.token_in, key.token_out] {
            if let Some(meta) = self.store.token_meta(&token) {
                if meta.chain_id != key.chain_id {
                    return Err(QuoteError::InvalidRequest(format!(
                        "token {:?} is on chain {}, not {}",
                        token, meta.chain_id, key.chain_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pending_requests(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Stops the worker; anything still pending resolves with [`QuoteError::Shutdown`].
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Quote pipeline worker panicked: {}", e);
            }
        }
    }
}

impl Drop for QuoteEngine {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
