// Flush worker - drains the intake queue on a fixed period and answers each
// batch: dedup by key, cache lookup, then a per-chain task that refreshes,
// computes and fans out. The loop itself never waits on a refresh.

use dashmap::DashSet;
use ethers::prelude::Address;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatcher::{QuoteResult, ResultDispatcher};
use super::intake::PendingRequest;
use super::EngineConfig;
use crate::allocation::AllocationOptimizer;
use crate::errors::QuoteError;
use crate::metrics;
use crate::quote_cache::{QuoteCache, QuoteKey};
use crate::refresh::RefreshController;
use crate::router::Router;
use crate::simulator::TradeSimulator;
use crate::state_store::StateStore;

type KeyGroup = (QuoteKey, Vec<PendingRequest>);

/// Everything a chain task needs to refresh, compute and resolve its keys.
struct FlushContext {
    cache: Arc<QuoteCache>,
    refresh: Arc<RefreshController>,
    dispatcher: Arc<ResultDispatcher>,
    router: Router,
    optimizer: AllocationOptimizer,
    config: EngineConfig,
}

/// Marks a chain as refreshing for as long as its task holds the slot.
struct RefreshSlot {
    chain_id: u64,
    refreshing: Arc<DashSet<u64>>,
}

impl RefreshSlot {
    fn claim(refreshing: &Arc<DashSet<u64>>, chain_id: u64) -> Option<Self> {
        refreshing.insert(chain_id).then(|| Self {
            chain_id,
            refreshing: Arc::clone(refreshing),
        })
    }
}

impl Drop for RefreshSlot {
    fn drop(&mut self) {
        self.refreshing.remove(&self.chain_id);
    }
}

pub(crate) struct FlushWorker {
    ctx: Arc<FlushContext>,
    refreshing: Arc<DashSet<u64>>,
}

impl FlushWorker {
    pub(crate) fn new(
        store: Arc<StateStore>,
        cache: Arc<QuoteCache>,
        refresh: Arc<RefreshController>,
        dispatcher: Arc<ResultDispatcher>,
        config: EngineConfig,
    ) -> Self {
        let simulator = TradeSimulator::new(Arc::clone(&store), config.pool_selection);
        let optimizer = AllocationOptimizer::new(simulator)
            .with_split_steps(config.split_steps)
            .with_max_candidate_routes(config.max_candidate_routes);

        Self {
            ctx: Arc::new(FlushContext {
                cache,
                refresh,
                dispatcher,
                router: Router::new(store),
                optimizer,
                config,
            }),
            refreshing: Arc::new(DashSet::new()),
        }
    }

    pub(crate) async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<PendingRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut batch: Vec<PendingRequest> = Vec::new();
        let mut chain_tasks: JoinSet<Vec<PendingRequest>> = JoinSet::new();
        let mut flush_timer = interval(self.ctx.config.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_timer = interval(self.ctx.config.cache_sweep_interval);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Quote pipeline started (flush_interval: {:?}, cache_ttl: {:?})",
            self.ctx.config.flush_interval,
            self.ctx.cache.ttl()
        );

        loop {
            tokio::select! {
                request = rx.recv() => {
                    match request {
                        Some(request) => batch.push(request),
                        None => {
                            info!("Intake queue closed, quote pipeline shutting down");
                            break;
                        }
                    }
                }

                // Periodic flush
                _ = flush_timer.tick() => {
                    if !batch.is_empty() {
                        let drained = std::mem::take(&mut batch);
                        batch = self.process_batch(drained, &mut chain_tasks);
                    }
                }

                // Chain finished; held requests rejoin the next flush
                Some(joined) = chain_tasks.join_next(), if !chain_tasks.is_empty() => {
                    match joined {
                        Ok(carried) => batch.extend(carried),
                        Err(e) => error!("Chain refresh task failed: {}", e),
                    }
                }

                _ = sweep_timer.tick() => {
                    let removed = self.ctx.cache.sweep_expired();
                    if removed > 0 {
                        debug!("Swept {} expired quotes", removed);
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Quote pipeline shutting down");
                        break;
                    }
                }
            }
        }

        chain_tasks.shutdown().await;
        rx.close();
        while let Ok(request) = rx.try_recv() {
            batch.push(request);
        }
        for request in &batch {
            self.ctx.dispatcher.resolve(&request.id, Err(QuoteError::Shutdown));
        }
        let abandoned = self.ctx.dispatcher.fail_all(QuoteError::Shutdown);
        if abandoned > 0 {
            debug!("Failed {} in-flight requests on shutdown", abandoned);
        }
    }

    /// Answers one flush: cache hits resolve here, misses go to one task per chain.
    /// Returns the requests to carry over to the next flush.
    fn process_batch(
        &self,
        batch: Vec<PendingRequest>,
        chain_tasks: &mut JoinSet<Vec<PendingRequest>>,
    ) -> Vec<PendingRequest> {
        let ctx = &self.ctx;
        let now = Instant::now();
        let drained = batch.len();

        let mut groups: IndexMap<QuoteKey, Vec<PendingRequest>> = IndexMap::new();
        for request in batch {
            if request.is_expired(now) {
                ctx.dispatcher.resolve(&request.id, Err(QuoteError::Timeout));
                continue;
            }
            // Already answered through its handle's deadline.
            if !ctx.dispatcher.is_pending(&request.id) {
                continue;
            }
            groups.entry(request.key).or_default().push(request);
        }
        metrics::record_flush_batch(drained, groups.len());

        let mut misses: BTreeMap<u64, Vec<KeyGroup>> = BTreeMap::new();
        for (key, waiters) in groups {
            match ctx.cache.get(&key) {
                Some(quote) => ctx.resolve_all(&waiters, Ok(quote)),
                None => misses.entry(key.chain_id).or_default().push((key, waiters)),
            }
        }

        let mut carried = Vec::new();
        for (chain_id, keys) in misses {
            let Some(slot) = RefreshSlot::claim(&self.refreshing, chain_id) else {
                // one refresh per chain at a time
                carried.extend(keys.into_iter().flat_map(|(_, waiters)| waiters));
                continue;
            };
            let ctx = Arc::clone(&self.ctx);
            chain_tasks.spawn(async move {
                let held = ctx.process_chain(chain_id, keys).await;
                drop(slot);
                held
            });
        }
        carried
    }
}

impl FlushContext {
    async fn process_chain(&self, chain_id: u64, keys: Vec<KeyGroup>) -> Vec<PendingRequest> {
        let tokens: BTreeSet<Address> = keys
            .iter()
            .flat_map(|(key, _)| [key.token_in, key.token_out])
            .collect();

        let refreshed = match self.refresh.refresh_chain(chain_id, &tokens).await {
            Ok(_) => true,
            Err(e) if e.is_terminal() => {
                for (_, waiters) in &keys {
                    self.resolve_all(waiters, Err(e.clone()));
                }
                return Vec::new();
            }
            Err(e) if self.config.serve_stale_on_failure => {
                warn!("chain {}: {}; answering from stored state", chain_id, e);
                false
            }
            Err(e) => {
                let held: Vec<PendingRequest> = keys.into_iter().flat_map(|(_, waiters)| waiters).collect();
                debug!(
                    "chain {}: {}; holding {} requests for the next flush",
                    chain_id,
                    e,
                    held.len()
                );
                return held;
            }
        };

        for (key, waiters) in keys {
            let result = self.compute(&key);
            if let (Ok(quote), true) = (&result, refreshed) {
                self.cache.put(key, quote.clone());
            }
            metrics::record_dedup_fanout(waiters.len());
            self.resolve_all(&waiters, result);
        }
        Vec::new()
    }

    fn compute(&self, key: &QuoteKey) -> QuoteResult {
        let started = Instant::now();
        let routes = self
            .router
            .find_routes(key.token_in, key.token_out, self.config.max_hops);
        if routes.is_empty() {
            return Err(QuoteError::NoRouteFound);
        }

        let quote = self.optimizer.allocate(&routes, key.amount_in)?;
        metrics::record_compute_duration(started.elapsed());
        if quote.amount_out().is_zero() {
            return Err(QuoteError::SimulationInfeasible);
        }
        Ok(quote)
    }

    fn resolve_all(&self, waiters: &[PendingRequest], result: QuoteResult) {
        for waiter in waiters {
            self.dispatcher.resolve(&waiter.id, result.clone());
        }
    }
}
