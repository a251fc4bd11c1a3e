// Refresh Controller - keeps pool state inside its staleness window
// Stale tokens are gathered per chain and refreshed with one batched fetch.

use ethers::prelude::Address;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::QuoteError;
use crate::metrics;
use crate::settings::Settings;
use crate::state_fetcher::PoolStateFetcher;
use crate::state_store::StateStore;

/// Per-token staleness windows, grouped in named tiers.
#[derive(Debug, Clone)]
pub struct StalenessPolicy {
    default_window: Duration,
    tier_windows: HashMap<String, Duration>,
    token_tiers: HashMap<Address, String>,
}

impl StalenessPolicy {
    pub fn new(default_window: Duration) -> Self {
        Self {
            default_window,
            tier_windows: HashMap::new(),
            token_tiers: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let tier_windows = settings
            .refresh
            .staleness_windows
            .iter()
            .map(|(tier, secs)| (tier.clone(), Duration::from_secs(*secs)))
            .collect();

        Self {
            default_window: settings.default_staleness_window(),
            tier_windows,
            token_tiers: settings.token_tier_map(),
        }
    }

    pub fn with_tier(mut self, tier: &str, window: Duration) -> Self {
        self.tier_windows.insert(tier.to_string(), window);
        self
    }

    pub fn with_token_tier(mut self, token: Address, tier: &str) -> Self {
        self.token_tiers.insert(token, tier.to_string());
        self
    }

    /// Window for `token`; unknown tokens and tiers fall back to the default window.
    pub fn window_for(&self, token: &Address) -> Duration {
        self.token_tiers
            .get(token)
            .and_then(|tier| self.tier_windows.get(tier))
            .copied()
            .unwrap_or(self.default_window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshOutcome {
    pub requested_pools: usize,
    pub updated_pools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub batches: u64,
    pub failures: u64,
}

pub struct RefreshController {
    store: Arc<StateStore>,
    fetcher: Arc<dyn PoolStateFetcher>,
    policy: StalenessPolicy,
    fetch_timeout: Duration,
    batches: AtomicU64,
    failures: AtomicU64,
}

impl RefreshController {
    pub fn new(store: Arc<StateStore>, fetcher: Arc<dyn PoolStateFetcher>, policy: StalenessPolicy) -> Self {
        Self {
            store,
            fetcher,
            policy,
            fetch_timeout: Duration::from_secs(2),
            batches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn from_settings(store: Arc<StateStore>, fetcher: Arc<dyn PoolStateFetcher>, settings: &Settings) -> Self {
        Self::new(store, fetcher, StalenessPolicy::from_settings(settings))
            .with_fetch_timeout(settings.fetch_timeout())
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// A token is stale when any pool touching it was never read or is older than its window.
    pub fn is_stale(&self, token: &Address, now: Instant) -> bool {
        let window = self.policy.window_for(token);
        self.store
            .pools_for_token(token)
            .iter()
            .any(|pool| pool.age(now).map_or(true, |age| age > window))
    }

    /// Pools to re-read for the stale subset of `tokens`, deduplicated and sorted.
    pub fn stale_pools<'a, I>(&self, tokens: I, now: Instant) -> Vec<Address>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        let mut pools = BTreeSet::new();
        for token in tokens {
            if self.is_stale(token, now) {
                pools.extend(self.store.pools_for_token(token).iter().map(|p| p.address));
            }
        }
        pools.into_iter().collect()
    }

    /// Brings every stale token in `tokens` back inside its window with one batched fetch.
    ///
    /// Fails with [`QuoteError::RefreshFailed`] when the fetch errors, times out,
    /// or returns nothing for a non-empty request. The store is left untouched on failure.
    pub async fn refresh_chain(&self, chain_id: u64, tokens: &BTreeSet<Address>) -> Result<RefreshOutcome, QuoteError> {
        let pools = self.stale_pools(tokens, Instant::now());
        if pools.is_empty() {
            debug!("chain {}: {} tokens fresh, no refresh needed", chain_id, tokens.len());
            return Ok(RefreshOutcome::default());
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let result = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_pool_states(chain_id, &pools)).await;
        let elapsed = started.elapsed();

        let states = match result {
            Ok(Ok(states)) if !states.is_empty() => states,
            Ok(Ok(_)) => return Err(self.fail(chain_id, &pools, elapsed, "fetch returned no pool states".to_string())),
            Ok(Err(e)) => return Err(self.fail(chain_id, &pools, elapsed, e.to_string())),
            Err(_) => {
                return Err(self.fail(
                    chain_id,
                    &pools,
                    elapsed,
                    format!("fetch timed out after {:?}", self.fetch_timeout),
                ))
            }
        };

        let requested: BTreeSet<Address> = pools.iter().copied().collect();
        let updated = self
            .store
            .upsert_pools(states.into_iter().filter(|s| requested.contains(&s.address)));

        metrics::record_refresh(chain_id, pools.len(), elapsed, true);
        info!(
            "chain {}: refreshed {}/{} pools in {:?}",
            chain_id,
            updated,
            pools.len(),
            elapsed
        );

        Ok(RefreshOutcome {
            requested_pools: pools.len(),
            updated_pools: updated,
        })
    }

    fn fail(&self, chain_id: u64, pools: &[Address], elapsed: Duration, reason: String) -> QuoteError {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_refresh(chain_id, pools.len(), elapsed, false);
        warn!("chain {}: refresh of {} pools failed: {}", chain_id, pools.len(), reason);
        QuoteError::RefreshFailed(reason)
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            batches: self.batches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
