// Pool State Fetcher - batched on-chain reads of pool pricing state
// One aggregate3 request per chunk of pools: slot0() and liquidity() for each.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::prelude::Middleware;
use ethers::types::{Address, Bytes};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

use crate::contracts::{decode_liquidity, decode_slot0_sqrt_price, LiquidityCall, Slot0Call};
use crate::multicall::{Call, Multicall};
use crate::pools::PoolState;
use crate::state_store::StateStore;

/// Source of fresh pool states for the refresh controller.
#[async_trait]
pub trait PoolStateFetcher: Send + Sync {
    /// Reads the current state of `pools` on `chain_id`.
    ///
    /// May return fewer records than requested, never a partially decoded one.
    /// An empty result for a non-empty request means the batch failed.
    async fn fetch_pool_states(&self, chain_id: u64, pools: &[Address]) -> Result<Vec<PoolState>>;
}

/// Multicall3-backed fetcher, one executor per chain.
///
/// Pool identity (tokens, fee) comes from the records already in the store;
/// only the price and liquidity are read on-chain.
pub struct MulticallStateFetcher<M: Middleware> {
    store: Arc<StateStore>,
    chains: HashMap<u64, Multicall<M>>,
}

impl<M: Middleware + 'static> MulticallStateFetcher<M> {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            chains: HashMap::new(),
        }
    }

    pub fn with_chain(mut self, chain_id: u64, multicall: Multicall<M>) -> Self {
        self.chains.insert(chain_id, multicall);
        self
    }
}

#[async_trait]
impl<M: Middleware + 'static> PoolStateFetcher for MulticallStateFetcher<M> {
    async fn fetch_pool_states(&self, chain_id: u64, pools: &[Address]) -> Result<Vec<PoolState>> {
        let multicall = self
            .chains
            .get(&chain_id)
            .ok_or_else(|| anyhow!("no RPC configured for chain {}", chain_id))?;

        let known: Vec<Arc<PoolState>> = pools
            .iter()
            .filter_map(|address| self.store.pool_state(address))
            .collect();
        if known.len() < pools.len() {
            debug!(
                "Skipping {} pools without discovery metadata on chain {}",
                pools.len() - known.len(),
                chain_id
            );
        }
        if known.is_empty() {
            return Ok(Vec::new());
        }

        let results = match multicall.run(build_calls(&known), None).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Pool state multicall failed on chain {}: {}", chain_id, e);
                return Ok(Vec::new());
            }
        };

        let states = decode_states(&known, &results, Instant::now());
        debug!(
            "Fetched {}/{} pool states on chain {}",
            states.len(),
            known.len(),
            chain_id
        );
        Ok(states)
    }
}

/// Two calls per pool, `slot0()` then `liquidity()`.
fn build_calls(pools: &[Arc<PoolState>]) -> Vec<Call> {
    let slot0: Bytes = Slot0Call.encode().into();
    let liquidity: Bytes = LiquidityCall.encode().into();

    pools
        .iter()
        .flat_map(|pool| {
            [
                Call {
                    target: pool.address,
                    call_data: slot0.clone(),
                },
                Call {
                    target: pool.address,
                    call_data: liquidity.clone(),
                },
            ]
        })
        .collect()
}

fn decode_states(pools: &[Arc<PoolState>], results: &[Option<Bytes>], observed_at: Instant) -> Vec<PoolState> {
    pools
        .iter()
        .zip(results.chunks(2))
        .filter_map(|(pool, pair)| {
            let (slot0, liquidity) = match pair {
                [Some(slot0), Some(liquidity)] => (slot0, liquidity),
                _ => {
                    debug!("Pool {:?} reverted slot0/liquidity", pool.address);
                    return None;
                }
            };
            let sqrt_price_x96 = decode_slot0_sqrt_price(slot0)?;
            let liquidity = decode_liquidity(liquidity)?;
            Some(pool.with_state(liquidity, sqrt_price_x96, observed_at))
        })
        .collect()
}
