use arc_swap::ArcSwap;
use dashmap::{DashMap, DashSet};
use ethers::prelude::Address;
use log::debug;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::metrics;
use crate::pools::{PoolState, Token};

/// Concurrent in-memory index of pool state and token metadata.
///
/// Every quoting component reads from the store; only the refresh controller
/// and the discovery loop write to it.
///
/// ## Consistency
///
/// - Pool records are held behind an `ArcSwap`, so an upsert of a known pool is a
///   single pointer swap. Readers see the old record or the new one, never a mix.
/// - A new pool is registered under both of its tokens *before* its record is
///   published. Adjacency lookups skip addresses without a record, so a pool
///   becomes visible from both tokens at the same instant.
/// - Writers are serialised by a short internal lock; readers never take it.
#[derive(Debug, Default)]
pub struct StateStore {
    pools: DashMap<Address, Arc<ArcSwap<PoolState>>>,
    adjacency: DashMap<Address, DashSet<Address>>,
    tokens: DashMap<Address, Token>,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a pool record, keeping the token adjacency symmetric.
    pub fn upsert_pool(&self, state: PoolState) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let address = state.address;

        let previous = self.pools.get(&address).map(|entry| entry.load_full());

        self.adjacency.entry(state.token0).or_default().insert(address);
        self.adjacency.entry(state.token1).or_default().insert(address);

        let slot = self.pools.get(&address).map(|entry| Arc::clone(entry.value()));
        match slot {
            Some(slot) => slot.store(Arc::new(state.clone())),
            None => {
                self.pools
                    .insert(address, Arc::new(ArcSwap::from_pointee(state.clone())));
            }
        }

        // A pool never changes pair on-chain, but a corrected discovery record might.
        if let Some(prev) = previous {
            for token in [prev.token0, prev.token1] {
                if !state.involves(&token) {
                    if let Some(set) = self.adjacency.get(&token) {
                        set.remove(&address);
                    }
                    debug!("Pool {:?} no longer lists token {:?}", address, token);
                }
            }
        }
    }

    pub fn upsert_pools<I>(&self, states: I) -> usize
    where
        I: IntoIterator<Item = PoolState>,
    {
        let mut count = 0;
        for state in states {
            self.upsert_pool(state);
            count += 1;
        }
        metrics::set_cache_size("pool_state", self.pools.len() as f64);
        count
    }

    pub fn upsert_token(&self, meta: Token) {
        self.tokens.insert(meta.address, meta);
    }

    /// Current record for a pool.
    pub fn pool_state(&self, address: &Address) -> Option<Arc<PoolState>> {
        self.pools.get(address).map(|slot| slot.load_full())
    }

    pub fn token_meta(&self, address: &Address) -> Option<Token> {
        self.tokens.get(address).map(|t| t.value().clone())
    }

    /// All pools involving `token`, ordered by pool address.
    pub fn pools_for_token(&self, token: &Address) -> Vec<Arc<PoolState>> {
        let addresses: BTreeSet<Address> = match self.adjacency.get(token) {
            Some(set) => set.iter().map(|a| *a.key()).collect(),
            None => return Vec::new(),
        };
        addresses
            .iter()
            .filter_map(|addr| self.pool_state(addr))
            .filter(|pool| pool.involves(token))
            .collect()
    }

    /// Tokens reachable from `token` through a single pool. Parallel pools
    /// between the same pair collapse into one neighbour.
    pub fn neighbors(&self, token: &Address) -> BTreeSet<Address> {
        self.pools_for_token(token)
            .iter()
            .filter_map(|pool| pool.counterpart(token))
            .collect()
    }

    /// Every pool connecting `a` and `b`, ordered by pool address.
    pub fn pools_between(&self, a: &Address, b: &Address) -> Vec<Arc<PoolState>> {
        self.pools_for_token(a)
            .into_iter()
            .filter(|pool| pool.connects(a, b))
            .collect()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::prelude::U256;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn pool(a: u8, t0: u8, t1: u8, liquidity: u64) -> PoolState {
        PoolState::new(addr(a), addr(t0), addr(t1), U256::from(liquidity), U256::one() << 96, 3000)
    }

    #[test]
    fn adjacency_is_symmetric() {
        let store = StateStore::new();
        store.upsert_pool(pool(1, 0xa, 0xb, 100));

        let from_a: Vec<Address> = store.pools_for_token(&addr(0xa)).iter().map(|p| p.address).collect();
        let from_b: Vec<Address> = store.pools_for_token(&addr(0xb)).iter().map(|p| p.address).collect();
        assert_eq!(from_a, vec![addr(1)]);
        assert_eq!(from_b, vec![addr(1)]);
        assert!(store.pools_for_token(&addr(0xc)).is_empty());
    }

    #[test]
    fn upsert_replaces_whole_record() {
        let store = StateStore::new();
        store.upsert_pool(pool(1, 0xa, 0xb, 100));
        let before = store.pool_state(&addr(1)).unwrap();

        store.upsert_pool(pool(1, 0xa, 0xb, 999));
        let after = store.pool_state(&addr(1)).unwrap();

        // the old snapshot held by a reader is untouched
        assert_eq!(before.liquidity, U256::from(100));
        assert_eq!(after.liquidity, U256::from(999));
        assert_eq!(store.pool_count(), 1);
        assert_eq!(store.pools_for_token(&addr(0xa)).len(), 1);
    }

    #[test]
    fn parallel_pools_collapse_to_one_neighbor() {
        let store = StateStore::new();
        store.upsert_pools(vec![pool(1, 0xa, 0xb, 100), pool(2, 0xb, 0xa, 50), pool(3, 0xa, 0xc, 10)]);

        let neighbors: Vec<Address> = store.neighbors(&addr(0xa)).into_iter().collect();
        assert_eq!(neighbors, vec![addr(0xb), addr(0xc)]);
        assert_eq!(store.pools_between(&addr(0xa), &addr(0xb)).len(), 2);
        assert_eq!(store.pools_between(&addr(0xb), &addr(0xc)).len(), 0);
    }

    #[test]
    fn retargeted_pool_leaves_old_token() {
        let store = StateStore::new();
        store.upsert_pool(pool(1, 0xa, 0xb, 100));
        store.upsert_pool(pool(1, 0xa, 0xc, 100));

        assert!(store.pools_for_token(&addr(0xb)).is_empty());
        assert_eq!(store.pools_for_token(&addr(0xc)).len(), 1);
    }

    #[test]
    fn token_metadata_roundtrip() {
        let store = StateStore::new();
        let token = Token {
            address: addr(0xa),
            symbol: "WETH".into(),
            name: "Wrapped Ether".into(),
            decimals: 18,
            chain_id: 42161,
        };
        store.upsert_token(token.clone());
        assert_eq!(store.token_meta(&addr(0xa)), Some(token));
        assert_eq!(store.token_meta(&addr(0xb)), None);
    }

    #[test]
    fn concurrent_readers_never_see_missing_pool() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xb, 1));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..2_000u64 {
                    store.upsert_pool(pool(1, 0xa, 0xb, i + 1));
                }
            })
        };
        for _ in 0..2_000 {
            let pools = store.pools_for_token(&addr(0xb));
            assert_eq!(pools.len(), 1);
            assert!(!pools[0].liquidity.is_zero());
        }
        writer.join().unwrap();
    }
}
