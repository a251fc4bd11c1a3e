//! # Router Module
//!
//! Route primitives and breadth-first route discovery over the pool graph held
//! by the [`StateStore`].
//!
//! The router answers *path existence* only: several pools between the same pair
//! count as one edge. Which pool a hop actually trades through is decided later
//! by the simulator's [`PoolSelection`](crate::simulator::PoolSelection) policy.

use ethers::prelude::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::state_store::StateStore;

/// An ordered, simple token path from input token to output token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    tokens: Vec<Address>,
}

impl Route {
    /// Builds a route, rejecting paths shorter than two tokens or revisiting a token.
    pub fn new(tokens: Vec<Address>) -> Option<Self> {
        if tokens.len() < 2 {
            return None;
        }
        let unique: BTreeSet<&Address> = tokens.iter().collect();
        if unique.len() != tokens.len() {
            return None;
        }
        Some(Self { tokens })
    }

    pub fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    pub fn token_in(&self) -> Address {
        self.tokens[0]
    }

    pub fn token_out(&self) -> Address {
        self.tokens[self.tokens.len() - 1]
    }

    pub fn hop_count(&self) -> usize {
        self.tokens.len() - 1
    }

    /// Consecutive `(token_in, token_out)` pairs.
    pub fn hops(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.tokens.windows(2).map(|w| (w[0], w[1]))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.tokens.iter().map(|t| format!("{:#x}", t)).collect();
        write!(f, "{}", parts.join(" -> "))
    }
}

/// Enumerates candidate routes between two tokens.
#[derive(Debug, Clone)]
pub struct Router {
    store: Arc<StateStore>,
}

impl Router {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// All simple routes from `token_in` to `token_out` with at most `max_hops` hops.
    ///
    /// Breadth-first: shorter routes come first, ties in neighbour address order.
    /// A token may appear in several routes but never twice within one.
    pub fn find_routes(&self, token_in: Address, token_out: Address, max_hops: usize) -> Vec<Route> {
        let mut routes = Vec::new();
        if token_in == token_out || max_hops == 0 {
            return routes;
        }

        let mut neighbor_cache: HashMap<Address, BTreeSet<Address>> = HashMap::new();
        let mut queue: VecDeque<Vec<Address>> = VecDeque::new();
        queue.push_back(vec![token_in]);
        let mut expanded = 0usize;

        while let Some(path) = queue.pop_front() {
            let current = path[path.len() - 1];
            expanded += 1;
            let neighbors = neighbor_cache
                .entry(current)
                .or_insert_with(|| self.store.neighbors(&current))
                .clone();

            for next in neighbors {
                if path.contains(&next) {
                    continue;
                }
                let mut extended = Vec::with_capacity(path.len() + 1);
                extended.extend_from_slice(&path);
                extended.push(next);

                if next == token_out {
                    routes.push(Route { tokens: extended });
                } else if extended.len() - 1 < max_hops {
                    queue.push_back(extended);
                }
            }
        }

        debug!(
            "find_routes {:?} -> {:?} (max_hops={}): {} routes, {} paths expanded",
            token_in,
            token_out,
            max_hops,
            routes.len(),
            expanded
        );
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::PoolState;
    use ethers::types::U256;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn connect(store: &StateStore, pool: u8, a: u8, b: u8) {
        store.upsert_pool(PoolState::new(addr(pool), addr(a), addr(b), U256::from(1_000u64), U256::one() << 96, 3000));
    }

    fn route(bytes: &[u8]) -> Route {
        Route::new(bytes.iter().map(|b| addr(*b)).collect()).unwrap()
    }

    #[test]
    fn route_rejects_repeats_and_short_paths() {
        assert!(Route::new(vec![addr(1)]).is_none());
        assert!(Route::new(vec![addr(1), addr(2), addr(1)]).is_none());
        let r = route(&[1, 2, 3]);
        assert_eq!(r.hop_count(), 2);
        assert_eq!(r.hops().collect::<Vec<_>>(), vec![(addr(1), addr(2)), (addr(2), addr(3))]);
        assert_eq!(r.token_in(), addr(1));
        assert_eq!(r.token_out(), addr(3));
    }

    #[test]
    fn finds_direct_and_multi_hop_routes() {
        let store = Arc::new(StateStore::new());
        connect(&store, 0x11, 0xa, 0xb);
        connect(&store, 0x12, 0xa, 0xc);
        connect(&store, 0x13, 0xc, 0xb);
        connect(&store, 0x14, 0xc, 0xd);
        connect(&store, 0x15, 0xd, 0xb);

        let router = Router::new(store);
        let routes = router.find_routes(addr(0xa), addr(0xb), 3);
        assert_eq!(
            routes,
            vec![route(&[0xa, 0xb]), route(&[0xa, 0xc, 0xb]), route(&[0xa, 0xc, 0xd, 0xb])]
        );

        let two = router.find_routes(addr(0xa), addr(0xb), 2);
        assert_eq!(two, vec![route(&[0xa, 0xb]), route(&[0xa, 0xc, 0xb])]);
    }

    #[test]
    fn parallel_pools_are_one_edge() {
        let store = Arc::new(StateStore::new());
        connect(&store, 0x11, 0xa, 0xb);
        connect(&store, 0x12, 0xb, 0xa);

        let routes = Router::new(store).find_routes(addr(0xa), addr(0xb), 3);
        assert_eq!(routes, vec![route(&[0xa, 0xb])]);
    }

    #[test]
    fn no_path_within_max_hops() {
        let store = Arc::new(StateStore::new());
        connect(&store, 0x11, 0xa, 0xb);
        connect(&store, 0x12, 0xb, 0xc);
        connect(&store, 0x13, 0xc, 0xd);
        connect(&store, 0x14, 0xd, 0xe);
        connect(&store, 0x15, 0x0f, 0x1f);

        let router = Router::new(store);
        assert!(router.find_routes(addr(0xa), addr(0x1f), 3).is_empty());
        assert!(router.find_routes(addr(0xa), addr(0xe), 3).is_empty());
        assert_eq!(router.find_routes(addr(0xa), addr(0xe), 4).len(), 1);
        assert!(router.find_routes(addr(0xa), addr(0xa), 3).is_empty());
    }

    #[test]
    fn repeated_calls_are_identical() {
        let store = Arc::new(StateStore::new());
        connect(&store, 0x11, 0xa, 0xb);
        connect(&store, 0x12, 0xa, 0xc);
        connect(&store, 0x13, 0xc, 0xb);
        connect(&store, 0x14, 0xb, 0xd);
        connect(&store, 0x15, 0xd, 0xc);

        let router = Router::new(store);
        let first: BTreeSet<Route> = router.find_routes(addr(0xa), addr(0xd), 3).into_iter().collect();
        let second: BTreeSet<Route> = router.find_routes(addr(0xa), addr(0xd), 3).into_iter().collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|r| Route::new(r.tokens().to_vec()).is_some()));
    }
}
