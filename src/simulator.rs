//! # Trade Simulator
//!
//! Walks a [`Route`] hop by hop against the current [`StateStore`] snapshot and
//! returns the exact integer output amount.

use ethers::prelude::{Address, U256};
use serde::Deserialize;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::trace;

use crate::pools::PoolState;
use crate::router::Route;
use crate::state_store::StateStore;
use crate::v3_math;

/// Which pool to trade through when several connect the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolSelection {
    /// Deepest pool first; ties go to the lower fee, then the lower address.
    #[default]
    HighestLiquidity,
    /// Cheapest fee tier first; ties go to the deeper pool, then the lower address.
    LowestFee,
}

impl PoolSelection {
    pub fn pick(&self, candidates: Vec<Arc<PoolState>>) -> Option<Arc<PoolState>> {
        match self {
            PoolSelection::HighestLiquidity => candidates
                .into_iter()
                .max_by_key(|p| (p.liquidity, Reverse(p.fee_ppm), Reverse(p.address))),
            PoolSelection::LowestFee => candidates
                .into_iter()
                .min_by_key(|p| (p.fee_ppm, Reverse(p.liquidity), p.address)),
        }
    }
}

/// Per-hop breakdown of a simulated route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopFill {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
}

#[derive(Debug, Clone)]
pub struct TradeSimulator {
    store: Arc<StateStore>,
    selection: PoolSelection,
}

impl TradeSimulator {
    pub fn new(store: Arc<StateStore>, selection: PoolSelection) -> Self {
        Self { store, selection }
    }

    pub fn selection(&self) -> PoolSelection {
        self.selection
    }

    /// The pool a hop between `a` and `b` trades through, if any exists.
    pub fn select_pool(&self, a: &Address, b: &Address) -> Option<Arc<PoolState>> {
        self.selection.pick(self.store.pools_between(a, b))
    }

    /// Output amount for `amount_in` along `route`, or `None` if a hop has no pool.
    pub fn simulate(&self, route: &Route, amount_in: U256) -> Option<U256> {
        self.simulate_hops(route, amount_in)
            .map(|fills| fills.last().map(|f| f.amount_out).unwrap_or(amount_in))
    }

    /// Like [`simulate`](Self::simulate) but keeps every hop's fill.
    pub fn simulate_hops(&self, route: &Route, amount_in: U256) -> Option<Vec<HopFill>> {
        let mut fills = Vec::with_capacity(route.hop_count());
        let mut amount = amount_in;

        for (token_in, token_out) in route.hops() {
            let pool = match self.select_pool(&token_in, &token_out) {
                Some(pool) => pool,
                None => {
                    trace!("No pool for hop {:?} -> {:?}", token_in, token_out);
                    return None;
                }
            };
            let out = v3_math::swap_exact_in(&pool, &token_in, amount)?;
            fills.push(HopFill {
                pool: pool.address,
                token_in,
                token_out,
                amount_in: amount,
                amount_out: out,
            });
            amount = out;
        }

        Some(fills)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn q96() -> U256 {
        U256::one() << 96
    }

    fn pool(a: u8, t0: u8, t1: u8, liquidity: u64, fee_ppm: u32) -> PoolState {
        PoolState::new(addr(a), addr(t0), addr(t1), U256::from(liquidity), q96(), fee_ppm)
    }

    fn route(bytes: &[u8]) -> Route {
        Route::new(bytes.iter().map(|b| addr(*b)).collect()).unwrap()
    }

    /// Closed-form single hop at unit price.
    fn closed_form(liquidity: u64, fee_ppm: u32, amount_in: u64) -> U256 {
        let after_fee = U256::from(amount_in) * U256::from(1_000_000 - fee_ppm) / U256::from(1_000_000u64);
        U256::from(liquidity) * after_fee / (U256::from(liquidity) + after_fee)
    }

    #[test]
    fn direct_route_matches_closed_form() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xb, 1_000_000, 3000));
        let sim = TradeSimulator::new(store, PoolSelection::HighestLiquidity);

        for amount in [1u64, 7, 1000, 55_555, 1_000_000, 9_999_999] {
            let out = sim.simulate(&route(&[0xa, 0xb]), U256::from(amount)).unwrap();
            assert_eq!(out, closed_form(1_000_000, 3000, amount), "amount {}", amount);
        }
        assert_eq!(sim.simulate(&route(&[0xa, 0xb]), U256::from(1000)), Some(U256::from(996)));
    }

    #[test]
    fn multi_hop_feeds_outputs_forward() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xc, 1_000_000, 3000));
        store.upsert_pool(pool(2, 0xc, 0xb, 2_000_000, 500));
        let sim = TradeSimulator::new(store, PoolSelection::HighestLiquidity);

        let fills = sim.simulate_hops(&route(&[0xa, 0xc, 0xb]), U256::from(10_000)).unwrap();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].amount_out, fills[1].amount_in);
        assert_eq!(fills[0].amount_out, closed_form(1_000_000, 3000, 10_000));
        assert_eq!(fills[1].amount_out, closed_form(2_000_000, 500, fills[0].amount_out.as_u64()));
    }

    #[test]
    fn missing_pool_is_infeasible() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xc, 1_000_000, 3000));
        let sim = TradeSimulator::new(store, PoolSelection::HighestLiquidity);
        assert_eq!(sim.simulate(&route(&[0xa, 0xc, 0xb]), U256::from(10)), None);
    }

    #[test]
    fn zero_liquidity_hop_outputs_zero() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xb, 0, 3000));
        let sim = TradeSimulator::new(store, PoolSelection::HighestLiquidity);
        assert_eq!(sim.simulate(&route(&[0xa, 0xb]), U256::from(10_000)), Some(U256::zero()));
    }

    #[test]
    fn selection_policy_is_explicit() {
        let store = Arc::new(StateStore::new());
        store.upsert_pool(pool(1, 0xa, 0xb, 1_000, 500));
        store.upsert_pool(pool(2, 0xa, 0xb, 9_000, 3000));
        store.upsert_pool(pool(3, 0xb, 0xa, 9_000, 10_000));

        let deepest = TradeSimulator::new(Arc::clone(&store), PoolSelection::HighestLiquidity);
        assert_eq!(deepest.select_pool(&addr(0xa), &addr(0xb)).unwrap().address, addr(2));

        let cheapest = TradeSimulator::new(store, PoolSelection::LowestFee);
        assert_eq!(cheapest.select_pool(&addr(0xb), &addr(0xa)).unwrap().address, addr(1));
    }

    #[test]
    fn higher_fee_never_increases_output() {
        let mut last = None;
        for fee in [0u32, 500, 3000, 10_000] {
            let store = Arc::new(StateStore::new());
            store.upsert_pool(pool(1, 0xa, 0xc, 3_000_000, fee));
            store.upsert_pool(pool(2, 0xc, 0xb, 3_000_000, fee));
            let sim = TradeSimulator::new(store, PoolSelection::HighestLiquidity);
            let out = sim.simulate(&route(&[0xa, 0xc, 0xb]), U256::from(250_000)).unwrap();
            if let Some(prev) = last {
                assert!(out <= prev);
            }
            last = Some(out);
        }
    }
}
