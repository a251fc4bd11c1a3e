// src/pools.rs

use ethers::prelude::{Address, U256};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Token metadata as discovered on a chain. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub chain_id: u64,
}

/// Which side of the pool a hop sells into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// token0 in, token1 out
    ZeroForOne,
    /// token1 in, token0 out
    OneForZero,
}

/// Snapshot of a single pool's pricing state.
///
/// A `PoolState` is never mutated in place: every refresh produces a new value
/// that replaces the previous one wholesale in the [`StateStore`](crate::state_store::StateStore).
///
/// `sqrt_price_x96` follows the concentrated-liquidity convention:
/// `sqrt(price_token1_per_token0) * 2^96`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub liquidity: U256,
    pub sqrt_price_x96: U256,
    /// Fee in parts per million (3000 = 0.3%)
    pub fee_ppm: u32,
    /// When the on-chain values were read. `None` for pools known only from discovery.
    pub observed_at: Option<Instant>,
}

impl PoolState {
    /// Creates a pool state observed now.
    pub fn new(
        address: Address,
        token0: Address,
        token1: Address,
        liquidity: U256,
        sqrt_price_x96: U256,
        fee_ppm: u32,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            liquidity,
            sqrt_price_x96,
            fee_ppm,
            observed_at: Some(Instant::now()),
        }
    }

    /// A pool known from discovery whose on-chain state has not been read yet.
    pub fn unobserved(address: Address, token0: Address, token1: Address, fee_ppm: u32) -> Self {
        Self {
            address,
            token0,
            token1,
            liquidity: U256::zero(),
            sqrt_price_x96: U256::zero(),
            fee_ppm,
            observed_at: None,
        }
    }

    /// Returns a copy of this pool carrying fresh on-chain values.
    pub fn with_state(&self, liquidity: U256, sqrt_price_x96: U256, observed_at: Instant) -> Self {
        Self {
            liquidity,
            sqrt_price_x96,
            observed_at: Some(observed_at),
            ..self.clone()
        }
    }

    pub fn involves(&self, token: &Address) -> bool {
        self.token0 == *token || self.token1 == *token
    }

    /// The other token of the pair, if `token` belongs to this pool.
    pub fn counterpart(&self, token: &Address) -> Option<Address> {
        if self.token0 == *token {
            Some(self.token1)
        } else if self.token1 == *token {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Whether the pool connects `a` and `b` in either order.
    pub fn connects(&self, a: &Address, b: &Address) -> bool {
        a != b && self.involves(a) && self.involves(b)
    }

    pub fn direction(&self, token_in: &Address) -> Option<SwapDirection> {
        if self.token0 == *token_in {
            Some(SwapDirection::ZeroForOne)
        } else if self.token1 == *token_in {
            Some(SwapDirection::OneForZero)
        } else {
            None
        }
    }

    /// Time since the last on-chain read; `None` if never read.
    pub fn age(&self, now: Instant) -> Option<std::time::Duration> {
        self.observed_at.map(|t| now.saturating_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn counterpart_and_direction() {
        let pool = PoolState::new(addr(1), addr(0xa), addr(0xb), U256::from(10), U256::one(), 3000);

        assert_eq!(pool.counterpart(&addr(0xa)), Some(addr(0xb)));
        assert_eq!(pool.counterpart(&addr(0xb)), Some(addr(0xa)));
        assert_eq!(pool.counterpart(&addr(0xc)), None);
        assert_eq!(pool.direction(&addr(0xa)), Some(SwapDirection::ZeroForOne));
        assert_eq!(pool.direction(&addr(0xb)), Some(SwapDirection::OneForZero));
        assert!(pool.connects(&addr(0xb), &addr(0xa)));
        assert!(!pool.connects(&addr(0xa), &addr(0xa)));
    }

    #[test]
    fn with_state_keeps_identity() {
        let pool = PoolState::new(addr(1), addr(0xa), addr(0xb), U256::from(10), U256::one(), 500);
        let later = Instant::now() + std::time::Duration::from_secs(5);
        let refreshed = pool.with_state(U256::from(20), U256::from(7), later);

        assert_eq!(refreshed.address, pool.address);
        assert_eq!(refreshed.fee_ppm, 500);
        assert_eq!(refreshed.liquidity, U256::from(20));
        assert_eq!(refreshed.observed_at, Some(later));
    }

    #[test]
    fn unobserved_pool_has_no_age() {
        let pool = PoolState::unobserved(addr(1), addr(0xa), addr(0xb), 3000);
        assert_eq!(pool.age(Instant::now()), None);
        assert!(pool.liquidity.is_zero());
    }
}
