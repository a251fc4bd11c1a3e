//! # Pool Discovery
//!
//! Supplies the token universe and pool-to-pair mappings that the state store
//! routes over. Discovery only ever adds pools or re-targets changed ones;
//! pricing state is owned by the refresh path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, U256};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::pools::{PoolState, Token};
use crate::state_store::StateStore;

/// A pool as reported by discovery. State fields are optional seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSeed {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_ppm: u32,
    #[serde(default)]
    pub liquidity: Option<U256>,
    #[serde(default)]
    pub sqrt_price_x96: Option<U256>,
}

impl PoolSeed {
    /// Seeds with both state fields count as observed now; otherwise the pool
    /// is stale until its first refresh.
    pub fn into_state(self) -> PoolState {
        match (self.liquidity, self.sqrt_price_x96) {
            (Some(liquidity), Some(sqrt_price_x96)) => PoolState::new(
                self.address,
                self.token0,
                self.token1,
                liquidity,
                sqrt_price_x96,
                self.fee_ppm,
            ),
            _ => PoolState::unobserved(self.address, self.token0, self.token1, self.fee_ppm),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub pools: Vec<PoolSeed>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub tokens: usize,
    pub pools_added: usize,
    pub pools_skipped: usize,
}

impl UniverseSnapshot {
    /// Loads tokens and pools into `store`.
    ///
    /// Pools already present with the same pair keep their live state.
    /// Pools with identical tokens on both sides are skipped.
    pub fn apply(&self, store: &StateStore) -> ApplyReport {
        let mut report = ApplyReport::default();

        for token in &self.tokens {
            store.upsert_token(token.clone());
            report.tokens += 1;
        }

        for seed in &self.pools {
            if seed.token0 == seed.token1 {
                warn!("Skipping pool {:?}: token0 == token1", seed.address);
                report.pools_skipped += 1;
                continue;
            }
            let unchanged = store
                .pool_state(&seed.address)
                .map(|known| known.token0 == seed.token0 && known.token1 == seed.token1)
                .unwrap_or(false);
            if unchanged {
                report.pools_skipped += 1;
                continue;
            }
            store.upsert_pool(seed.clone().into_state());
            report.pools_added += 1;
        }

        debug!(
            "Applied universe: {} tokens, {} pools added, {} skipped",
            report.tokens, report.pools_added, report.pools_skipped
        );
        report
    }
}

/// Source of the token/pool universe.
#[async_trait]
pub trait PoolDiscovery: Send + Sync {
    async fn snapshot(&self) -> Result<UniverseSnapshot>;
}

/// Universe read from a JSON file on every call, so edits are picked up by the loop.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    path: PathBuf,
}

impl StaticDiscovery {
    pub fn from_json_file(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl PoolDiscovery for StaticDiscovery {
    async fn snapshot(&self) -> Result<UniverseSnapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading universe file {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing universe file {}", self.path.display()))
    }
}

/// Takes one snapshot and applies it.
pub async fn discover_once(discovery: &dyn PoolDiscovery, store: &StateStore) -> Result<ApplyReport> {
    let snapshot = discovery.snapshot().await?;
    Ok(snapshot.apply(store))
}

/// Re-runs discovery every `interval` until the task is aborted.
/// A failed pass is logged and retried on the next tick.
pub fn spawn_discovery_loop(
    discovery: Arc<dyn PoolDiscovery>,
    store: Arc<StateStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match discover_once(discovery.as_ref(), &store).await {
                Ok(report) if report.pools_added > 0 => info!(
                    "Discovery added {} pools ({} total)",
                    report.pools_added,
                    store.pool_count()
                ),
                Ok(_) => {}
                Err(e) => warn!("Discovery pass failed: {:#}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn token(b: u8, symbol: &str) -> Token {
        Token {
            address: addr(b),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: 18,
            chain_id: 1,
        }
    }

    fn seed(a: u8, t0: u8, t1: u8) -> PoolSeed {
        PoolSeed {
            address: addr(a),
            token0: addr(t0),
            token1: addr(t1),
            fee_ppm: 3000,
            liquidity: None,
            sqrt_price_x96: None,
        }
    }

    #[tokio::test]
    async fn apply_keeps_live_state() {
        let store = StateStore::new();
        store.upsert_pool(PoolState::new(addr(1), addr(0xa), addr(0xb), U256::from(77), U256::one(), 3000));

        let snapshot = UniverseSnapshot {
            tokens: vec![token(0xa, "WETH"), token(0xb, "USDC")],
            pools: vec![seed(1, 0xa, 0xb), seed(2, 0xb, 0xc), seed(3, 0xc, 0xc)],
        };
        let report = snapshot.apply(&store);

        assert_eq!(
            report,
            ApplyReport {
                tokens: 2,
                pools_added: 1,
                pools_skipped: 2
            }
        );
        assert_eq!(store.pool_state(&addr(1)).unwrap().liquidity, U256::from(77));
        assert_eq!(store.pool_state(&addr(2)).unwrap().observed_at, None);
        assert_eq!(store.token_meta(&addr(0xa)).unwrap().symbol, "WETH");
    }

    #[tokio::test]
    async fn static_discovery_reads_json() {
        let q96 = U256::one() << 96;
        let snapshot = UniverseSnapshot {
            tokens: vec![token(0xa, "WETH")],
            pools: vec![PoolSeed {
                liquidity: Some(U256::from(1_000_000u64)),
                sqrt_price_x96: Some(q96),
                ..seed(1, 0xa, 0xb)
            }],
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&snapshot).unwrap()).unwrap();

        let discovery = StaticDiscovery::from_json_file(file.path());
        let store = StateStore::new();
        let report = discover_once(&discovery, &store).await.unwrap();

        assert_eq!(report.pools_added, 1);
        let pool = store.pool_state(&addr(1)).unwrap();
        assert_eq!(pool.sqrt_price_x96, q96);
        assert!(pool.observed_at.is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let discovery = StaticDiscovery::from_json_file("/nonexistent/universe.json");
        assert!(discovery.snapshot().await.is_err());
    }
}
