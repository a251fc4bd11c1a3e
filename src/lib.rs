//! # MIG Quote Engine
//!
//! Real-time token swap quoting over on-chain liquidity pools.
//!
//! ## Overview
//!
//! Clients submit "how much `token_out` for `amount_in` of `token_in`?" and get
//! back either a single best route or a split across several routes, priced
//! against pool state that is never older than its staleness window.
//!
//! ## Architecture
//!
//! ### State Layer
//! [`state_store::StateStore`] holds tokens, pools and the token adjacency index.
//! Pool records are replaced atomically; readers never see a half-written pool.
//!
//! ### Routing & Pricing
//! [`router::Router`] enumerates simple paths up to `max_hops`,
//! [`simulator::TradeSimulator`] prices them hop by hop with exact integer math
//! ([`v3_math`]), and [`allocation::AllocationOptimizer`] splits the amount greedily.
//!
//! ### Pipeline
//! [`pipeline::QuoteEngine`] batches requests every flush interval, serves
//! repeats from [`quote_cache::QuoteCache`], refreshes stale pools per chain via
//! [`refresh::RefreshController`] and fans each result out to every waiter.
//!
//! ### Chain Access
//! [`state_fetcher::MulticallStateFetcher`] reads `slot0`/`liquidity` through
//! Multicall3; [`discovery`] seeds the token and pool universe.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mig_quote_engine::{
//!     pipeline::{EngineConfig, QuoteEngine},
//!     quote_cache::QuoteKey,
//!     refresh::RefreshController,
//!     settings::Settings,
//!     state_fetcher::PoolStateFetcher,
//!     state_store::StateStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn run(fetcher: Arc<dyn PoolStateFetcher>, key: QuoteKey) {
//! let settings = Settings::default();
//! let store = Arc::new(StateStore::new());
//! let refresh = Arc::new(RefreshController::from_settings(Arc::clone(&store), fetcher, &settings));
//! let engine = QuoteEngine::new(EngineConfig::from_settings(&settings), store, refresh);
//!
//! match engine.quote(key).await {
//!     Ok(quote) => println!("out: {}", quote.amount_out()),
//!     Err(e) => eprintln!("{}", e),
//! }
//! # }
//! ```

// Core Types
/// Token and pool records
pub mod pools;
/// Common types and data structures
pub mod types;
/// Quote failure outcomes
pub mod errors;

// State Layer
/// Concurrent token/pool store with adjacency index
pub mod state_store;

// Routing & Pricing
/// Route primitives and breadth-first route search
pub mod router;
/// Exact integer swap math over `sqrtPriceX96` pools
pub mod v3_math;
/// Route simulation against the state store
pub mod simulator;
/// Greedy multi-route allocation
pub mod allocation;

// Pipeline
/// TTL cache of computed quotes
pub mod quote_cache;
/// Staleness tracking and batched pool refresh
pub mod refresh;
/// Intake, flush worker and result dispatch
pub mod pipeline;

// Chain Access
/// Contract bindings
pub mod contracts;
/// Multicall3 batching
pub mod multicall;
/// On-chain pool state reads
pub mod state_fetcher;
/// Token and pool universe sources
pub mod discovery;

// Configuration & Observability
/// Configuration management
pub mod settings;
/// Metrics collection
pub mod metrics;

pub use allocation::{Allocation, Quote, RouteQuote};
pub use errors::QuoteError;
pub use pipeline::{EngineConfig, QuoteEngine, QuoteHandle};
pub use pools::{PoolState, Token};
pub use quote_cache::QuoteKey;
pub use router::Route;
pub use state_store::StateStore;
