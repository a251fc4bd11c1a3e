//! # Quoter
//!
//! One-shot quote from the command line against live chain state.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin quoter -- --universe universe.json \
//!     --token-in 0x82aF49447D8a07e3bd95BD0d56f35241523fBab1 \
//!     --token-out 0xaf88d065e77c8cC2239327C5EDb3A432268e5831 \
//!     --amount 1000000000000000000
//! ```
//!
//! RPC endpoints come from `Config.toml` (`rpc.http_urls`) or `QUOTER_RPC_HTTP_URLS`.

use anyhow::{anyhow, Result};
use clap::Parser;
use ethers::prelude::{Http, Provider};
use log::info;
use mig_quote_engine::{
    discovery::{discover_once, spawn_discovery_loop, PoolDiscovery, StaticDiscovery},
    multicall::Multicall,
    pipeline::QuoteEngine,
    refresh::RefreshController,
    settings::Settings,
    state_fetcher::MulticallStateFetcher,
    state_store::StateStore,
    types::{conversions::u256_to_decimal, QuoteRequest, QuoteResponse},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "quoter", about = "Quote a token swap over on-chain liquidity pools")]
struct Cli {
    /// Config file (defaults to ./Config.toml when present)
    #[arg(long)]
    config: Option<String>,
    /// Universe JSON (tokens + pools); overrides discovery.universe_path
    #[arg(long)]
    universe: Option<PathBuf>,
    #[arg(long)]
    token_in: String,
    #[arg(long)]
    token_out: String,
    /// Raw input amount in the smallest unit of token_in
    #[arg(long)]
    amount: String,
    /// Defaults to rpc.chain_id; any other chain is rejected
    #[arg(long)]
    chain_id: Option<u64>,
}

fn init_logging() {
    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
            log::warn!("Prometheus exporter not started: {}", e);
        }
        mig_quote_engine::metrics::describe_metrics();
    }
    #[cfg(not(feature = "observability"))]
    env_logger::init();
}

/// The fetcher only serves the configured RPC chain; any other chain would never refresh.
fn resolve_chain_id(requested: Option<u64>, configured: u64) -> Result<u64> {
    match requested {
        Some(chain_id) if chain_id != configured => Err(anyhow!(
            "--chain-id {} does not match rpc.chain_id {}",
            chain_id,
            configured
        )),
        _ => Ok(configured),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };
    let chain_id = resolve_chain_id(cli.chain_id, settings.rpc.chain_id)?;

    let store = Arc::new(StateStore::new());

    let universe = cli
        .universe
        .clone()
        .or_else(|| settings.discovery.universe_path.clone().map(PathBuf::from))
        .ok_or_else(|| anyhow!("no universe file: pass --universe or set discovery.universe_path"))?;
    let discovery: Arc<dyn PoolDiscovery> = Arc::new(StaticDiscovery::from_json_file(&universe));
    let report = discover_once(discovery.as_ref(), &store).await?;
    info!(
        "Loaded {} tokens and {} pools from {}",
        report.tokens,
        report.pools_added,
        universe.display()
    );
    let discovery_task = spawn_discovery_loop(
        discovery,
        Arc::clone(&store),
        Duration::from_secs(settings.discovery.interval_seconds),
    );

    let rpc_url = settings
        .rpc
        .http_urls
        .first()
        .ok_or_else(|| anyhow!("rpc.http_urls is empty"))?;
    let provider = Arc::new(Provider::<Http>::try_from(rpc_url.as_str())?);
    let multicall = Multicall::new(
        provider,
        settings.multicall_address()?,
        settings.rpc.multicall_batch_size,
    )
    .with_timeout(settings.fetch_timeout());
    let fetcher = Arc::new(
        MulticallStateFetcher::new(Arc::clone(&store)).with_chain(chain_id, multicall),
    );
    let refresh = Arc::new(RefreshController::from_settings(
        Arc::clone(&store),
        fetcher,
        &settings,
    ));
    let engine = QuoteEngine::from_settings(&settings, store, refresh);

    let request = QuoteRequest {
        token_in: cli.token_in,
        token_out: cli.token_out,
        amount_in: cli.amount,
        chain_id,
    };
    let result = engine.submit_request(&request).wait().await;

    if let (Ok(quote), Ok(key)) = (&result, request.to_key()) {
        if let Some(meta) = engine.store().token_meta(&key.token_out) {
            if let Ok(amount) = u256_to_decimal(quote.amount_out(), meta.decimals) {
                info!("{} {}", amount, meta.symbol);
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&QuoteResponse::from(result))?);

    discovery_task.abort();
    engine.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_defaults_to_the_rpc_chain() {
        assert_eq!(resolve_chain_id(None, 42161).unwrap(), 42161);
        assert_eq!(resolve_chain_id(Some(42161), 42161).unwrap(), 42161);
    }

    #[test]
    fn chain_id_without_an_rpc_is_rejected() {
        assert!(resolve_chain_id(Some(1), 42161).is_err());
    }
}
