use config::{Config, ConfigError, Environment, File};
use ethers::prelude::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::simulator::PoolSelection;

pub const DEFAULT_TIER: &str = "default";

#[derive(Debug, Deserialize, Clone)]
pub struct Quoter {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Deadline applied to every request from the moment it is submitted
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum number of pool hops per route
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_split_steps")]
    pub split_steps: usize,
    /// Routes kept for splitting after ranking by full-amount output. 0 keeps all.
    #[serde(default = "default_max_candidate_routes")]
    pub max_candidate_routes: usize,
    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,
    #[serde(default)]
    pub pool_selection: PoolSelection,
}

fn default_flush_interval_ms() -> u64 {
    100
}
fn default_cache_ttl_seconds() -> u64 {
    10
}
fn default_request_timeout_ms() -> u64 {
    3000
}
fn default_max_hops() -> usize {
    3
}
fn default_split_steps() -> usize {
    100
}
fn default_max_candidate_routes() -> usize {
    8
}
fn default_cache_sweep_interval_ms() -> u64 {
    1000
}

impl Default for Quoter {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            request_timeout_ms: default_request_timeout_ms(),
            max_hops: default_max_hops(),
            split_steps: default_split_steps(),
            max_candidate_routes: default_max_candidate_routes(),
            cache_sweep_interval_ms: default_cache_sweep_interval_ms(),
            pool_selection: PoolSelection::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Refresh {
    /// Staleness window in seconds per tier name. Must contain `default`.
    #[serde(default = "default_staleness_windows")]
    pub staleness_windows: HashMap<String, u64>,
    /// Token address -> tier name. Unlisted tokens use `default`.
    #[serde(default)]
    pub token_tiers: HashMap<String, String>,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Compute with the data already in the store when a refresh fails,
    /// instead of holding the request for the next flush.
    #[serde(default = "default_false")]
    pub serve_stale_on_failure: bool,
}

fn default_staleness_windows() -> HashMap<String, u64> {
    HashMap::from([(DEFAULT_TIER.to_string(), 10)])
}
fn default_fetch_timeout_ms() -> u64 {
    2000
}
fn default_false() -> bool {
    false
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            staleness_windows: default_staleness_windows(),
            token_tiers: HashMap::new(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            serve_stale_on_failure: default_false(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    #[serde(default = "default_multicall_address")]
    pub multicall_address: String,
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
    #[serde(default = "default_arbitrum_chain_id")]
    pub chain_id: u64,
}

fn default_multicall_address() -> String {
    // Multicall3, same address on every supported chain
    "0xcA11bde05977b3631167028862bE2a173976CA11".to_string()
}
fn default_multicall_batch_size() -> usize {
    200
}
fn default_arbitrum_chain_id() -> u64 {
    42161
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_urls: Vec::new(),
            multicall_address: default_multicall_address(),
            multicall_batch_size: default_multicall_batch_size(),
            chain_id: default_arbitrum_chain_id(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Discovery {
    #[serde(default = "default_discovery_interval_seconds")]
    pub interval_seconds: u64,
    /// JSON universe snapshot (tokens + pools) used by the static discovery source
    #[serde(default)]
    pub universe_path: Option<String>,
}

fn default_discovery_interval_seconds() -> u64 {
    300
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            interval_seconds: default_discovery_interval_seconds(),
            universe_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub quoter: Quoter,
    #[serde(default)]
    pub refresh: Refresh,
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub discovery: Discovery,
}

impl Settings {
    /// Loads `Config.toml` (if present) and `QUOTER_<SECTION>__<KEY>` environment overrides,
    /// e.g. `QUOTER_QUOTER__MAX_HOPS=2`.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("QUOTER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable overrides for RPC configuration
        if let Ok(raw_http) = env::var("QUOTER_RPC_HTTP_URLS") {
            if let Some(list) = parse_string_list(&raw_http) {
                if !list.is_empty() {
                    settings.rpc.http_urls = list;
                }
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.quoter.flush_interval_ms == 0 {
            return Err(ConfigError::Message(
                "quoter.flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.quoter.cache_sweep_interval_ms == 0 {
            return Err(ConfigError::Message(
                "quoter.cache_sweep_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.quoter.max_hops == 0 {
            return Err(ConfigError::Message(
                "quoter.max_hops must be at least 1".to_string(),
            ));
        }
        for (token, tier) in &self.refresh.token_tiers {
            if !self.refresh.staleness_windows.contains_key(tier) {
                return Err(ConfigError::Message(format!(
                    "refresh.token_tiers: token {} uses unknown tier '{}'",
                    token, tier
                )));
            }
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.quoter.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.quoter.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quoter.cache_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh.fetch_timeout_ms)
    }

    /// Window of the `default` tier, 10s when the tier is not configured.
    pub fn default_staleness_window(&self) -> Duration {
        Duration::from_secs(
            self.refresh
                .staleness_windows
                .get(DEFAULT_TIER)
                .copied()
                .unwrap_or(10),
        )
    }

    /// Token tiers with parsed addresses; malformed addresses are skipped with a warning.
    pub fn token_tier_map(&self) -> HashMap<Address, String> {
        self.refresh
            .token_tiers
            .iter()
            .filter_map(|(token, tier)| match token.parse::<Address>() {
                Ok(address) => Some((address, tier.clone())),
                Err(e) => {
                    log::warn!("Ignoring tier for malformed token address {}: {}", token, e);
                    None
                }
            })
            .collect()
    }

    pub fn multicall_address(&self) -> Result<Address, ConfigError> {
        self.rpc.multicall_address.parse().map_err(|e| {
            ConfigError::Message(format!(
                "rpc.multicall_address '{}' is not an address: {}",
                self.rpc.multicall_address, e
            ))
        })
    }
}

/// Accepts a JSON array or a comma-separated list.
fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).ok();
    }

    Some(
        trimmed
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::default();
        assert_eq!(settings.flush_interval(), Duration::from_millis(100));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(10));
        assert_eq!(settings.quoter.max_hops, 3);
        assert_eq!(settings.quoter.split_steps, 100);
        assert_eq!(settings.quoter.pool_selection, PoolSelection::HighestLiquidity);
        assert_eq!(settings.default_staleness_window(), Duration::from_secs(10));
        assert_eq!(settings.rpc.chain_id, 42161);
        assert!(settings.multicall_address().is_ok());
    }

    #[test]
    fn loads_partial_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[quoter]
flush_interval_ms = 50
pool_selection = "lowest_fee"

[refresh.staleness_windows]
default = 10
majors = 2

[refresh.token_tiers]
"0x82aF49447D8a07e3bd95BD0d56f35241523fBab1" = "majors"
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.quoter.flush_interval_ms, 50);
        assert_eq!(settings.quoter.cache_ttl_seconds, 10);
        assert_eq!(settings.quoter.pool_selection, PoolSelection::LowestFee);
        assert_eq!(settings.refresh.staleness_windows.get("majors"), Some(&2));
        assert_eq!(settings.token_tier_map().len(), 1);
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[refresh.token_tiers]
"0x82aF49447D8a07e3bd95BD0d56f35241523fBab1" = "missing"
"#
        )
        .unwrap();

        assert!(Settings::from_file(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn string_list_formats() {
        assert_eq!(
            parse_string_list(r#"["http://a", "http://b"]"#),
            Some(vec!["http://a".to_string(), "http://b".to_string()])
        );
        assert_eq!(
            parse_string_list("http://a, http://b"),
            Some(vec!["http://a".to_string(), "http://b".to_string()])
        );
        assert_eq!(parse_string_list("  "), Some(vec![]));
    }
}
