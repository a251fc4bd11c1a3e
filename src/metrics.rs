// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
    Milliseconds,
}

// Macros for metrics when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        $(let _ = (&$label, &$label_value);)*
    }};
}

// Macros for describe_* functions when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
#[allow(unused_imports)]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

use std::time::Duration;

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "quoter_cache_hit_total",
        Unit::Count,
        "Total cache hits, labeled by cache name."
    );
    describe_counter!(
        "quoter_cache_miss_total",
        Unit::Count,
        "Total cache misses, labeled by cache name."
    );
    describe_gauge!(
        "quoter_cache_size",
        "Number of entries held, labeled by cache name."
    );

    describe_histogram!(
        "quoter_flush_batch_size",
        "Requests drained from the intake queue per flush."
    );
    describe_histogram!(
        "quoter_flush_unique_keys",
        "Distinct quote keys per flush after de-duplication."
    );
    describe_histogram!(
        "quoter_dedup_fanout",
        "Requests answered by a single computation."
    );

    describe_counter!(
        "quoter_refresh_total",
        Unit::Count,
        "Total on-chain refresh batches, labeled by chain and outcome."
    );
    describe_histogram!(
        "quoter_refresh_duration_seconds",
        Unit::Seconds,
        "Duration of on-chain refresh batches, labeled by chain."
    );
    describe_histogram!(
        "quoter_refresh_pools",
        "Pools requested per refresh batch."
    );
    describe_histogram!(
        "quoter_multicall_batch_size",
        "Calls per aggregate3 request."
    );

    describe_counter!(
        "quoter_quote_outcome_total",
        Unit::Count,
        "Resolved quote requests, labeled by outcome (single, split or error kind)."
    );
    describe_histogram!(
        "quoter_compute_duration_seconds",
        Unit::Seconds,
        "Routing, simulation and allocation time per unique key."
    );
}

pub fn increment_cache_hit(cache: &'static str) {
    increment_counter!("quoter_cache_hit_total", "cache" => cache);
}

pub fn increment_cache_miss(cache: &'static str) {
    increment_counter!("quoter_cache_miss_total", "cache" => cache);
}

pub fn set_cache_size(cache: &'static str, size: f64) {
    gauge!("quoter_cache_size", size, "cache" => cache);
}

pub fn record_flush_batch(requests: usize, unique_keys: usize) {
    histogram!("quoter_flush_batch_size", requests as f64);
    histogram!("quoter_flush_unique_keys", unique_keys as f64);
}

pub fn record_dedup_fanout(waiters: usize) {
    histogram!("quoter_dedup_fanout", waiters as f64);
}

pub fn record_refresh(chain_id: u64, pools: usize, duration: Duration, success: bool) {
    let chain = chain_id.to_string();
    let outcome = if success { "ok" } else { "failed" };
    counter!("quoter_refresh_total", 1, "chain" => chain.clone(), "outcome" => outcome);
    histogram!("quoter_refresh_duration_seconds", duration.as_secs_f64(), "chain" => chain);
    histogram!("quoter_refresh_pools", pools as f64);
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("quoter_multicall_batch_size", size);
}

pub fn increment_quote_outcome(outcome: &'static str) {
    increment_counter!("quoter_quote_outcome_total", "outcome" => outcome);
}

pub fn record_compute_duration(duration: Duration) {
    histogram!("quoter_compute_duration_seconds", duration.as_secs_f64());
}
