// Quote Cache - TTL cache of computed quotes keyed by request
// Expired entries are never served: they are evicted on read and by the periodic sweep.

use dashmap::DashMap;
use ethers::prelude::{Address, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::allocation::Quote;
use crate::metrics;

/// Identity of a quote request. Identical keys share one computation and one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub chain_id: u64,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
}

#[derive(Debug, Clone)]
pub struct CachedQuote {
    pub quote: Quote,
    pub expires_at: Instant,
}

#[derive(Default, Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_evictions: AtomicU64,
    inserts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_evictions: u64,
    pub inserts: u64,
    pub size: usize,
}

#[derive(Debug)]
pub struct QuoteCache {
    entries: DashMap<QuoteKey, CachedQuote>,
    ttl: Duration,
    metrics: CacheMetrics,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached quote for `key`, if present and not yet expired.
    pub fn get(&self, key: &QuoteKey) -> Option<Quote> {
        let now = Instant::now();
        let fresh = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.quote.clone()),
            Some(_) => None,
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_miss("quote");
                return None;
            }
        };

        match fresh {
            Some(quote) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_hit("quote");
                Some(quote)
            }
            None => {
                // Only drop the entry if it is still the expired one.
                if self
                    .entries
                    .remove_if(key, |_, cached| cached.expires_at <= now)
                    .is_some()
                {
                    self.metrics.stale_evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_miss("quote");
                None
            }
        }
    }

    pub fn put(&self, key: QuoteKey, quote: Quote) {
        self.put_with_ttl(key, quote, self.ttl);
    }

    pub fn put_with_ttl(&self, key: QuoteKey, quote: Quote, ttl: Duration) {
        let cached = CachedQuote {
            quote,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key, cached);
        self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, cached| {
            if cached.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.metrics
                .stale_evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        metrics::set_cache_size("quote", self.entries.len() as f64);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            stale_evictions: self.metrics.stale_evictions.load(Ordering::Relaxed),
            inserts: self.metrics.inserts.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}
