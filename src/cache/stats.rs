//! Cache Statistics Module
//!
//! Tracks lookup outcomes and reports aggregate store figures.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of lookups answered with live content
    pub hits: u64,
    /// Number of lookups that found nothing, an expired entry, or a corrupt one
    pub misses: u64,
    /// Number of entries removed by purge passes
    pub purged: u64,
    /// Entry nodes currently stored, expired ones included
    pub total_entries: usize,
    /// Payload bytes currently stored
    pub total_bytes: u64,
    /// Configured maximum store size in bytes
    pub max_size_bytes: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Share of the maximum store size in use, in percent.
    pub fn usage_percent(&self) -> f64 {
        if self.max_size_bytes == 0 {
            0.0
        } else {
            self.total_bytes as f64 * 100.0 / self.max_size_bytes as f64
        }
    }
}

// == Counters ==
/// Lock-free counters shared by every thread using the store.
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    purged: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Purge ==
    pub fn record_purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Builds a stats snapshot from the counters and the given aggregates.
    pub fn snapshot(&self, total_entries: usize, total_bytes: u64, max_size_bytes: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            total_entries,
            total_bytes,
            max_size_bytes,
        }
    }
}
