//! Counters exposed by the orchestrator
//!
//! Every failure the cache swallows on behalf of its callers is counted here,
//! so a cache that silently stopped working is still visible.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated without locking
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
    fallback_reads: AtomicU64,
    fallback_writes: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    promotions: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups that returned a value
    pub hits: u64,
    /// Lookups that returned nothing, for whatever reason
    pub misses: u64,
    /// Remote calls that failed and were retried against the file backend
    pub remote_errors: u64,
    /// Hits served by the per-call file fallback
    pub fallback_reads: u64,
    /// Writes stored by the per-call file fallback
    pub fallback_writes: u64,
    /// File reads that failed outright (not counting plain misses)
    pub read_failures: u64,
    /// Writes that were dropped
    pub write_failures: u64,
    /// Times a degraded cache went back to the remote backend
    pub promotions: u64,
}

impl CacheStats {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback_read(&self) {
        self.fallback_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback_write(&self) {
        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            fallback_reads: self.fallback_reads.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }
}
