//! In-memory LRU cache for rendered tiles.
//!
//! This provides sub-millisecond access to recently rendered chips and, via
//! single-flight deduplication, guarantees that concurrent requests for the
//! same render key trigger at most one decode+render.
//!
//! ## Eviction
//!
//! Capacity is bounded by entry count or by total byte size. Eviction is
//! strict least-recently-used: on overflow the oldest entries are popped one
//! at a time until the cache is back under budget.
//!
//! ## Single-flight
//!
//! The cache check and the in-flight registration happen under one lock, so
//! the "check cache, register, compute, publish" sequence cannot race:
//! while a leader is rendering, every other caller for the same key parks on
//! a watch channel and receives the leader's result, errors included. Failed
//! computations are published to current waiters but never stored, so a
//! transient failure cannot poison later identical requests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use chip_common::{ChipError, ChipResult, RenderKey};

/// Cache capacity bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLimit {
    /// Maximum number of cached tiles.
    Entries(usize),
    /// Maximum total size of cached tile bytes.
    Bytes(u64),
}

struct CacheEntry {
    bytes: Bytes,
    /// Logical access stamp, refreshed on every hit.
    last_access: u64,
}

type FlightResult = ChipResult<Bytes>;

struct CacheState {
    entries: LruCache<RenderKey, CacheEntry>,
    current_bytes: u64,
    /// Logical clock driving `last_access` stamps.
    access_clock: u64,
    inflight: HashMap<RenderKey, watch::Receiver<Option<FlightResult>>>,
}

/// Statistics for the tile cache.
///
/// All fields are atomic for lock-free reads from status endpoints.
#[derive(Default)]
pub struct TileCacheStats {
    /// Total cache hits
    pub hits: AtomicU64,
    /// Total cache misses
    pub misses: AtomicU64,
    /// Misses that attached to an already-running computation
    pub coalesced: AtomicU64,
    /// Total entries evicted
    pub evictions: AtomicU64,
    /// Current cache size in bytes
    pub size_bytes: AtomicU64,
    /// Current number of entries in cache
    pub entry_count: AtomicU64,
}

impl TileCacheStats {
    /// Calculate cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// Bounded LRU store of rendered tile bytes, keyed by [`RenderKey`].
pub struct TileCache {
    state: Mutex<CacheState>,
    limit: CacheLimit,
    stats: Arc<TileCacheStats>,
}

impl TileCache {
    pub fn new(limit: CacheLimit) -> Self {
        Self {
            state: Mutex::new(CacheState {
                // The LruCache tracks recency only; eviction against the
                // configured budget is handled in insert_locked.
                entries: LruCache::unbounded(),
                current_bytes: 0,
                access_clock: 0,
                inflight: HashMap::new(),
            }),
            limit,
            stats: Arc::new(TileCacheStats::default()),
        }
    }

    /// Return the cached bytes for `key`, or run `compute` to produce them.
    ///
    /// At most one `compute` runs per key at any moment; concurrent callers
    /// share its outcome. Errors from `compute` propagate to every waiting
    /// caller and are never cached.
    pub async fn get_or_compute<F, Fut>(&self, key: RenderKey, compute: F) -> ChipResult<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult>,
    {
        enum Role {
            Leader(watch::Sender<Option<FlightResult>>),
            Follower(watch::Receiver<Option<FlightResult>>),
        }

        // Check cache and register the flight under one lock; a published
        // result can therefore never be recomputed by a racing caller.
        let role = {
            let mut state = self.state.lock().await;
            state.access_clock += 1;
            let stamp = state.access_clock;

            if let Some(entry) = state.entries.get_mut(&key) {
                entry.last_access = stamp;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.bytes.clone());
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);

            match state.inflight.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.inflight.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                let result = compute().await;
                {
                    let mut state = self.state.lock().await;
                    state.inflight.remove(&key);
                    if let Ok(bytes) = &result {
                        self.insert_locked(&mut state, key.clone(), bytes.clone());
                    }
                }
                // Publish after the entry is visible in the cache
                let _ = tx.send(Some(result.clone()));
                result
            }
            Role::Follower(mut rx) => {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key.cache_key(), "awaiting in-flight render");
                loop {
                    {
                        let value = rx.borrow_and_update();
                        if let Some(result) = value.as_ref() {
                            return result.clone();
                        }
                    }
                    if rx.changed().await.is_err() {
                        // Leader dropped without publishing (panicked task)
                        return Err(ChipError::Internal(format!(
                            "render abandoned for {}",
                            key.cache_key()
                        )));
                    }
                }
            }
        }
    }

    /// Insert an entry and evict strictly-LRU until back under budget.
    fn insert_locked(&self, state: &mut CacheState, key: RenderKey, bytes: Bytes) {
        let size = bytes.len() as u64;

        // An entry larger than the whole byte budget would evict everything
        // and still not fit; serve it uncached.
        if let CacheLimit::Bytes(max) = self.limit {
            if size > max {
                debug!(
                    key = %key.cache_key(),
                    size,
                    max,
                    "tile exceeds cache budget, not stored"
                );
                return;
            }
        }

        if let Some(old) = state.entries.put(
            key,
            CacheEntry {
                bytes,
                last_access: state.access_clock,
            },
        ) {
            state.current_bytes -= old.bytes.len() as u64;
        } else {
            self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        state.current_bytes += size;
        self.stats.size_bytes.store(state.current_bytes, Ordering::Relaxed);

        let mut evicted = 0u64;
        let mut bytes_freed = 0u64;
        while self.over_budget(state) {
            let Some((old_key, old_entry)) = state.entries.pop_lru() else {
                break;
            };
            let old_size = old_entry.bytes.len() as u64;
            state.current_bytes -= old_size;
            evicted += 1;
            bytes_freed += old_size;
            debug!(
                key = %old_key.cache_key(),
                last_access = old_entry.last_access,
                "evicted tile"
            );
        }

        if evicted > 0 {
            self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
            self.stats
                .entry_count
                .fetch_sub(evicted, Ordering::Relaxed);
            self.stats.size_bytes.store(state.current_bytes, Ordering::Relaxed);
            info!(
                evicted,
                bytes_freed,
                cache_bytes = state.current_bytes,
                "tile cache eviction completed"
            );
        }
    }

    fn over_budget(&self, state: &CacheState) -> bool {
        match self.limit {
            CacheLimit::Entries(max) => state.entries.len() > max,
            CacheLimit::Bytes(max) => state.current_bytes > max,
        }
    }

    /// Current number of cached entries.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current total size of cached tile bytes.
    pub async fn size_bytes(&self) -> u64 {
        self.state.lock().await.current_bytes
    }

    /// Whether a key is currently cached, without touching recency.
    pub async fn contains(&self, key: &RenderKey) -> bool {
        self.state.lock().await.entries.peek(key).is_some()
    }

    pub fn stats(&self) -> &TileCacheStats {
        &self.stats
    }
}
