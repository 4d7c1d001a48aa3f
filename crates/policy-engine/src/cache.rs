//! Decision memoization keyed by everything a decision depends on.
//!
//! The cache only ever holds entries for one policy version. A key carrying a
//! newer version clears it; a key carrying an older version (an evaluation
//! that captured the previous snapshot) bypasses it entirely.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use winewarden_core::trust::TrustTier;
use winewarden_core::types::Operation;

use crate::decision::PolicyDecision;
use crate::policy::PolicyVersion;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target: PathBuf,
    pub prefix_root: PathBuf,
    pub operation: Operation,
    pub tier: TrustTier,
    pub version: PolicyVersion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
}

struct CacheState {
    version: PolicyVersion,
    entries: LruCache<CacheKey, PolicyDecision>,
}

pub struct DecisionCache {
    state: Option<Mutex<CacheState>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .finish()
    }
}

impl DecisionCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize, version: PolicyVersion) -> Self {
        let state = NonZeroUsize::new(capacity).map(|capacity| {
            Mutex::new(CacheState {
                version,
                entries: LruCache::new(capacity),
            })
        });
        Self {
            state,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, PolicyVersion::INITIAL)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// The compute closure runs outside the cache lock.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> PolicyDecision
    where
        F: FnOnce() -> PolicyDecision,
    {
        let Some(state) = &self.state else {
            return compute();
        };

        {
            let mut guard = state.lock();
            if key.version == guard.version {
                if let Some(hit) = guard.entries.get(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return hit.clone();
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let decision = compute();

        let mut guard = state.lock();
        if key.version > guard.version {
            self.clear_locked(&mut guard, key.version);
        }
        if key.version == guard.version {
            if let Some((evicted, _)) = guard.entries.push(key.clone(), decision.clone()) {
                if evicted != key {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        decision
    }

    /// Drops every entry; subsequent keys must carry `version` to be stored.
    pub fn invalidate(&self, version: PolicyVersion) {
        if let Some(state) = &self.state {
            let mut guard = state.lock();
            self.clear_locked(&mut guard, version);
        }
    }

    fn clear_locked(&self, state: &mut CacheState, version: PolicyVersion) {
        let dropped = state.entries.len();
        state.entries.clear();
        state.version = version;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(version = %version, dropped, "decision cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.lock().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
