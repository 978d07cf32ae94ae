//! Per-operation atomic counters (spec §5 "Statistics counters are
//! per-operation atomics").
//!
//! A metrics/heartbeat collaborator (out of scope) reads these; the core
//! only needs to keep them accurate and cheap to increment.

use std::sync::atomic::{AtomicU64, Ordering};

/// One counter per operation family in the surface (spec §4.J/§2).
#[derive(Debug, Default)]
pub struct Stats {
    pub lookups: AtomicU64,
    pub creates: AtomicU64,
    pub links: AtomicU64,
    pub renames: AtomicU64,
    pub removes: AtomicU64,
    pub readdirs: AtomicU64,
    pub readlinks: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub setattrs: AtomicU64,
    pub opens: AtomicU64,
    pub closes: AtomicU64,
    pub invalidates: AtomicU64,
    pub kills: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub evictions: AtomicU64,
    pub delegation_grants: AtomicU64,
    pub delegation_recalls: AtomicU64,
    pub delegation_revocations: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

macro_rules! bump_fn {
    ($name:ident, $field:ident) => {
        impl Stats {
            #[doc = concat!("Increments the `", stringify!($field), "` counter.")]
            pub fn $name(&self) {
                Self::bump(&self.$field);
            }
        }
    };
}

bump_fn!(record_lookup, lookups);
bump_fn!(record_create, creates);
bump_fn!(record_link, links);
bump_fn!(record_rename, renames);
bump_fn!(record_remove, removes);
bump_fn!(record_readdir, readdirs);
bump_fn!(record_readlink, readlinks);
bump_fn!(record_read, reads);
bump_fn!(record_write, writes);
bump_fn!(record_setattr, setattrs);
bump_fn!(record_open, opens);
bump_fn!(record_close, closes);
bump_fn!(record_invalidate, invalidates);
bump_fn!(record_kill, kills);
bump_fn!(record_cache_hit, cache_hits);
bump_fn!(record_cache_miss, cache_misses);
bump_fn!(record_eviction, evictions);
bump_fn!(record_delegation_grant, delegation_grants);
bump_fn!(record_delegation_recall, delegation_recalls);
bump_fn!(record_delegation_revocation, delegation_revocations);
