//! Inode cache and state coordination core for a userspace NFSv3/NFSv4
//! server: the sharded cache index, generational weak references, the
//! multi-tier pinning LRU, the open-FD cache, the POSIX/ACL permission
//! engine, the operation surface, the read-only pseudo-filesystem, and the
//! client/lease/delegation state registry.
//!
//! Everything here runs synchronously on whatever OS thread calls it (spec
//! §5, §9); the wire protocol, RPC transport, and mount/lock sub-protocols
//! that decode requests into calls against this crate are an external
//! collaborator, out of scope.

pub mod backing;
pub mod cache_index;
pub mod cityhash;
pub mod config;
pub mod context;
pub mod dirent;
pub mod entry;
pub mod error;
pub mod fd_cache;
pub mod handle;
pub mod lru;
pub mod ops;
pub mod permission;
pub mod pseudofs;
pub mod state;
pub mod stats;
pub mod weakref;

use std::sync::Arc;
use std::time::Duration;

use crate::backing::{Backing, BackingHandle};
use crate::config::Config;
use crate::lru::{EvictOutcome, Reclaimer};
use crate::ops::Cache;
use crate::pseudofs::PseudoFs;
use crate::state::Reaper;

/// The fully assembled core, with both of its background threads running.
/// Spec §9 describes each piece of global mutable state as "a named
/// subsystem with explicit init/shutdown entry points"; this is that entry
/// point.
pub struct Core {
    pub cache: Arc<Cache>,
    pub pseudofs: Arc<PseudoFs>,
    reclaimer: Option<Reclaimer>,
    reaper: Option<Reaper>,
}

impl Core {
    /// Initializes the cache index, LRU, state registry, and pseudo-fs, and
    /// starts the reclaimer and lease-reaper threads.
    pub fn init(backing: Arc<dyn Backing>, config: Config) -> Self {
        let cache = Arc::new(Cache::new(backing, config.clone()));
        let pseudofs = Arc::new(PseudoFs::new());

        let reclaimer = {
            let cache_for_evict = cache.clone();
            Reclaimer::spawn(cache.lru.clone(), config.lru.clone(), move |handle: &BackingHandle| -> EvictOutcome {
                cache_for_evict.index.try_reclaim(handle)
            })
        };

        let reaper = Reaper::spawn(cache.state.clone(), config.lease.clone(), Duration::from_secs(config.reaper.interval_seconds));

        Core { cache, pseudofs, reclaimer: Some(reclaimer), reaper: Some(reaper) }
    }

    /// Stops both background threads, waiting for each to exit. The cache
    /// itself needs no explicit teardown beyond dropping it: every handle
    /// still referenced stays valid through ordinary `Arc` drop order.
    pub fn shutdown(mut self) {
        if let Some(reclaimer) = self.reclaimer.take() {
            reclaimer.shutdown();
        }
        if let Some(reaper) = self.reaper.take() {
            reaper.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;

    #[test]
    fn init_then_shutdown_is_clean() {
        let backing = Arc::new(InMemoryBacking::new());
        let core = Core::init(backing, Config::default());
        assert_eq!(core.cache.index.len(), 0);
        core.shutdown();
    }
}
