//! Operation surface (spec §4.J): one module per operation, each a plain
//! function over a [`Cache`] — the assembled cache index, LRU queues,
//! backing adapter, state registry, stats, and config spec §9 describes as
//! "named subsystems with explicit init/shutdown entry points".
//!
//! Grounded on `examples/RMamonts-nfs-mamont/src/vfs/lookup.rs` and
//! `create.rs`'s one-module-per-operation shape, restructured from their
//! `Args`/`Success`/`Fail`/async-`Promise` pattern (needed there for wiring
//! through an async RPC dispatcher) to direct `Result<T, Error>` returns,
//! since this core is synchronous (spec §5, §9; SPEC_FULL.md §B).

pub mod access;
pub mod close;
pub mod create;
pub mod invalidate;
pub mod kill;
pub mod link;
pub mod lookup;
pub mod open;
pub mod readdir;
pub mod readlink;
pub mod read;
pub mod remove;
pub mod rename;
pub mod setattr;
pub mod write;

use std::sync::Arc;

use crate::backing::{Backing, BackingHandle};
use crate::cache_index::CacheIndex;
use crate::config::Config;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::lru::LruQueues;
use crate::state::StateRegistry;
use crate::stats::Stats;

/// The assembled core. One instance per export root (spec §9).
pub struct Cache {
    pub index: CacheIndex,
    pub lru: Arc<LruQueues>,
    pub backing: Arc<dyn Backing>,
    pub state: Arc<StateRegistry>,
    pub stats: Arc<Stats>,
    pub config: Config,
}

impl Cache {
    pub fn new(backing: Arc<dyn Backing>, config: Config) -> Self {
        let lru = Arc::new(LruQueues::new(config.lru.lanes));
        let stats = Arc::new(Stats::new());
        let index = CacheIndex::new(backing.clone(), lru.clone(), stats.clone());
        let state = Arc::new(StateRegistry::new(config.lease.clone(), config.deleg.clone()));
        Cache { index, lru, backing, state, stats, config }
    }
}

/// RAII guard representing one logical reference to an entry for the
/// duration of an operation (spec §3 "Reference", §4.G `ref`/`unref`):
/// acquired at the top of every op that touches an entry or parent so the
/// reclaimer cannot pick it as a candidate out from under an in-flight call.
/// Releasing the guard is `unref`.
pub(crate) struct EntryRef<'a>(&'a Entry);

impl Drop for EntryRef<'_> {
    fn drop(&mut self) {
        self.0.unref();
    }
}

/// Acquires an [`EntryRef`] on `entry` (spec §4.G `ref`), failing with
/// [`Error::DeadEntry`] if it has already been killed (spec §7 "`DEAD_ENTRY`
/// is returned to any attempt to `ref` an entry whose refcount is zero").
pub(crate) fn ref_entry<'a>(cache: &Cache, entry: &'a Arc<Entry>) -> Result<EntryRef<'a>> {
    if !entry.try_ref() {
        return Err(Error::DeadEntry);
    }
    cache.lru.touch_mru(&mut entry.lru.lock(), &entry.handle);
    Ok(EntryRef(&**entry))
}

/// Reacts to a stale-handle error from the backing adapter by killing the
/// entry at `handle` (spec §7 propagation policy: "`STALE_HANDLE`
/// additionally triggers `kill(entry)`"), then passes the error through
/// unchanged.
pub(crate) fn kill_on_stale<T>(cache: &Cache, handle: &BackingHandle, result: Result<T>) -> Result<T> {
    if let Err(Error::StaleHandle) = &result {
        cache.index.kill(handle);
    }
    result
}
