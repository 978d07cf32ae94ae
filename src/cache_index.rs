//! Sharded cache index (spec §4.D): the single `backing handle -> Arc<Entry>`
//! map every operation consults before touching the backing adapter.
//!
//! Grounded on `dashmap`'s sharded-map design (chosen over a single
//! `RwLock<HashMap>` the way `mamont/Cargo.toml` already depends on
//! `dashmap` for its own concurrent state) plus
//! `examples/original_source/src/support/generic_weakref.c`'s "the table
//! itself is the one reference that keeps an object alive at all" sentinel
//! discipline (spec invariant 1).

use std::sync::Arc;

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;

use crate::backing::{Backing, BackingHandle};
use crate::cityhash::city_hash64;
use crate::entry::{self, Entry};
use crate::error::Result;
use crate::lru::{LruMembership, LruQueues};
use crate::stats::Stats;
use crate::weakref::WeakRefTable;

/// The cache index itself. One instance per export root (spec §4.D).
pub struct CacheIndex {
    backing: Arc<dyn Backing>,
    table: DashMap<BackingHandle, Arc<Entry>>,
    weak_refs: WeakRefTable<Entry>,
    lru: Arc<LruQueues>,
    stats: Arc<Stats>,
}

impl CacheIndex {
    pub fn new(backing: Arc<dyn Backing>, lru: Arc<LruQueues>, stats: Arc<Stats>) -> Self {
        CacheIndex { backing, table: DashMap::new(), weak_refs: WeakRefTable::new(), lru, stats }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Looks up `handle` without touching the backing adapter. Returns
    /// `None` on a miss without creating anything (spec §4.D `get_latched`).
    /// A hit increments the entry's refcount — an extra reference for the
    /// caller (spec §3 "Reference"), released via [`CacheIndex::unref`].
    pub fn get_latched(&self, handle: &BackingHandle) -> Option<Arc<Entry>> {
        let arc = self.table.get(handle)?.clone();
        if !arc.try_ref() {
            return None;
        }
        self.lru.touch_mru(&mut arc.lru.lock(), &arc.handle);
        self.stats.record_cache_hit();
        Some(arc)
    }

    /// Releases one reference previously handed out by [`CacheIndex::get_latched`],
    /// [`CacheIndex::get_or_insert`], or [`CacheIndex::insert_fresh`] (spec §4.D
    /// `unref`). Does not reclaim the entry itself — a cooled-off, unreferenced
    /// entry is only torn down when the reclaimer pops it off the LRU and calls
    /// [`CacheIndex::try_reclaim`].
    pub fn unref(&self, entry: &Arc<Entry>) {
        entry.unref();
    }

    /// Looks up `handle`, creating a fresh entry via the backing adapter on
    /// a miss (spec §4.D `get_or_insert`). Either path hands back an entry
    /// with its refcount incremented — the sentinel plus one extra reference
    /// for the caller (spec §3 "Reference", §4.D "sentinel ref plus one
    /// extra ref for the caller"), released via [`CacheIndex::unref`].
    /// Concurrent misses for the same handle race to insert; the loser's
    /// freshly-built entry is discarded in favor of the winner's, which is
    /// what every caller observes.
    pub fn get_or_insert(&self, handle: &BackingHandle) -> Result<Arc<Entry>> {
        if let Some(entry) = self.get_latched(handle) {
            return Ok(entry);
        }

        self.stats.record_cache_miss();
        let attrs = self.backing.getattr(handle).map_err(entry::translate_backing_error)?;
        let lane = self.lru.lane_for_hash(city_hash64(&handle.0));
        let membership = LruMembership::fresh(lane);
        let fresh = Arc::new(Entry::new(handle.clone(), &attrs, membership));
        let weak_ref = self.weak_refs.insert(&fresh);
        fresh.publish_weak_ref(weak_ref);

        match self.table.entry(handle.clone()) {
            DashEntry::Occupied(occ) => {
                // Lost the race: someone else's entry is now canonical.
                self.weak_refs.delete(weak_ref);
                let winner = occ.get().clone();
                winner.ref_unconditionally();
                self.lru.touch_mru(&mut winner.lru.lock(), &winner.handle);
                Ok(winner)
            }
            DashEntry::Vacant(vac) => {
                fresh.ref_unconditionally();
                vac.insert(fresh.clone());
                self.lru.insert_mru(lane, handle.clone());
                Ok(fresh)
            }
        }
    }

    /// Registers an entry the caller already constructed out-of-band (used
    /// by `create`-family operations, which get attributes back from the
    /// same backing call that allocated the object, so a second `getattr`
    /// round trip would be wasted). Same race handling and refcount
    /// discipline as [`CacheIndex::get_or_insert`].
    pub fn insert_fresh(&self, handle: &BackingHandle, attrs: &crate::backing::Attrs) -> Arc<Entry> {
        if let Some(existing) = self.get_latched(handle) {
            return existing;
        }
        let lane = self.lru.lane_for_hash(city_hash64(&handle.0));
        let membership = LruMembership::fresh(lane);
        let fresh = Arc::new(Entry::new(handle.clone(), attrs, membership));
        let weak_ref = self.weak_refs.insert(&fresh);
        fresh.publish_weak_ref(weak_ref);
        match self.table.entry(handle.clone()) {
            DashEntry::Occupied(occ) => {
                self.weak_refs.delete(weak_ref);
                let winner = occ.get().clone();
                winner.ref_unconditionally();
                self.lru.touch_mru(&mut winner.lru.lock(), &winner.handle);
                winner
            }
            DashEntry::Vacant(vac) => {
                fresh.ref_unconditionally();
                vac.insert(fresh.clone());
                self.lru.insert_mru(lane, handle.clone());
                fresh
            }
        }
    }

    /// Forcibly removes `handle` from the index, invalidating every
    /// weak reference to it and notifying the backing adapter (spec §3
    /// "Kill"). A no-op if the handle is not present.
    pub fn kill(&self, handle: &BackingHandle) {
        let Some((_, entry)) = self.table.remove(handle) else { return };
        self.weak_refs.delete(entry.weak_ref());
        let membership = *entry.lru.lock();
        self.lru.forget(&membership, &entry.handle);
        self.backing.cleanup(&entry.handle);
        self.stats.record_kill();
    }

    /// True if `handle` is still present in the index (used by tests and by
    /// `invalidate` to decide whether a refresh or a kill is needed).
    pub fn contains(&self, handle: &BackingHandle) -> bool {
        self.table.contains_key(handle)
    }

    /// Attempts to reclaim a candidate the reclaimer popped off the LRU:
    /// kills it if it is still unreferenced (refcount at the sentinel) and
    /// unpinned, otherwise reports it as still in use so the reclaimer
    /// requeues it (spec §4.G, §9).
    pub fn try_reclaim(&self, handle: &BackingHandle) -> crate::lru::EvictOutcome {
        let Some(entry) = self.table.get(handle) else { return crate::lru::EvictOutcome::Evicted };
        let pinned = entry.lru.lock().pinned;
        if pinned || entry.refcount() > 1 {
            return crate::lru::EvictOutcome::StillInUse;
        }
        drop(entry);
        self.kill(handle);
        crate::lru::EvictOutcome::Evicted
    }

    /// Forces `attrs_trusted`/`content_trusted` off for `handle` without
    /// removing it from the index (spec §4.J `invalidate`, weaker than
    /// `kill`).
    pub fn invalidate(&self, handle: &BackingHandle) {
        if let Some(entry) = self.table.get(handle) {
            let mut attrs = entry.attr_lock.write();
            attrs.attrs_trusted = false;
            attrs.content_trusted = false;
            self.stats.record_invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{self, test_support::InMemoryBacking};

    fn index() -> (CacheIndex, Arc<InMemoryBacking>) {
        let backing = Arc::new(InMemoryBacking::new());
        let lru = Arc::new(LruQueues::new(4));
        let stats = Arc::new(Stats::new());
        (CacheIndex::new(backing.clone(), lru, stats), backing)
    }

    #[test]
    fn miss_then_hit_reuses_same_entry() {
        let (idx, backing) = index();
        let handle = backing.add_root_child(backing::Kind::Regular, b"a");
        let first = idx.get_or_insert(&handle).unwrap();
        let second = idx.get_or_insert(&handle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn kill_removes_from_index() {
        let (idx, backing) = index();
        let handle = backing.add_root_child(backing::Kind::Regular, b"a");
        idx.get_or_insert(&handle).unwrap();
        assert!(idx.contains(&handle));
        idx.kill(&handle);
        assert!(!idx.contains(&handle));
    }

    #[test]
    fn invalidate_clears_trust_bits_without_removing() {
        let (idx, backing) = index();
        let handle = backing.add_root_child(backing::Kind::Regular, b"a");
        let entry = idx.get_or_insert(&handle).unwrap();
        idx.invalidate(&handle);
        assert!(!entry.attr_lock.read().attrs_trusted);
        assert!(idx.contains(&handle));
    }
}
