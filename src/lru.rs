//! Multi-tier LRU with pinning (spec §4.G), plus the background reclaimer
//! thread that walks it (spec §5, §9).
//!
//! Grounded on `examples/original_source/src/Cache_inode/cache_inode_lru.c`'s
//! layout: two queue tiers (`LRU_1`/`LRU_2`), `N` lanes to spread lock
//! contention, and a separate uncollectable "pinned" list per lane. That file
//! keeps an intrusive doubly-linked list per queue for O(1) move-to-MRU;
//! here each queue is a `parking_lot::Mutex<VecDeque<BackingHandle>>` instead
//! (DESIGN.md Open Question #3) — O(lane length) per move, bounded in
//! practice by `lru.lanes` keeping any one lane short, in exchange for no
//! unsafe intrusive pointers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backing::BackingHandle;
use crate::config::LruConfig;

/// Which queue tier an entry currently sits in (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Recently referenced; reclaimed only after every `L1` candidate in a
    /// lane has already been checked.
    L1,
    /// Cooled off an `L1` queue without being re-referenced; reclaimed first.
    L2,
}

/// An entry's LRU bookkeeping (spec §3 "LRU membership"), held behind the
/// entry's own `lru` mutex ([`crate::entry::Entry::lru`]).
#[derive(Debug, Clone, Copy)]
pub struct LruMembership {
    pub lane: usize,
    pub tier: Tier,
    pub pinned: bool,
}

impl LruMembership {
    /// The membership a brand-new entry is given before it is inserted into
    /// its lane's queue by [`LruQueues::insert_mru`].
    pub fn fresh(lane: usize) -> Self {
        LruMembership { lane, tier: Tier::L1, pinned: false }
    }
}

struct Lane {
    l1: parking_lot::Mutex<VecDeque<BackingHandle>>,
    l2: parking_lot::Mutex<VecDeque<BackingHandle>>,
    pinned: parking_lot::Mutex<VecDeque<BackingHandle>>,
}

impl Lane {
    fn new() -> Self {
        Lane {
            l1: parking_lot::Mutex::new(VecDeque::new()),
            l2: parking_lot::Mutex::new(VecDeque::new()),
            pinned: parking_lot::Mutex::new(VecDeque::new()),
        }
    }
}

fn remove_first(queue: &mut VecDeque<BackingHandle>, handle: &BackingHandle) -> bool {
    if let Some(pos) = queue.iter().position(|h| h == handle) {
        queue.remove(pos);
        true
    } else {
        false
    }
}

/// The sharded queue set itself (spec §4.G "N lanes"). Holds only handles;
/// callers look the actual [`crate::entry::Entry`] up in
/// [`crate::cache_index::CacheIndex`] by handle when they pop a candidate.
pub struct LruQueues {
    lanes: Vec<Lane>,
    entries_count: AtomicUsize,
    open_fd_count: AtomicUsize,
}

impl LruQueues {
    pub fn new(lane_count: usize) -> Self {
        assert!(lane_count > 0, "lru.lanes must be positive");
        LruQueues {
            lanes: (0..lane_count).map(|_| Lane::new()).collect(),
            entries_count: AtomicUsize::new(0),
            open_fd_count: AtomicUsize::new(0),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Picks a lane from a handle's hash (spec §4.G "lane selection by
    /// handle hash", SPEC_FULL.md §D).
    pub fn lane_for_hash(&self, hash: u64) -> usize {
        (hash % self.lanes.len() as u64) as usize
    }

    pub fn entries_count(&self) -> usize {
        self.entries_count.load(Ordering::Relaxed)
    }

    pub fn open_fd_count(&self) -> usize {
        self.open_fd_count.load(Ordering::Relaxed)
    }

    pub fn note_fd_opened(&self) {
        self.open_fd_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_fd_closed(&self) {
        self.open_fd_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Inserts a freshly-created entry's handle at the MRU end of its lane's
    /// `L1` queue.
    pub fn insert_mru(&self, lane: usize, handle: BackingHandle) {
        self.lanes[lane].l1.lock().push_back(handle);
        self.entries_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Moves `handle` to the MRU end of `L1`, promoting it out of `L2` or
    /// the pinned list if it was there (spec §4.G `ref`).
    pub fn touch_mru(&self, membership: &mut LruMembership, handle: &BackingHandle) {
        let lane = &self.lanes[membership.lane];
        match (membership.tier, membership.pinned) {
            (_, true) => {
                remove_first(&mut lane.pinned.lock(), handle);
            }
            (Tier::L1, false) => {
                remove_first(&mut lane.l1.lock(), handle);
            }
            (Tier::L2, false) => {
                remove_first(&mut lane.l2.lock(), handle);
            }
        }
        membership.tier = Tier::L1;
        membership.pinned = false;
        lane.l1.lock().push_back(handle.clone());
    }

    /// Marks `handle` pinned (holds state) and moves it to the uncollectable
    /// list (spec §4.G "pinned iff holding state").
    pub fn pin(&self, membership: &mut LruMembership, handle: &BackingHandle) {
        if membership.pinned {
            return;
        }
        let lane = &self.lanes[membership.lane];
        match membership.tier {
            Tier::L1 => {
                remove_first(&mut lane.l1.lock(), handle);
            }
            Tier::L2 => {
                remove_first(&mut lane.l2.lock(), handle);
            }
        }
        membership.pinned = true;
        lane.pinned.lock().push_back(handle.clone());
    }

    /// Clears the pin, demoting `handle` back into `L1` at the MRU end.
    pub fn unpin(&self, membership: &mut LruMembership, handle: &BackingHandle) {
        if !membership.pinned {
            return;
        }
        let lane = &self.lanes[membership.lane];
        remove_first(&mut lane.pinned.lock(), handle);
        membership.pinned = false;
        membership.tier = Tier::L1;
        lane.l1.lock().push_back(handle.clone());
    }

    /// Demotes every handle currently at the LRU end of `L1` that has not
    /// been touched since the last sweep into `L2`. Examines at most
    /// `budget` handles. Returns the number actually demoted.
    pub fn age_one_lane(&self, lane_idx: usize, budget: usize) -> usize {
        let lane = &self.lanes[lane_idx];
        let mut l1 = lane.l1.lock();
        let mut l2 = lane.l2.lock();
        let mut moved = 0;
        for _ in 0..budget {
            match l1.pop_front() {
                Some(h) => {
                    l2.push_back(h);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    /// Pops the least-recently-used unpinned candidate from a lane, checking
    /// `L2` first (spec §4.G "L2 reclaimed before L1").
    pub fn pop_eviction_candidate(&self, lane_idx: usize) -> Option<BackingHandle> {
        let lane = &self.lanes[lane_idx];
        if let Some(h) = lane.l2.lock().pop_front() {
            return Some(h);
        }
        lane.l1.lock().pop_front()
    }

    /// Re-queues a candidate that turned out not to be evictable (still
    /// referenced) at the MRU end of `L1`.
    pub fn requeue_after_failed_eviction(&self, lane_idx: usize, handle: BackingHandle) {
        self.lanes[lane_idx].l1.lock().push_back(handle);
    }

    /// Removes `handle` entirely (used when an entry is killed).
    pub fn forget(&self, membership: &LruMembership, handle: &BackingHandle) {
        let lane = &self.lanes[membership.lane];
        let removed = if membership.pinned {
            remove_first(&mut lane.pinned.lock(), handle)
        } else {
            match membership.tier {
                Tier::L1 => remove_first(&mut lane.l1.lock(), handle),
                Tier::L2 => remove_first(&mut lane.l2.lock(), handle),
            }
        };
        if removed {
            self.entries_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Outcome of one reclaim attempt, reported by the `evict` callback the
/// reclaimer thread is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The entry was unreachable and has been killed.
    Evicted,
    /// The entry is still referenced or pinned; requeue it.
    StillInUse,
}

/// Background thread that ages `L1` into `L2` and reclaims from the LRU end
/// of each lane while the cache is over its high watermark (spec §5, §9
/// "reclaimer thread").
pub struct Reclaimer {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawns the reclaimer thread. `evict` is invoked with each candidate
    /// handle in turn and must not block on anything the reclaimer itself
    /// holds.
    pub fn spawn<F>(queues: Arc<LruQueues>, config: LruConfig, evict: F) -> Self
    where
        F: Fn(&BackingHandle) -> EvictOutcome + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("lru-reclaimer".into())
            .spawn(move || {
                while !shutdown_for_thread.load(Ordering::Relaxed) {
                    if queues.entries_count() > config.entries_hiwat {
                        for lane in 0..queues.lane_count() {
                            let mut examined = 0;
                            while examined < config.work_per_wake && queues.entries_count() > config.entries_lowat {
                                let Some(handle) = queues.pop_eviction_candidate(lane) else { break };
                                match evict(&handle) {
                                    EvictOutcome::Evicted => {}
                                    EvictOutcome::StillInUse => queues.requeue_after_failed_eviction(lane, handle),
                                }
                                examined += 1;
                            }
                        }
                    } else {
                        for lane in 0..queues.lane_count() {
                            queues.age_one_lane(lane, config.work_per_wake);
                        }
                    }
                    std::thread::sleep(Duration::from_millis(200));
                }
            })
            .expect("failed to spawn lru-reclaimer thread");
        Reclaimer { shutdown, join: Some(join) }
    }

    /// Signals the reclaimer to stop and waits for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
