//! Weak-reference table (spec §4.B).
//!
//! Dirents ([`crate::dirent`]) and state entries ([`crate::state`]) refer to
//! cache entries by `(ptr, generation)` pair instead of holding a strong
//! reference, so that killing an entry and reclaiming its memory safely
//! invalidates every reference to it without having to traverse them (spec §9
//! "Forcible invalidation vs. live references").
//!
//! Grounded on `examples/original_source/src/support/generic_weakref.c`'s
//! sharded, address-keyed table with one global monotonic generation
//! counter — adapted here from raw pointers + per-shard AVL tree to
//! `std::sync::{Arc, Weak}` plus a `dashmap`-sharded index, so the
//! "does this resolve to the object that was originally there, or to
//! nothing" guarantee (spec invariant 4) is upheld by the type system rather
//! than by manual bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

/// A stable `(ptr, generation)` reference to a live object.
///
/// `ptr` is the heap address `T` lived at when [`WeakRefTable::insert`] was
/// called. Rust's allocator can and does reuse freed addresses, which is
/// exactly the case `generation` guards against (spec invariant 4: a weakref
/// never resolves to a different entry than the one it was issued for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakRef {
    pub ptr: usize,
    pub gen: u64,
}

struct Slot<T> {
    gen: u64,
    weak: Weak<T>,
}

/// Sharded `(ptr, generation) -> live T` table.
pub struct WeakRefTable<T> {
    genctr: AtomicU64,
    table: DashMap<usize, Slot<T>>,
}

impl<T> Default for WeakRefTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WeakRefTable<T> {
    pub fn new() -> Self {
        WeakRefTable { genctr: AtomicU64::new(0), table: DashMap::new() }
    }

    /// Publishes `obj` in the table, returning the fresh `(ptr, generation)`
    /// pair that resolves to it until it is deleted or its last strong
    /// reference drops.
    ///
    /// Panics if `obj`'s address is already registered and not yet deleted —
    /// that would indicate the caller inserted the same live object twice,
    /// which should never happen (each entry is inserted exactly once, at
    /// creation).
    pub fn insert(&self, obj: &Arc<T>) -> WeakRef {
        let ptr = Arc::as_ptr(obj) as usize;
        let gen = self.genctr.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Slot { gen, weak: Arc::downgrade(obj) };
        let prev = self.table.insert(ptr, slot);
        assert!(prev.is_none(), "weakref table: address reused while still registered");
        WeakRef { ptr, gen }
    }

    /// Resolves `reference` to a live strong reference, or `None` if the
    /// generation does not match or the object has already been dropped.
    ///
    /// This performs both "resolve" and "promote to strong" in one atomic
    /// step via `Weak::upgrade` (see DESIGN.md Open Question #1): unlike the
    /// original's two-phase raw-pointer dance, there is no safe way (or need)
    /// to peek at liveness without claiming a strong count in the same
    /// instant.
    pub fn resolve(&self, reference: WeakRef) -> Option<Arc<T>> {
        let slot = self.table.get(&reference.ptr)?;
        if slot.gen != reference.gen {
            return None;
        }
        slot.weak.upgrade()
    }

    /// Removes `reference` from the table. A no-op if the generation does
    /// not match (already superseded) or the key is absent.
    pub fn delete(&self, reference: WeakRef) {
        if let Some(entry) = self.table.get(&reference.ptr) {
            if entry.gen != reference.gen {
                return;
            }
        } else {
            return;
        }
        self.table.remove_if(&reference.ptr, |_, slot| slot.gen == reference.gen);
    }

    /// Number of still-registered references (live or not-yet-upgraded-to-dead).
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
