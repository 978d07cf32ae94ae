//! Open-FD cache (spec §4.H): one cached descriptor per regular-file entry,
//! widened on demand, closed by the reclaimer when the process-wide count
//! runs high.
//!
//! Grounded on `examples/original_source/src/Cache_inode/cache_inode_lru.c`'s
//! global `open_fd_count` gate (mirrored here by
//! [`crate::lru::LruQueues::open_fd_count`]) and on the fd-widening policy
//! implied by spec §4.H ("a read-mode fd satisfies a read need; a
//! read/write need on a read-only fd forces a close-then-reopen").

use crate::backing::{Backing, Fd, OpenFlags};
use crate::entry::{translate_backing_error, Content, Entry, OpenState};
use crate::error::{Error, Result};
use crate::lru::LruQueues;

/// Returns a descriptor on `entry` satisfying `needed`, opening or widening
/// the cached one as required (spec §4.H).
pub fn ensure_open(entry: &Entry, backing: &dyn Backing, needed: OpenFlags, lru: &LruQueues) -> Result<Fd> {
    let mut content = entry.content_lock.write();
    let Content::Regular { fd, open_flags, .. } = &mut *content else { return Err(Error::BadType) };

    if let (Some(existing), OpenState::Open(mode)) = (*fd, *open_flags) {
        if mode.satisfies(needed) {
            return Ok(existing);
        }
        backing.close(existing).map_err(translate_backing_error)?;
        lru.note_fd_closed();
        let widened = mode.widen(needed);
        let reopened = backing.open(&entry.handle, widened).map_err(translate_backing_error)?;
        lru.note_fd_opened();
        *fd = Some(reopened);
        *open_flags = OpenState::Open(widened);
        return Ok(reopened);
    }

    let opened = backing.open(&entry.handle, needed).map_err(translate_backing_error)?;
    lru.note_fd_opened();
    *fd = Some(opened);
    *open_flags = OpenState::Open(needed);
    Ok(opened)
}

/// Closes `entry`'s cached descriptor, unless it is pinned for open/lock
/// state. Used by the reclaimer when `lru.fd_hiwat` is exceeded (spec §4.H,
/// §9).
pub fn close_cached(entry: &Entry, backing: &dyn Backing, lru: &LruQueues) -> Result<()> {
    let mut content = entry.content_lock.write();
    let Content::Regular { fd, open_flags, pinned_for_state } = &mut *content else { return Err(Error::BadType) };
    if *pinned_for_state {
        return Ok(());
    }
    if let Some(existing) = fd.take() {
        backing.close(existing).map_err(translate_backing_error)?;
        lru.note_fd_closed();
    }
    *open_flags = OpenState::Closed;
    Ok(())
}

/// Sets whether `entry`'s cached descriptor is pinned against reclaim
/// because some open/lock state still references it (spec §4.H).
pub fn set_pinned_for_state(entry: &Entry, pinned: bool) -> Result<()> {
    let mut content = entry.content_lock.write();
    match &mut *content {
        Content::Regular { pinned_for_state, .. } => {
            *pinned_for_state = pinned;
            Ok(())
        }
        _ => Err(Error::BadType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::backing::{self, Kind};
    use crate::entry::test_support::sample_attrs;
    use crate::lru::LruMembership;
    use std::sync::Arc;

    fn regular_entry(backing: &InMemoryBacking) -> Arc<Entry> {
        let handle = backing.add_root_child(Kind::Regular, b"f");
        let attrs = sample_attrs(backing::Kind::Regular);
        Arc::new(Entry::new(handle, &attrs, LruMembership::fresh(0)))
    }

    #[test]
    fn opens_on_first_use_and_reuses_for_same_mode() {
        let backing = InMemoryBacking::new();
        let lru = LruQueues::new(1);
        let entry = regular_entry(&backing);
        let fd1 = ensure_open(&entry, &backing, OpenFlags::Read, &lru).unwrap();
        let fd2 = ensure_open(&entry, &backing, OpenFlags::Read, &lru).unwrap();
        assert_eq!(fd1, fd2);
        assert_eq!(lru.open_fd_count(), 1);
    }

    #[test]
    fn widens_read_only_fd_for_write_need() {
        let backing = InMemoryBacking::new();
        let lru = LruQueues::new(1);
        let entry = regular_entry(&backing);
        ensure_open(&entry, &backing, OpenFlags::Read, &lru).unwrap();
        ensure_open(&entry, &backing, OpenFlags::Write, &lru).unwrap();
        match &*entry.content_lock.read() {
            Content::Regular { open_flags, .. } => assert_eq!(*open_flags, OpenState::Open(OpenFlags::ReadWrite)),
            _ => panic!("expected regular content"),
        }
    }

    #[test]
    fn pinned_fd_survives_close_cached() {
        let backing = InMemoryBacking::new();
        let lru = LruQueues::new(1);
        let entry = regular_entry(&backing);
        ensure_open(&entry, &backing, OpenFlags::Read, &lru).unwrap();
        set_pinned_for_state(&entry, true).unwrap();
        close_cached(&entry, &backing, &lru).unwrap();
        assert_eq!(lru.open_fd_count(), 1);
    }
}
