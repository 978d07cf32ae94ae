//! Cache entry (spec §3, §4.E) — the in-memory record tracked for every live
//! object reachable through the core.
//!
//! Field layout is grounded on `src/vfs.rs`'s `FileAttr`/`src/vfs/file.rs`'s
//! `Attr` (mode/owner/size/times/nlink/device/fileid); the three-lock,
//! LRU-membership, refcount, and weak-reference-slot shape is spec §3's data
//! model directly. Lock order is fixed crate-wide: `attr -> content -> state`
//! (spec invariant 7); nothing in this module ever acquires `state` before
//! `content`, or `content` before `attr`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backing::{self, Backing, BackingHandle};
use crate::error::{Error, Result};
use crate::lru::LruMembership;
use crate::weakref::WeakRef;

/// Object kind (spec §3). `Unassigned`/`Recycled` are the states an
/// LRU-reused slot passes through between reclaim and reuse; no live entry
/// observed through the public API is ever in those two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Regular,
    Directory,
    Symlink,
    Block,
    Character,
    Socket,
    Fifo,
    Junction,
    Unassigned,
    Recycled,
}

impl From<backing::Kind> for Kind {
    fn from(k: backing::Kind) -> Self {
        match k {
            backing::Kind::Regular => Kind::Regular,
            backing::Kind::Directory => Kind::Directory,
            backing::Kind::Symlink => Kind::Symlink,
            backing::Kind::Block => Kind::Block,
            backing::Kind::Character => Kind::Character,
            backing::Kind::Socket => Kind::Socket,
            backing::Kind::Fifo => Kind::Fifo,
        }
    }
}

/// Attributes block (spec §3). `attrs_trusted`/`content_trusted` gate whether
/// a read may be answered from cache (spec invariants 5, 6).
#[derive(Debug, Clone)]
pub struct Attributes {
    pub kind: Kind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub device: Option<backing::Device>,
    pub fileid: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub change_id: u64,
    /// Optional access control list; when present and
    /// `permission.use_ace_when_present` is set, the permission engine
    /// evaluates this instead of `mode` (spec §4.I).
    pub acl: Option<Vec<Ace>>,
    pub attrs_trusted: bool,
    pub content_trusted: bool,
}

/// One access control entry (allow/deny a principal a mask of rights).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ace {
    pub allow: bool,
    pub who: AceWho,
    pub mask: u32,
}

/// The principal an [`Ace`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceWho {
    Owner,
    Group,
    Everyone,
    Uid(u32),
    Gid(u32),
}

impl Attributes {
    pub fn from_backing(a: &backing::Attrs) -> Self {
        Attributes {
            kind: a.kind.into(),
            mode: a.mode,
            uid: a.uid,
            gid: a.gid,
            size: a.size,
            nlink: a.nlink,
            device: a.device,
            fileid: a.fileid,
            atime: a.atime,
            mtime: a.mtime,
            ctime: a.ctime,
            change_id: a.change_id,
            acl: None,
            attrs_trusted: true,
            content_trusted: false,
        }
    }
}

/// A cached open descriptor on a regular file (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    Closed,
    Open(backing::OpenFlags),
}

/// Content view, keyed by [`Kind`] (spec §3 "Content view (variant by kind)").
#[derive(Debug)]
pub enum Content {
    Regular {
        fd: Option<backing::Fd>,
        open_flags: OpenState,
        /// True while any open/lock/delegation state pins this entry for an
        /// fd the reclaimer must not close out from under it.
        pinned_for_state: bool,
    },
    Directory {
        populated: bool,
        names: BTreeMap<Vec<u8>, Weak<Entry>>,
        active_child_count: usize,
        cookie_verifier: [u8; 8],
    },
    Symlink {
        target: Vec<u8>,
        valid: bool,
    },
    Other,
}

impl Content {
    pub fn new_for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Regular => Content::Regular { fd: None, open_flags: OpenState::Closed, pinned_for_state: false },
            Kind::Directory => Content::Directory {
                populated: false,
                names: BTreeMap::new(),
                active_child_count: 0,
                cookie_verifier: [0u8; 8],
            },
            Kind::Symlink => Content::Symlink { target: Vec::new(), valid: false },
            _ => Content::Other,
        }
    }
}

/// One live object tracked by the cache (spec §3 "Cache entry").
pub struct Entry {
    /// Identity: the backing handle bytes this entry was created for.
    pub handle: BackingHandle,

    pub attr_lock: RwLock<Attributes>,
    pub content_lock: RwLock<Content>,
    /// List of open/lock/delegation state owned by this entry
    /// ([`crate::state::StateEntry`]); a regular-file entry holds state iff
    /// this is non-empty (spec §3 "State set").
    pub state_lock: RwLock<Vec<Arc<crate::state::StateEntry>>>,

    /// LRU membership: lane, tier, pinned flag, intrusive queue position
    /// (spec §4.G). Its own mutex, separate from the three RW locks above.
    pub lru: Mutex<LruMembership>,

    refcount: AtomicUsize,

    /// The `(ptr, generation)` this entry was published under in the global
    /// weak-reference table; filled in once, immediately after the entry is
    /// wrapped in its owning `Arc` (see `CacheIndex::get_or_insert`).
    weak_ref: OnceLock<WeakRef>,
}

impl Entry {
    /// Builds a fresh entry with a sentinel refcount of 1 (spec invariant 1).
    /// The caller is responsible for publishing it in the weak-reference
    /// table via [`Entry::publish_weak_ref`] right after `Arc`-wrapping it.
    pub fn new(handle: BackingHandle, attrs: &backing::Attrs, lru: LruMembership) -> Self {
        let kind = Kind::from(attrs.kind);
        Entry {
            handle,
            attr_lock: RwLock::new(Attributes::from_backing(attrs)),
            content_lock: RwLock::new(Content::new_for_kind(kind)),
            state_lock: RwLock::new(Vec::new()),
            lru: Mutex::new(lru),
            refcount: AtomicUsize::new(1),
            weak_ref: OnceLock::new(),
        }
    }

    /// Publishes `weak_ref` once. Panics if called twice for the same entry.
    pub fn publish_weak_ref(&self, weak_ref: WeakRef) {
        self.weak_ref.set(weak_ref).expect("weak_ref published twice");
    }

    /// The `(ptr, generation)` pair other subsystems should store instead of
    /// a strong reference.
    pub fn weak_ref(&self) -> WeakRef {
        *self.weak_ref.get().expect("weak_ref read before publish")
    }

    /// Current strong-reference count (sentinel + external callers).
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Adds a logical reference (spec §4.G `ref`), failing rather than
    /// resurrecting the entry if it is already dead (refcount at zero).
    pub(crate) fn try_ref(&self) -> bool {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| if n == 0 { None } else { Some(n + 1) })
            .is_ok()
    }

    /// Adds a reference known to be uncontested — the entry was just
    /// constructed, or is being handed out while the caller still holds the
    /// index shard lock that guarantees it cannot have been killed yet.
    pub(crate) fn ref_unconditionally(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases a logical reference (spec §4.G `unref`). Reaching the
    /// sentinel value does not reclaim the entry by itself — that is the
    /// reclaimer's job, via [`crate::cache_index::CacheIndex::try_reclaim`],
    /// once it pops the entry off the LRU as a cold candidate.
    pub(crate) fn unref(&self) {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unref underflow: entry was already at refcount 0");
    }

    /// True iff the entry's state list is non-empty (spec §3 "pinned iff it
    /// holds state").
    pub fn holds_state(&self) -> bool {
        !self.state_lock.read().is_empty()
    }
}

/// RAII guard returned by [`lock_trust_attrs`], holding either a read or
/// write lock on the entry's attributes, refreshed from the backing layer if
/// they were not already trusted.
pub enum AttrGuard<'a> {
    Read(RwLockReadGuard<'a, Attributes>),
    Write(RwLockWriteGuard<'a, Attributes>),
}

impl<'a> std::ops::Deref for AttrGuard<'a> {
    type Target = Attributes;
    fn deref(&self) -> &Attributes {
        match self {
            AttrGuard::Read(g) => g,
            AttrGuard::Write(g) => g,
        }
    }
}

/// Acquires `entry`'s attribute lock and, if attributes are not trusted,
/// refreshes them from `backing` (spec §4.E).
///
/// If `need_write` is false but the attributes are untrusted, this
/// transparently takes the write lock to perform the refresh and then
/// returns the write guard (the caller asked for read access but a refresh
/// always requires mutating the cached copy).
pub fn lock_trust_attrs<'a>(entry: &'a Entry, backing: &dyn Backing, need_write: bool) -> Result<AttrGuard<'a>> {
    if !need_write {
        let guard = entry.attr_lock.read();
        if guard.attrs_trusted {
            return Ok(AttrGuard::Read(guard));
        }
        drop(guard);
    }

    let mut guard = entry.attr_lock.write();
    if !guard.attrs_trusted {
        let fresh = backing.getattr(&entry.handle).map_err(translate_backing_error)?;
        *guard = Attributes::from_backing(&fresh);
        guard.content_trusted = false;
    }
    Ok(AttrGuard::Write(guard))
}

/// Updates `ctime`/`mtime`/`change_id` in `guard` after a successful
/// modifying backing call and marks attributes trusted again (spec §4.E).
pub fn fixup_after_write(guard: &mut Attributes, fresh: &backing::Attrs) {
    guard.mtime = fresh.mtime;
    guard.ctime = fresh.ctime;
    guard.change_id = fresh.change_id;
    guard.size = fresh.size;
    guard.nlink = fresh.nlink;
    guard.attrs_trusted = true;
}

/// Translates a [`backing::Error`] into the core's abstract alphabet (spec
/// §7 propagation policy). Callers that need `STALE -> kill` handling do that
/// themselves at the call site, since only they hold the entry/parent to
/// kill.
pub fn translate_backing_error(e: backing::Error) -> Error {
    match e {
        backing::Error::NoEnt => Error::NoSuchEntry,
        backing::Error::Exist => Error::Exists,
        backing::Error::NotDir => Error::NotADirectory,
        backing::Error::IsDir => Error::IsADirectory,
        backing::Error::Access => Error::AccessDenied,
        backing::Error::Perm => Error::PermissionDenied,
        backing::Error::XDev => Error::CrossDevice,
        backing::Error::Inval => Error::InvalidArgument,
        backing::Error::FBig => Error::ResourceExhausted,
        backing::Error::NoSpc => Error::ResourceExhausted,
        backing::Error::DQuot => Error::ResourceExhausted,
        backing::Error::RoFs => Error::ReadOnly,
        backing::Error::NameTooLong => Error::InvalidArgument,
        backing::Error::Stale => Error::StaleHandle,
        backing::Error::NotEmpty => Error::DirNotEmpty,
        backing::Error::Io => Error::IoError,
        backing::Error::NotSupp => Error::NotSupported,
        backing::Error::Timeout => Error::Timeout,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn sample_attrs(kind: backing::Kind) -> backing::Attrs {
        backing::Attrs {
            kind,
            mode: 0o755,
            uid: 0,
            gid: 0,
            size: 0,
            nlink: 1,
            device: None,
            fileid: 1,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            change_id: 1,
        }
    }
}
