//! Backing adapter interface (spec §4.C) — the capability set this core
//! invokes on the filesystem below it. The adapter itself (e.g. a local
//! filesystem shim, a cluster filesystem client) is an external collaborator;
//! this module only defines the trait and the primitive types that cross the
//! boundary, generalized from the teacher's NFSv3-level `Vfs` trait
//! (`src/vfs.rs`) down to the smaller, protocol-agnostic set spec §4.C lists.

use std::time::SystemTime;

/// Opaque identifier the backing adapter uses for one object. The core never
/// interprets these bytes; it only hashes and compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackingHandle(pub Vec<u8>);

/// Object kind (spec §3 "Kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Regular,
    Directory,
    Symlink,
    Block,
    Character,
    Socket,
    Fifo,
}

/// Major/minor device pair for [`Kind::Block`]/[`Kind::Character`] nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

/// Attributes as reported by the backing adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Attrs {
    pub kind: Kind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub device: Option<Device>,
    pub fileid: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Opaque change id/verifier the backing adapter bumps on every
    /// modification, used by the core for weak cache consistency checks.
    pub change_id: u64,
}

/// Requested attribute modifications (spec §4.I `check_setattr`).
#[derive(Debug, Clone, Default)]
pub struct SetAttrs {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<TimeChange>,
    pub mtime: Option<TimeChange>,
}

/// How a timestamp should be updated (spec §4.I ATIME/MTIME rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeChange {
    /// Set to the server's current time.
    ServerNow,
    /// Set to a client-provided value.
    Explicit { seconds: i64, nanos: u32 },
}

/// A directory entry as returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    pub name: Vec<u8>,
    pub handle: BackingHandle,
    pub fileid: u64,
}

/// One page of `readdir` results.
#[derive(Debug, Clone)]
pub struct RawReadDir {
    pub entries: Vec<RawDirEntry>,
    pub end: bool,
}

/// Filesystem-wide dynamic statistics (`statfs`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStat {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
    pub available_files: u64,
}

/// Descriptor handle returned by [`Backing::open`]. Opaque to the core; only
/// passed back to `read`/`write`/`close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(pub u64);

/// Error alphabet the backing adapter surfaces to the core (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    NoEnt,
    Exist,
    NotDir,
    IsDir,
    Access,
    Perm,
    XDev,
    Inval,
    FBig,
    NoSpc,
    DQuot,
    RoFs,
    NameTooLong,
    /// The handle no longer resolves to anything on the backing layer; the
    /// core must `kill()` the associated entry on receipt of this error.
    Stale,
    NotEmpty,
    Io,
    NotSupp,
    Timeout,
}

/// Result alias for [`Backing`] operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a newly created file should be initialized (mirrors spec §4.J `create`).
#[derive(Debug, Clone)]
pub struct NewFileSpec {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// The capability set the core invokes on the filesystem below it (spec
/// §4.C). Implementations must be thread-safe: the core calls these
/// concurrently from many worker threads with no lock held across the call
/// (spec §5).
pub trait Backing: Send + Sync {
    /// Resolves `name` within `parent`, returning its handle and attributes.
    fn lookup(&self, parent: &BackingHandle, name: &[u8]) -> Result<(BackingHandle, Attrs)>;

    /// Fetches current attributes for `handle`.
    fn getattr(&self, handle: &BackingHandle) -> Result<Attrs>;

    /// Applies attribute changes, returning the attributes afterward.
    fn setattr(&self, handle: &BackingHandle, changes: &SetAttrs) -> Result<Attrs>;

    /// Truncates a regular file to `size` bytes.
    fn truncate(&self, handle: &BackingHandle, size: u64) -> Result<Attrs>;

    /// Creates a regular file under `parent`.
    fn create_regular(
        &self,
        parent: &BackingHandle,
        name: &[u8],
        spec: &NewFileSpec,
    ) -> Result<(BackingHandle, Attrs)>;

    /// Creates a directory under `parent`.
    fn mkdir(&self, parent: &BackingHandle, name: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)>;

    /// Creates a symbolic link under `parent` pointing at `target`.
    fn symlink(
        &self,
        parent: &BackingHandle,
        name: &[u8],
        target: &[u8],
        spec: &NewFileSpec,
    ) -> Result<(BackingHandle, Attrs)>;

    /// Creates a special node (block/char/socket/fifo) under `parent`.
    fn mknode(
        &self,
        parent: &BackingHandle,
        name: &[u8],
        kind: Kind,
        device: Option<Device>,
        spec: &NewFileSpec,
    ) -> Result<(BackingHandle, Attrs)>;

    /// Reads the target path of a symbolic link.
    fn readlink(&self, handle: &BackingHandle) -> Result<Vec<u8>>;

    /// Opens a descriptor with the requested flags (spec §4.H).
    fn open(&self, handle: &BackingHandle, flags: OpenFlags) -> Result<Fd>;

    /// Closes a previously opened descriptor.
    fn close(&self, fd: Fd) -> Result<()>;

    /// Reads up to `len` bytes starting at `offset`.
    fn read(&self, fd: Fd, offset: u64, len: u32) -> Result<Vec<u8>>;

    /// Writes `data` at `offset`, returning the number of bytes written.
    fn write(&self, fd: Fd, offset: u64, data: &[u8]) -> Result<u32>;

    /// Removes a non-directory entry.
    fn unlink(&self, parent: &BackingHandle, name: &[u8]) -> Result<()>;

    /// Removes an empty directory entry.
    fn rmdir(&self, parent: &BackingHandle, name: &[u8]) -> Result<()>;

    /// Creates an additional hard link to `source` named `name` under `new_parent`.
    fn link(&self, source: &BackingHandle, new_parent: &BackingHandle, name: &[u8]) -> Result<Attrs>;

    /// Atomically renames `(from_parent, from_name)` to `(to_parent, to_name)`.
    fn rename(
        &self,
        from_parent: &BackingHandle,
        from_name: &[u8],
        to_parent: &BackingHandle,
        to_name: &[u8],
    ) -> Result<()>;

    /// Lists directory entries starting after `cookie`.
    fn readdir(&self, handle: &BackingHandle, cookie: u64) -> Result<RawReadDir>;

    /// Normalizes/pads a handle received over the wire into the adapter's
    /// canonical in-memory form.
    fn expand_handle(&self, raw: &[u8]) -> Result<BackingHandle>;

    /// Called exactly once, right before the core drops a killed entry, so
    /// the adapter can release any resources it still associates with the
    /// handle (spec §3 "Kill").
    fn cleanup(&self, handle: &BackingHandle);

    /// Filesystem-wide dynamic statistics for the export containing `handle`.
    fn statfs(&self, handle: &BackingHandle) -> Result<FsStat>;
}

/// Requested descriptor mode for [`Backing::open`] / the fd cache (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenFlags {
    Read,
    Write,
    ReadWrite,
}

impl OpenFlags {
    /// True if a descriptor opened with `self` also satisfies a `Read` need.
    pub fn satisfies(self, needed: OpenFlags) -> bool {
        matches!(
            (self, needed),
            (OpenFlags::ReadWrite, _)
                | (OpenFlags::Read, OpenFlags::Read)
                | (OpenFlags::Write, OpenFlags::Write)
        )
    }

    /// The mode that satisfies both `self` and `other`'s needs.
    pub fn widen(self, other: OpenFlags) -> OpenFlags {
        if self == other {
            self
        } else {
            OpenFlags::ReadWrite
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_fd_satisfies_either_need() {
        assert!(OpenFlags::ReadWrite.satisfies(OpenFlags::Read));
        assert!(OpenFlags::ReadWrite.satisfies(OpenFlags::Write));
    }

    #[test]
    fn read_only_fd_does_not_satisfy_write_need() {
        assert!(!OpenFlags::Read.satisfies(OpenFlags::Write));
    }

    #[test]
    fn widen_mixed_modes_to_read_write() {
        assert_eq!(OpenFlags::Read.widen(OpenFlags::Write), OpenFlags::ReadWrite);
        assert_eq!(OpenFlags::Read.widen(OpenFlags::Read), OpenFlags::Read);
    }
}
