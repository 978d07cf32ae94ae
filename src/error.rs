//! Abstract error kinds produced by the cache/state core.
//!
//! This alphabet is one layer below the wire-level NFS status codes: wire
//! dispatch (out of scope here) maps each variant onto the NFSv3/NFSv4 status
//! that matches the active minor version.

use std::fmt;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Abstract error kinds (spec §7).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Error {
    /// The request could not be interpreted by the core (malformed args).
    MalformedRequest,
    /// No cache entry or backing object exists for the given key/name.
    NoSuchEntry,
    /// The target name already exists.
    Exists,
    /// A directory was required but the object is not one.
    NotADirectory,
    /// A non-directory was required but the object is a directory.
    IsADirectory,
    /// The object's type does not support the requested operation.
    BadType,
    /// The operation is not implemented by this core or backing adapter.
    NotSupported,
    /// The caller lacks the privilege (owner/root) the operation requires.
    PermissionDenied,
    /// The caller lacks the POSIX/ACL access bits the operation requires.
    AccessDenied,
    /// `remove_dir` on a non-empty directory.
    DirNotEmpty,
    /// `rename` across two different backing devices/exports.
    CrossDevice,
    /// A request argument is out of range (e.g. nanoseconds >= 1e9).
    InvalidArgument,
    /// A cache or resource limit prevented the operation from completing.
    ResourceExhausted,
    /// `get_or_insert` raced: the key was inserted concurrently.
    InsertRace,
    /// `ref()` was attempted on an entry whose refcount had already reached zero.
    DeadEntry,
    /// The backing layer reports the handle no longer resolves to anything.
    StaleHandle,
    /// A lock request conflicts with an existing lock.
    LockConflict,
    /// An open/lock/delegation state conflict prevented the operation.
    StateConflict,
    /// The export or backing filesystem is read-only.
    ReadOnly,
    /// The backing adapter reported a hard I/O error.
    IoError,
    /// The backing adapter or a recall did not complete within its deadline.
    Timeout,
    /// An internal invariant was violated; the event is logged and surfaced
    /// so a caller does not silently proceed against inconsistent state.
    Inconsistent,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::MalformedRequest => "malformed request",
            Error::NoSuchEntry => "no such entry",
            Error::Exists => "entry already exists",
            Error::NotADirectory => "not a directory",
            Error::IsADirectory => "is a directory",
            Error::BadType => "unsupported object type",
            Error::NotSupported => "operation not supported",
            Error::PermissionDenied => "permission denied",
            Error::AccessDenied => "access denied",
            Error::DirNotEmpty => "directory not empty",
            Error::CrossDevice => "cross-device link/rename",
            Error::InvalidArgument => "invalid argument",
            Error::ResourceExhausted => "resource exhausted",
            Error::InsertRace => "concurrent insert race",
            Error::DeadEntry => "entry is dead (refcount zero)",
            Error::StaleHandle => "stale handle",
            Error::LockConflict => "lock conflict",
            Error::StateConflict => "open/lock/delegation state conflict",
            Error::ReadOnly => "read-only filesystem",
            Error::IoError => "I/O error",
            Error::Timeout => "operation timed out",
            Error::Inconsistent => "internal inconsistency detected",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_nonempty_for_every_variant() {
        let variants = [
            Error::MalformedRequest,
            Error::NoSuchEntry,
            Error::Exists,
            Error::NotADirectory,
            Error::IsADirectory,
            Error::BadType,
            Error::NotSupported,
            Error::PermissionDenied,
            Error::AccessDenied,
            Error::DirNotEmpty,
            Error::CrossDevice,
            Error::InvalidArgument,
            Error::ResourceExhausted,
            Error::InsertRace,
            Error::DeadEntry,
            Error::StaleHandle,
            Error::LockConflict,
            Error::StateConflict,
            Error::ReadOnly,
            Error::IoError,
            Error::Timeout,
            Error::Inconsistent,
        ];
        for v in variants {
            assert!(!v.to_string().is_empty());
        }
    }
}
