//! Directory-entry bookkeeping (spec §4.F): name-ordered child lookup,
//! broken-dirent repair, and cookie verification.
//!
//! A directory [`Entry`]'s `content_lock` holds its name index directly
//! (`Content::Directory { names, .. }`, a `BTreeMap<Vec<u8>, Weak<Entry>>`)
//! rather than a separate owned structure — grounded on
//! `examples/other_examples/12c81d06_vsrinivas-fuchsia__src-proc-bin-starnix-fs-dir_entry.rs.rs`'s
//! `DirEntryState { children: BTreeMap<FsString, Weak<DirEntry>> }` under a
//! `parking_lot::RwLock`, which is exactly the shape spec §3 "Content view"
//! describes for a directory. This module is the set of operations that
//! walk and repair that map; it holds no state of its own.

use std::sync::Arc;

use crate::entry::{Content, Entry};
use crate::error::{Error, Result};

/// Inserts `child` under `name` in `dir`'s name index (spec §4.J `create`,
/// `link`, `rename`). Overwrites whatever weak reference, live or dead, was
/// previously at `name`.
pub fn insert_child(dir: &Entry, name: Vec<u8>, child: &Arc<Entry>) -> Result<()> {
    let mut content = dir.content_lock.write();
    match &mut *content {
        Content::Directory { names, active_child_count, .. } => {
            let replaced = names.insert(name, Arc::downgrade(child));
            if replaced.and_then(|w| w.upgrade()).is_none() {
                *active_child_count += 1;
            }
            Ok(())
        }
        _ => Err(Error::NotADirectory),
    }
}

/// Removes `name` from `dir`'s name index (spec §4.J `remove`, `rename`).
pub fn remove_child(dir: &Entry, name: &[u8]) -> Result<()> {
    let mut content = dir.content_lock.write();
    match &mut *content {
        Content::Directory { names, active_child_count, .. } => {
            if let Some(w) = names.remove(name) {
                if w.upgrade().is_some() {
                    *active_child_count = active_child_count.saturating_sub(1);
                }
            }
            Ok(())
        }
        _ => Err(Error::NotADirectory),
    }
}

/// Resolves `name` to a live child, repairing a "broken dirent" (a name
/// whose weak reference no longer upgrades, because the entry it pointed at
/// was reclaimed) by dropping the stale mapping in the same pass (spec §4.F
/// "broken dirent repair").
///
/// Returns `Ok(None)` on a clean miss (no such name, or a broken one just
/// repaired); the caller falls through to `backing.lookup` either way.
pub fn lookup_child(dir: &Entry, name: &[u8]) -> Result<Option<Arc<Entry>>> {
    let content = dir.content_lock.read();
    let names = match &*content {
        Content::Directory { names, .. } => names,
        _ => return Err(Error::NotADirectory),
    };
    let Some(weak) = names.get(name) else { return Ok(None) };
    if let Some(child) = weak.upgrade() {
        return Ok(Some(child));
    }
    drop(content);
    // Broken dirent: the weak reference is dead. Repair eagerly rather than
    // leaving a dangling name around for the next lookup to trip over.
    let mut content = dir.content_lock.write();
    if let Content::Directory { names, active_child_count, .. } = &mut *content {
        if let Some(w) = names.get(name) {
            if w.upgrade().is_none() {
                names.remove(name);
                *active_child_count = active_child_count.saturating_sub(1);
            }
        }
    }
    Ok(None)
}

/// Marks `dir` as having a complete, trustworthy name index (spec §4.F
/// "populated" bit; set after a full `readdir` sweep populates every name).
pub fn mark_populated(dir: &Entry) -> Result<()> {
    let mut content = dir.content_lock.write();
    match &mut *content {
        Content::Directory { populated, .. } => {
            *populated = true;
            Ok(())
        }
        _ => Err(Error::NotADirectory),
    }
}

pub fn is_populated(dir: &Entry) -> Result<bool> {
    match &*dir.content_lock.read() {
        Content::Directory { populated, .. } => Ok(*populated),
        _ => Err(Error::NotADirectory),
    }
}

/// Bumps the cookie verifier returned to `readdir` callers, invalidating any
/// cookie issued before this mutation (spec §4.J `readdir` "cookie
/// verifier", knob `readdir.use_cookie_verifier`).
pub fn bump_cookie_verifier(dir: &Entry) -> Result<()> {
    let mut content = dir.content_lock.write();
    match &mut *content {
        Content::Directory { cookie_verifier, .. } => {
            let next = u64::from_le_bytes(*cookie_verifier).wrapping_add(1);
            *cookie_verifier = next.to_le_bytes();
            Ok(())
        }
        _ => Err(Error::NotADirectory),
    }
}

pub fn cookie_verifier(dir: &Entry) -> Result<[u8; 8]> {
    match &*dir.content_lock.read() {
        Content::Directory { cookie_verifier, .. } => Ok(*cookie_verifier),
        _ => Err(Error::NotADirectory),
    }
}
