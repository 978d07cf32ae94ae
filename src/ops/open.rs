//! `open` (spec §4.J, §4.H, §4.L): register client open state against a
//! regular-file entry, pinning its LRU membership and fd for as long as the
//! state survives.

use std::sync::Arc;

use crate::backing::OpenFlags;
use crate::context::Context;
use crate::entry::{lock_trust_attrs, Entry, Kind};
use crate::error::{Error, Result};
use crate::fd_cache;
use crate::ops::Cache;
use crate::permission::{self, mask};
use crate::state::{ClientId, Owner, StateEntry, StateKind};

pub fn open(
    cache: &Cache,
    entry: &Arc<Entry>,
    client: ClientId,
    owner: Owner,
    write: bool,
    ctx: &Context,
) -> Result<Arc<StateEntry>> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
        if attrs.kind != Kind::Regular {
            return Err(Error::InvalidArgument);
        }
        let needed = if write { mask::MODIFY } else { mask::READ };
        permission::require(ctx, &attrs, needed, &cache.config.permission)?;
    }

    let flags = if write { OpenFlags::Write } else { OpenFlags::Read };
    fd_cache::ensure_open(entry, &*cache.backing, flags, &cache.lru)?;
    fd_cache::set_pinned_for_state(entry, true)?;
    {
        let mut lru = entry.lru.lock();
        cache.lru.pin(&mut lru, &entry.handle);
    }

    let weak = entry.weak_ref();
    let state = cache.state.grant(client, owner, weak, StateKind::Open { write }).ok_or(Error::StateConflict)?;
    entry.state_lock.write().push(state.clone());
    cache.state.renew_lease(client);
    cache.stats.record_open();
    Ok(state)
}
