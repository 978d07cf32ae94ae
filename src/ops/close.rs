//! `close` (spec §4.J, §4.L): release a previously granted open state,
//! unpinning the entry once nothing else holds state against it.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::Result;
use crate::fd_cache;
use crate::ops::Cache;
use crate::state::{ClientId, StateEntry};

pub fn close(cache: &Cache, entry: &Arc<Entry>, client: ClientId, state: &Arc<StateEntry>) -> Result<()> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    cache.state.revoke(client, state.id);
    entry.state_lock.write().retain(|s| s.id != state.id);

    if !entry.holds_state() {
        fd_cache::set_pinned_for_state(entry, false)?;
        let mut lru = entry.lru.lock();
        cache.lru.unpin(&mut lru, &entry.handle);
    }
    cache.stats.record_close();
    Ok(())
}
