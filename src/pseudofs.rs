//! Pseudo-filesystem (spec §4.K): a read-only, lazily-built composite
//! namespace with stable node ids, used to present multiple exports under
//! one synthetic root and to splice an export's real root in at a
//! "junction".
//!
//! Grounded on `examples/original_source/src/Protocols/NFS/nfs4_pseudo.c`'s
//! path-component tree plus `handle::encode_pseudo`'s hash-of-full-path
//! stable-id scheme (spec §4.A/§4.K), here built with `dashmap` for the
//! id-keyed lookup side and `parking_lot::RwLock` per node for its (rarely
//! mutated, since the tree only grows as junctions are mounted) child map.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::backing::BackingHandle;
use crate::cityhash::city_hash64;
use crate::error::{Error, Result};
use crate::handle::{self, Handle};

/// Where a pseudo node's traversal hands off to a real export (spec §4.K
/// "junction").
#[derive(Debug, Clone)]
pub struct Junction {
    pub export_id: u32,
    pub root_handle: BackingHandle,
}

/// One node in the pseudo-filesystem tree.
pub struct PseudoNode {
    pub name: Vec<u8>,
    pub full_path: Vec<u8>,
    pub node_id: u64,
    children: RwLock<BTreeMap<Vec<u8>, Arc<PseudoNode>>>,
    junction: RwLock<Option<Junction>>,
}

impl PseudoNode {
    fn new(name: Vec<u8>, full_path: Vec<u8>) -> Arc<Self> {
        let node_id = city_hash64(&full_path);
        Arc::new(PseudoNode { name, full_path, node_id, children: RwLock::new(BTreeMap::new()), junction: RwLock::new(None) })
    }

    pub fn junction(&self) -> Option<Junction> {
        self.junction.read().clone()
    }

    pub fn handle(&self) -> Handle {
        handle::encode_pseudo(&self.full_path)
    }

    pub fn children(&self) -> Vec<Arc<PseudoNode>> {
        self.children.read().values().cloned().collect()
    }
}

fn join_path(parent: &[u8], name: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(parent.len() + 1 + name.len());
    path.extend_from_slice(parent);
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

/// The pseudo-filesystem itself. One instance server-wide (spec §4.K).
pub struct PseudoFs {
    root: Arc<PseudoNode>,
    by_id: DashMap<u64, Arc<PseudoNode>>,
}

impl PseudoFs {
    pub fn new() -> Self {
        let root = PseudoNode::new(Vec::new(), Vec::new());
        let by_id = DashMap::new();
        by_id.insert(root.node_id, root.clone());
        PseudoFs { root, by_id }
    }

    pub fn root(&self) -> Arc<PseudoNode> {
        self.root.clone()
    }

    pub fn node_by_id(&self, id: u64) -> Option<Arc<PseudoNode>> {
        self.by_id.get(&id).map(|n| n.clone())
    }

    /// Resolves `name` under `parent`, WITHOUT crossing a junction (spec
    /// §4.K "pseudo traversal stops at a junction and hands off").
    pub fn lookup(&self, parent: &PseudoNode, name: &[u8]) -> Option<Arc<PseudoNode>> {
        parent.children.read().get(name).cloned()
    }

    /// Lazily creates every missing path component from `parent` down to
    /// `components`, returning the final (possibly pre-existing) node.
    fn ensure_path(&self, parent: &Arc<PseudoNode>, components: &[&[u8]]) -> Arc<PseudoNode> {
        let mut current = parent.clone();
        for component in components {
            let existing = current.children.read().get(*component).cloned();
            current = match existing {
                Some(node) => node,
                None => {
                    let full_path = join_path(&current.full_path, component);
                    let node = PseudoNode::new(component.to_vec(), full_path);
                    let mut children = current.children.write();
                    let entry = children.entry(component.to_vec()).or_insert_with(|| node.clone());
                    let chosen = entry.clone();
                    self.by_id.insert(chosen.node_id, chosen.clone());
                    drop(children);
                    chosen
                }
            };
        }
        current
    }

    /// Mounts an export's real root at `path` (e.g. `&[b"mnt", b"export1"]`),
    /// creating any missing intermediate directories (spec §4.K).
    pub fn mount_junction(&self, path: &[&[u8]], export_id: u32, root_handle: BackingHandle) -> Arc<PseudoNode> {
        let node = self.ensure_path(&self.root, path);
        *node.junction.write() = Some(Junction { export_id, root_handle });
        node
    }

    /// Resolves a pseudo handle back to its node (spec §4.K, §6: pseudo
    /// handles carry a truncated path prefix alongside the hash; this looks
    /// the node up purely by hash, which is authoritative).
    pub fn resolve_handle(&self, handle: &Handle) -> Result<Arc<PseudoNode>> {
        match handle::decode(handle)? {
            handle::Decoded::Pseudo { hash, .. } => self.node_by_id(hash).ok_or(Error::StaleHandle),
            handle::Decoded::Backing { .. } => Err(Error::InvalidArgument),
        }
    }
}

impl Default for PseudoFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounting_a_junction_creates_intermediate_nodes() {
        let fs = PseudoFs::new();
        let handle = BackingHandle(b"export-root".to_vec());
        fs.mount_junction(&[b"mnt", b"export1"], 7, handle.clone());

        let mnt = fs.lookup(&fs.root(), b"mnt").expect("intermediate node created");
        let export1 = fs.lookup(&mnt, b"export1").expect("leaf node created");
        assert_eq!(export1.junction().unwrap().export_id, 7);
        assert_eq!(export1.junction().unwrap().root_handle, handle);
    }

    #[test]
    fn node_ids_are_stable_across_lookups() {
        let fs = PseudoFs::new();
        fs.mount_junction(&[b"a", b"b"], 1, BackingHandle(b"x".to_vec()));
        let a1 = fs.lookup(&fs.root(), b"a").unwrap();
        let a2 = fs.lookup(&fs.root(), b"a").unwrap();
        assert_eq!(a1.node_id, a2.node_id);
    }

    #[test]
    fn resolve_handle_round_trips_through_node_id() {
        let fs = PseudoFs::new();
        fs.mount_junction(&[b"a"], 1, BackingHandle(b"x".to_vec()));
        let a = fs.lookup(&fs.root(), b"a").unwrap();
        let resolved = fs.resolve_handle(&a.handle()).unwrap();
        assert_eq!(resolved.node_id, a.node_id);
    }

    #[test]
    fn lookup_of_unmounted_name_is_none() {
        let fs = PseudoFs::new();
        assert!(fs.lookup(&fs.root(), b"nope").is_none());
    }
}
