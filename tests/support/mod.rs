//! Minimal in-memory [`Backing`] double for integration tests: a throwaway
//! node store standing in for a real filesystem, independent of the
//! library's own unit-test double since `cfg(test)` items in the library
//! crate are not visible from a separate integration-test binary.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use nfs_inode_cache::backing::{
    Attrs, Backing, BackingHandle, Device, Error, Fd, Kind, NewFileSpec, OpenFlags, RawDirEntry, RawReadDir, Result,
    SetAttrs,
};

#[derive(Clone)]
struct Node {
    attrs: Attrs,
    children: BTreeMap<Vec<u8>, BackingHandle>,
    symlink_target: Vec<u8>,
    data: Vec<u8>,
}

pub struct TestBacking {
    next_id: AtomicU64,
    nodes: Mutex<HashMap<BackingHandle, Node>>,
    next_fd: AtomicU64,
    open_fds: Mutex<HashMap<Fd, BackingHandle>>,
}

fn handle_for(id: u64) -> BackingHandle {
    BackingHandle(id.to_le_bytes().to_vec())
}

fn base_attrs(kind: Kind, fileid: u64) -> Attrs {
    Attrs {
        kind,
        mode: 0o755,
        uid: 0,
        gid: 0,
        size: 0,
        nlink: 1,
        device: None,
        fileid,
        atime: SystemTime::UNIX_EPOCH,
        mtime: SystemTime::UNIX_EPOCH,
        ctime: SystemTime::UNIX_EPOCH,
        change_id: 1,
    }
}

impl TestBacking {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(handle_for(0), Node { attrs: base_attrs(Kind::Directory, 0), children: Default::default(), symlink_target: Vec::new(), data: Vec::new() });
        TestBacking { next_id: AtomicU64::new(1), nodes: Mutex::new(nodes), next_fd: AtomicU64::new(1), open_fds: Mutex::new(HashMap::new()) }
    }

    pub fn root(&self) -> BackingHandle {
        handle_for(0)
    }

    fn make_node(&self, parent: &BackingHandle, name: &[u8], kind: Kind, device: Option<Device>, spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(parent) {
            return Err(Error::Stale);
        }
        if nodes.get(parent).unwrap().children.contains_key(name) {
            return Err(Error::Exist);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = handle_for(id);
        let mut attrs = base_attrs(kind, id);
        attrs.mode = spec.mode;
        attrs.uid = spec.uid;
        attrs.gid = spec.gid;
        attrs.device = device;
        nodes.insert(handle.clone(), Node { attrs: attrs.clone(), children: Default::default(), symlink_target: Vec::new(), data: Vec::new() });
        nodes.get_mut(parent).unwrap().children.insert(name.to_vec(), handle.clone());
        Ok((handle, attrs))
    }
}

impl Default for TestBacking {
    fn default() -> Self {
        Self::new()
    }
}

impl Backing for TestBacking {
    fn lookup(&self, parent: &BackingHandle, name: &[u8]) -> Result<(BackingHandle, Attrs)> {
        let nodes = self.nodes.lock().unwrap();
        let parent_node = nodes.get(parent).ok_or(Error::Stale)?;
        let child = parent_node.children.get(name).ok_or(Error::NoEnt)?.clone();
        let attrs = nodes.get(&child).ok_or(Error::NoEnt)?.attrs.clone();
        Ok((child, attrs))
    }

    fn getattr(&self, handle: &BackingHandle) -> Result<Attrs> {
        self.nodes.lock().unwrap().get(handle).map(|n| n.attrs.clone()).ok_or(Error::Stale)
    }

    fn setattr(&self, handle: &BackingHandle, changes: &SetAttrs) -> Result<Attrs> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(handle).ok_or(Error::Stale)?;
        if let Some(mode) = changes.mode {
            node.attrs.mode = mode;
        }
        if let Some(uid) = changes.uid {
            node.attrs.uid = uid;
        }
        if let Some(gid) = changes.gid {
            node.attrs.gid = gid;
        }
        if let Some(size) = changes.size {
            node.attrs.size = size;
            node.data.resize(size as usize, 0);
        }
        node.attrs.change_id += 1;
        Ok(node.attrs.clone())
    }

    fn truncate(&self, handle: &BackingHandle, size: u64) -> Result<Attrs> {
        self.setattr(handle, &SetAttrs { size: Some(size), ..Default::default() })
    }

    fn create_regular(&self, parent: &BackingHandle, name: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        self.make_node(parent, name, Kind::Regular, None, spec)
    }

    fn mkdir(&self, parent: &BackingHandle, name: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        self.make_node(parent, name, Kind::Directory, None, spec)
    }

    fn symlink(&self, parent: &BackingHandle, name: &[u8], target: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        let (handle, attrs) = self.make_node(parent, name, Kind::Symlink, None, spec)?;
        self.nodes.lock().unwrap().get_mut(&handle).unwrap().symlink_target = target.to_vec();
        Ok((handle, attrs))
    }

    fn mknode(&self, parent: &BackingHandle, name: &[u8], kind: Kind, device: Option<Device>, spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        self.make_node(parent, name, kind, device, spec)
    }

    fn readlink(&self, handle: &BackingHandle) -> Result<Vec<u8>> {
        Ok(self.nodes.lock().unwrap().get(handle).ok_or(Error::Stale)?.symlink_target.clone())
    }

    fn open(&self, handle: &BackingHandle, _flags: OpenFlags) -> Result<Fd> {
        if !self.nodes.lock().unwrap().contains_key(handle) {
            return Err(Error::Stale);
        }
        let fd = Fd(self.next_fd.fetch_add(1, Ordering::Relaxed));
        self.open_fds.lock().unwrap().insert(fd, handle.clone());
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> Result<()> {
        self.open_fds.lock().unwrap().remove(&fd);
        Ok(())
    }

    fn read(&self, fd: Fd, offset: u64, len: u32) -> Result<Vec<u8>> {
        let open_fds = self.open_fds.lock().unwrap();
        let handle = open_fds.get(&fd).ok_or(Error::Inval)?;
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(handle).ok_or(Error::Stale)?;
        let start = (offset as usize).min(node.data.len());
        let end = (start + len as usize).min(node.data.len());
        Ok(node.data[start..end].to_vec())
    }

    fn write(&self, fd: Fd, offset: u64, data: &[u8]) -> Result<u32> {
        let open_fds = self.open_fds.lock().unwrap();
        let handle = open_fds.get(&fd).ok_or(Error::Inval)?;
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(handle).ok_or(Error::Stale)?;
        let end = offset as usize + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[offset as usize..end].copy_from_slice(data);
        node.attrs.size = node.data.len() as u64;
        node.attrs.change_id += 1;
        Ok(data.len() as u32)
    }

    fn unlink(&self, parent: &BackingHandle, name: &[u8]) -> Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let child = nodes.get_mut(parent).ok_or(Error::Stale)?.children.remove(name).ok_or(Error::NoEnt)?;
        nodes.remove(&child);
        Ok(())
    }

    fn rmdir(&self, parent: &BackingHandle, name: &[u8]) -> Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let child = nodes.get(parent).ok_or(Error::Stale)?.children.get(name).cloned().ok_or(Error::NoEnt)?;
        if !nodes.get(&child).unwrap().children.is_empty() {
            return Err(Error::NotEmpty);
        }
        nodes.get_mut(parent).unwrap().children.remove(name);
        nodes.remove(&child);
        Ok(())
    }

    fn link(&self, source: &BackingHandle, new_parent: &BackingHandle, name: &[u8]) -> Result<Attrs> {
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(source) {
            return Err(Error::Stale);
        }
        nodes.get_mut(new_parent).ok_or(Error::Stale)?.children.insert(name.to_vec(), source.clone());
        let node = nodes.get_mut(source).unwrap();
        node.attrs.nlink += 1;
        Ok(node.attrs.clone())
    }

    fn rename(&self, from_parent: &BackingHandle, from_name: &[u8], to_parent: &BackingHandle, to_name: &[u8]) -> Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let child = nodes.get_mut(from_parent).ok_or(Error::Stale)?.children.remove(from_name).ok_or(Error::NoEnt)?;
        nodes.get_mut(to_parent).ok_or(Error::Stale)?.children.insert(to_name.to_vec(), child);
        Ok(())
    }

    fn readdir(&self, handle: &BackingHandle, cookie: u64) -> Result<RawReadDir> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(handle).ok_or(Error::Stale)?;
        let entries = node
            .children
            .iter()
            .skip(cookie as usize)
            .map(|(name, h)| RawDirEntry { name: name.clone(), handle: h.clone(), fileid: nodes.get(h).unwrap().attrs.fileid })
            .collect();
        Ok(RawReadDir { entries, end: true })
    }

    fn expand_handle(&self, raw: &[u8]) -> Result<BackingHandle> {
        Ok(BackingHandle(raw.to_vec()))
    }

    fn cleanup(&self, _handle: &BackingHandle) {}

    fn statfs(&self, _handle: &BackingHandle) -> Result<nfs_inode_cache::backing::FsStat> {
        Ok(Default::default())
    }
}
