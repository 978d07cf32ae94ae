//! Backing adapter over a real directory, for the `mirrorcache` demo binary.
//! Paths relative to the mirrored root are used directly as handle bytes;
//! `fileid` is the inode number `stat(2)` reports.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nfs_inode_cache::backing::{
    Attrs, Backing, BackingHandle, Device, Error, Fd, FsStat, Kind, NewFileSpec, OpenFlags, RawDirEntry, RawReadDir,
    Result, SetAttrs,
};

pub struct LocalDirBacking {
    root: PathBuf,
    next_fd: AtomicU64,
    open_files: Mutex<HashMap<Fd, File>>,
}

fn to_abs(root: &Path, handle: &BackingHandle) -> PathBuf {
    if handle.0.is_empty() {
        root.to_path_buf()
    } else {
        root.join(String::from_utf8_lossy(&handle.0).as_ref())
    }
}

fn to_handle(rel: &Path) -> BackingHandle {
    BackingHandle(rel.to_string_lossy().into_owned().into_bytes())
}

fn map_io_err(e: &io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::NoEnt,
        io::ErrorKind::AlreadyExists => Error::Exist,
        io::ErrorKind::PermissionDenied => Error::Access,
        _ => match e.raw_os_error() {
            Some(39) => Error::NotEmpty, // ENOTEMPTY
            Some(18) => Error::XDev,     // EXDEV
            Some(21) => Error::IsDir,    // EISDIR
            Some(20) => Error::NotDir,   // ENOTDIR
            _ => Error::Io,
        },
    }
}

fn to_systemtime(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::new((-secs) as u64, nanos)
    }
}

impl LocalDirBacking {
    pub fn new(root: &Path) -> io::Result<Self> {
        let root = fs::canonicalize(root)?;
        Ok(LocalDirBacking { root, next_fd: AtomicU64::new(1), open_files: Mutex::new(HashMap::new()) })
    }

    pub fn root_handle(&self) -> BackingHandle {
        BackingHandle(Vec::new())
    }

    fn stat(&self, path: &Path) -> Result<Attrs> {
        let meta = fs::symlink_metadata(path).map_err(|e| map_io_err(&e))?;
        let kind = if meta.is_dir() {
            Kind::Directory
        } else if meta.file_type().is_symlink() {
            Kind::Symlink
        } else {
            Kind::Regular
        };
        Ok(Attrs {
            kind,
            mode: meta.permissions().mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            nlink: meta.nlink() as u32,
            device: None,
            fileid: meta.ino(),
            atime: to_systemtime(meta.atime(), meta.atime_nsec() as u32),
            mtime: to_systemtime(meta.mtime(), meta.mtime_nsec() as u32),
            ctime: to_systemtime(meta.ctime(), meta.ctime_nsec() as u32),
            change_id: meta.mtime() as u64,
        })
    }
}

impl Backing for LocalDirBacking {
    fn lookup(&self, parent: &BackingHandle, name: &[u8]) -> Result<(BackingHandle, Attrs)> {
        let parent_path = to_abs(&self.root, parent);
        let child_path = parent_path.join(String::from_utf8_lossy(name).as_ref());
        let attrs = self.stat(&child_path)?;
        let rel = child_path.strip_prefix(&self.root).map_err(|_| Error::Inval)?;
        Ok((to_handle(rel), attrs))
    }

    fn getattr(&self, handle: &BackingHandle) -> Result<Attrs> {
        self.stat(&to_abs(&self.root, handle))
    }

    fn setattr(&self, handle: &BackingHandle, changes: &SetAttrs) -> Result<Attrs> {
        let path = to_abs(&self.root, handle);
        if let Some(mode) = changes.mode {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).map_err(|e| map_io_err(&e))?;
        }
        if let Some(size) = changes.size {
            let file = OpenOptions::new().write(true).open(&path).map_err(|e| map_io_err(&e))?;
            file.set_len(size).map_err(|e| map_io_err(&e))?;
        }
        // atime/mtime updates are not wired up in this demo adapter: it has
        // no portable `utimensat` call available without the `libc` crate.
        self.stat(&path)
    }

    fn truncate(&self, handle: &BackingHandle, size: u64) -> Result<Attrs> {
        self.setattr(handle, &SetAttrs { size: Some(size), ..Default::default() })
    }

    fn create_regular(&self, parent: &BackingHandle, name: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        let path = to_abs(&self.root, parent).join(String::from_utf8_lossy(name).as_ref());
        let file = OpenOptions::new().write(true).create_new(true).open(&path).map_err(|e| map_io_err(&e))?;
        file.set_permissions(fs::Permissions::from_mode(spec.mode)).map_err(|e| map_io_err(&e))?;
        let attrs = self.stat(&path)?;
        let rel = path.strip_prefix(&self.root).map_err(|_| Error::Inval)?;
        Ok((to_handle(rel), attrs))
    }

    fn mkdir(&self, parent: &BackingHandle, name: &[u8], spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        let path = to_abs(&self.root, parent).join(String::from_utf8_lossy(name).as_ref());
        fs::create_dir(&path).map_err(|e| map_io_err(&e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(spec.mode)).map_err(|e| map_io_err(&e))?;
        let attrs = self.stat(&path)?;
        let rel = path.strip_prefix(&self.root).map_err(|_| Error::Inval)?;
        Ok((to_handle(rel), attrs))
    }

    fn symlink(&self, parent: &BackingHandle, name: &[u8], target: &[u8], _spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        let path = to_abs(&self.root, parent).join(String::from_utf8_lossy(name).as_ref());
        std::os::unix::fs::symlink(String::from_utf8_lossy(target).as_ref(), &path).map_err(|e| map_io_err(&e))?;
        let attrs = self.stat(&path)?;
        let rel = path.strip_prefix(&self.root).map_err(|_| Error::Inval)?;
        Ok((to_handle(rel), attrs))
    }

    fn mknode(&self, _parent: &BackingHandle, _name: &[u8], _kind: Kind, _device: Option<Device>, _spec: &NewFileSpec) -> Result<(BackingHandle, Attrs)> {
        Err(Error::NotSupp)
    }

    fn readlink(&self, handle: &BackingHandle) -> Result<Vec<u8>> {
        let target = fs::read_link(to_abs(&self.root, handle)).map_err(|e| map_io_err(&e))?;
        Ok(target.to_string_lossy().into_owned().into_bytes())
    }

    fn open(&self, handle: &BackingHandle, flags: OpenFlags) -> Result<Fd> {
        let path = to_abs(&self.root, handle);
        let file = match flags {
            OpenFlags::Read => OpenOptions::new().read(true).open(&path),
            OpenFlags::Write => OpenOptions::new().write(true).open(&path),
            OpenFlags::ReadWrite => OpenOptions::new().read(true).write(true).open(&path),
        }
        .map_err(|e| map_io_err(&e))?;
        let fd = Fd(self.next_fd.fetch_add(1, Ordering::Relaxed));
        self.open_files.lock().unwrap().insert(fd, file);
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> Result<()> {
        self.open_files.lock().unwrap().remove(&fd);
        Ok(())
    }

    fn read(&self, fd: Fd, offset: u64, len: u32) -> Result<Vec<u8>> {
        let files = self.open_files.lock().unwrap();
        let file = files.get(&fd).ok_or(Error::Inval)?;
        let mut buf = vec![0u8; len as usize];
        let read = file.read_at(&mut buf, offset).map_err(|e| map_io_err(&e))?;
        buf.truncate(read);
        Ok(buf)
    }

    fn write(&self, fd: Fd, offset: u64, data: &[u8]) -> Result<u32> {
        let files = self.open_files.lock().unwrap();
        let file = files.get(&fd).ok_or(Error::Inval)?;
        file.write_at(data, offset).map_err(|e| map_io_err(&e))?;
        Ok(data.len() as u32)
    }

    fn unlink(&self, parent: &BackingHandle, name: &[u8]) -> Result<()> {
        let path = to_abs(&self.root, parent).join(String::from_utf8_lossy(name).as_ref());
        fs::remove_file(&path).map_err(|e| map_io_err(&e))
    }

    fn rmdir(&self, parent: &BackingHandle, name: &[u8]) -> Result<()> {
        let path = to_abs(&self.root, parent).join(String::from_utf8_lossy(name).as_ref());
        fs::remove_dir(&path).map_err(|e| map_io_err(&e))
    }

    fn link(&self, source: &BackingHandle, new_parent: &BackingHandle, name: &[u8]) -> Result<Attrs> {
        let source_path = to_abs(&self.root, source);
        let new_path = to_abs(&self.root, new_parent).join(String::from_utf8_lossy(name).as_ref());
        fs::hard_link(&source_path, &new_path).map_err(|e| map_io_err(&e))?;
        self.stat(&source_path)
    }

    fn rename(&self, from_parent: &BackingHandle, from_name: &[u8], to_parent: &BackingHandle, to_name: &[u8]) -> Result<()> {
        let from = to_abs(&self.root, from_parent).join(String::from_utf8_lossy(from_name).as_ref());
        let to = to_abs(&self.root, to_parent).join(String::from_utf8_lossy(to_name).as_ref());
        fs::rename(&from, &to).map_err(|e| map_io_err(&e))
    }

    fn readdir(&self, handle: &BackingHandle, cookie: u64) -> Result<RawReadDir> {
        let dir = to_abs(&self.root, handle);
        let mut names: Vec<_> = fs::read_dir(&dir)
            .map_err(|e| map_io_err(&e))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        names.sort();

        let mut entries = Vec::new();
        for name in names.into_iter().skip(cookie as usize) {
            let child_path = dir.join(&name);
            let Ok(attrs) = self.stat(&child_path) else { continue };
            let rel = match child_path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            entries.push(RawDirEntry { name: name.to_string_lossy().into_owned().into_bytes(), handle: to_handle(rel), fileid: attrs.fileid });
        }
        Ok(RawReadDir { entries, end: true })
    }

    fn expand_handle(&self, raw: &[u8]) -> Result<BackingHandle> {
        Ok(BackingHandle(raw.to_vec()))
    }

    fn cleanup(&self, _handle: &BackingHandle) {}

    fn statfs(&self, _handle: &BackingHandle) -> Result<FsStat> {
        Ok(FsStat::default())
    }
}
