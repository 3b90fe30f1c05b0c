//! Inode cache and path walker sitting on top of [`minix`]. One cached
//! inode per `(fs_id, ino)` pair; `fs_id` distinguishes mounts (this kernel
//! mounts exactly one filesystem today, but the cache key leaves room for
//! more without a rewrite). Grounded on `examples/original_source/fs/` for
//! the `iget`/`iput`/refcount shape, `sync_fs_inodes`/`remove_fs_inodes`/
//! busy-umount checks, and on the teacher's `spin::Mutex`-guarded global
//! tables for the concurrency style.

pub mod minix;

use crate::config::{FD_TABLE_BITS, INODE_CACHE_CAP, SYMLINK_MAX_DEPTH};
use crate::lib::error::{Errno, KernelResult};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use minix::{inode::DiskInode, Minix, MinixInode};
use spin::Mutex;

const S_IFMT: u16 = 0o170000;
const S_IFDIR: u16 = 0o040000;
const S_IFLNK: u16 = 0o120000;
const S_IFREG: u16 = 0o100000;

struct CachedInode {
    fs_id: usize,
    refcount: u32,
    inode: Arc<MinixInode>,
}

/// Global inode cache, soft-capped at [`INODE_CACHE_CAP`]. Eviction only
/// ever considers entries with `refcount == 0`; a cache at capacity with
/// every entry pinned simply grows past the cap rather than panicking,
/// since correctness matters more than the soft limit.
pub struct InodeCache {
    entries: Mutex<Vec<CachedInode>>,
}

impl InodeCache {
    pub const fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    /// A lookup hit always reuses the existing entry and bumps its
    /// refcount; this is what keeps the cache from ever holding two
    /// entries for the same `(fs_id, ino)` pair.
    fn get_or_load(&self, fs: &Minix, fs_id: usize, ino: u32) -> KernelResult<Arc<MinixInode>> {
        let mut entries = self.entries.lock();
        if let Some(found) = entries.iter_mut().find(|e| e.fs_id == fs_id && e.inode.ino == ino) {
            found.refcount += 1;
            return Ok(found.inode.clone());
        }

        if entries.len() >= INODE_CACHE_CAP {
            if let Some(pos) = entries.iter().position(|e| e.refcount == 0) {
                entries.remove(pos);
            }
        }

        let disk = fs.read_inode(ino)?;
        let inode = Arc::new(MinixInode::new(ino, disk));
        entries.push(CachedInode { fs_id, refcount: 1, inode: inode.clone() });
        Ok(inode)
    }

    fn put(&self, fs_id: usize, ino: u32) {
        let mut entries = self.entries.lock();
        if let Some(found) = entries.iter_mut().find(|e| e.fs_id == fs_id && e.inode.ino == ino) {
            found.refcount = found.refcount.saturating_sub(1);
        }
    }

    /// Bumps the refcount of an already-resident entry without touching
    /// disk. Used when a caller hands out a second logical reference to an
    /// inode it already holds (e.g. the current working directory), so the
    /// eventual matching `iput` doesn't underflow the real reference count.
    fn bump(&self, fs_id: usize, ino: u32) {
        let mut entries = self.entries.lock();
        if let Some(found) = entries.iter_mut().find(|e| e.fs_id == fs_id && e.inode.ino == ino) {
            found.refcount += 1;
        }
    }

    /// Sum of refcounts for `fs_id`, excluding the inode numbers in
    /// `exempt` (typically the root inode and the current working
    /// directory, which the filesystem itself always holds open).
    fn outstanding_references(&self, fs_id: usize, exempt: &[u32]) -> u32 {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.fs_id == fs_id && !exempt.contains(&e.inode.ino))
            .map(|e| e.refcount)
            .sum()
    }

    /// Writes every dirty cached inode for `fs_id` back to disk.
    fn sync_fs_inodes(&self, fs: &Minix, fs_id: usize) -> KernelResult<()> {
        for entry in self.entries.lock().iter().filter(|e| e.fs_id == fs_id) {
            fs.write_inode(entry.inode.ino, &entry.inode.disk.lock())?;
        }
        Ok(())
    }

    /// Drops every cached entry for `fs_id`, used once a mount has been
    /// synced and is about to go away.
    fn remove_fs_inodes(&self, fs_id: usize) {
        self.entries.lock().retain(|e| e.fs_id != fs_id);
    }
}

/// A generic bitmap-backed slot table: the shape [`FdTable`] and the
/// directory-handle table both need (allocate lowest free slot, install,
/// close, operate-in-place), parameterized over the slot's payload type.
struct SlotTable<T> {
    bitmap: Mutex<Vec<u8>>,
    slots: Mutex<Vec<Option<T>>>,
}

impl<T> SlotTable<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity, || None);
        Self { bitmap: Mutex::new(alloc::vec![0u8; capacity / 8]), slots: Mutex::new(slots) }
    }

    fn alloc_slot(&self) -> KernelResult<usize> {
        let mut bitmap = self.bitmap.lock();
        for (byte_idx, byte) in bitmap.iter_mut().enumerate() {
            if *byte != 0xFF {
                for bit in 0..8 {
                    if *byte & (1 << bit) == 0 {
                        *byte |= 1 << bit;
                        return Ok(byte_idx * 8 + bit);
                    }
                }
            }
        }
        Err(Errno::EMFILE)
    }

    fn install(&self, value: T) -> KernelResult<usize> {
        let slot = self.alloc_slot()?;
        self.slots.lock()[slot] = Some(value);
        Ok(slot)
    }

    fn close(&self, slot: usize) -> KernelResult<T> {
        if slot >= self.slots.lock().len() {
            return Err(Errno::EBADF);
        }
        let taken = self.slots.lock()[slot].take();
        match taken {
            Some(value) => {
                self.bitmap.lock()[slot / 8] &= !(1 << (slot % 8));
                Ok(value)
            }
            None => Err(Errno::EBADF),
        }
    }

    fn with<R>(&self, slot: usize, f: impl FnOnce(&mut T) -> KernelResult<R>) -> KernelResult<R> {
        if slot >= self.slots.lock().len() {
            return Err(Errno::EBADF);
        }
        let mut slots = self.slots.lock();
        match slots[slot].as_mut() {
            Some(value) => f(value),
            None => Err(Errno::EBADF),
        }
    }
}

/// Fixed-size process-wide descriptor table. One bit per slot; `0` tracks
/// a free descriptor since this kernel runs a single address space and has
/// no per-process fd tables to speak of.
pub struct FdTable {
    inner: SlotTable<OpenFile>,
}

pub struct OpenFile {
    pub inode: Arc<MinixInode>,
    pub offset: u64,
}

impl FdTable {
    pub fn new() -> Self {
        Self { inner: SlotTable::new(FD_TABLE_BITS) }
    }

    pub fn install(&self, file: OpenFile) -> KernelResult<usize> {
        self.inner.install(file)
    }

    pub fn close(&self, fd: usize) -> KernelResult<OpenFile> {
        self.inner.close(fd)
    }

    pub fn with_file<R>(&self, fd: usize, f: impl FnOnce(&mut OpenFile) -> KernelResult<R>) -> KernelResult<R> {
        self.inner.with(fd, f)
    }
}

/// An open directory: a snapshot of its entries taken at `opendir`/
/// `rewinddir` time, plus the read cursor `readdir`/`getdents` advance.
struct DirHandle {
    inode: Arc<MinixInode>,
    entries: Vec<(u32, Vec<u8>)>,
    pos: usize,
}

bitflags::bitflags! {
    pub struct OpenFlags: u32 {
        const O_CREAT = 1 << 0;
        const O_EXCL = 1 << 1;
        const O_DIRECTORY = 1 << 2;
        const O_TRUNC = 1 << 3;
    }
}

/// `lseek`'s three reference points.
#[derive(Debug, Clone, Copy)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// The subset of a Minix disk inode `stat`/`lstat`/`fstat` report.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub ino: u32,
    pub mode: u16,
    pub nlinks: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl Stat {
    fn from_inode(inode: &Arc<MinixInode>) -> Self {
        let disk = inode.disk.lock();
        Stat {
            ino: inode.ino,
            mode: disk.mode,
            nlinks: disk.nlinks,
            uid: disk.uid,
            gid: disk.gid,
            size: disk.size,
            atime: disk.atime,
            mtime: disk.mtime,
            ctime: disk.ctime,
        }
    }
}

/// The mounted filesystem plus its cache, descriptor table, and current
/// working directory. `fs_id` is fixed at 0 since only one mount exists; a
/// second mount would take the next id.
pub struct Vfs {
    fs: Minix,
    fs_id: usize,
    cache: InodeCache,
    pub fds: FdTable,
    dirs: SlotTable<DirHandle>,
    cwd: Mutex<Arc<MinixInode>>,
}

impl Vfs {
    pub fn new(fs: Minix) -> KernelResult<Self> {
        let cache = InodeCache::new();
        let root = cache.get_or_load(&fs, 0, minix::ROOT_INO)?;
        Ok(Self {
            fs,
            fs_id: 0,
            cache,
            fds: FdTable::new(),
            dirs: SlotTable::new(FD_TABLE_BITS),
            cwd: Mutex::new(root),
        })
    }

    /// Mounts `device` as a fresh Minix filesystem and wraps it in a `Vfs`.
    pub fn mount(device: crate::block::BoxedBlockDevice) -> KernelResult<Self> {
        Self::new(Minix::mount(device)?)
    }

    /// Unmounts, refusing while anything besides the root inode and the
    /// current working directory still holds a reference (open files,
    /// open directories, or an in-flight path walk).
    pub fn umount(self) -> KernelResult<()> {
        let cwd_ino = self.cwd.lock().ino;
        if self.cache.outstanding_references(self.fs_id, &[minix::ROOT_INO, cwd_ino]) > 0 {
            return Err(Errno::EBUSY);
        }
        self.cache.sync_fs_inodes(&self.fs, self.fs_id)?;
        self.cache.remove_fs_inodes(self.fs_id);
        self.fs.sync()
    }

    pub fn root(&self) -> KernelResult<Arc<MinixInode>> {
        self.cache.get_or_load(&self.fs, self.fs_id, minix::ROOT_INO)
    }

    pub fn iget(&self, ino: u32) -> KernelResult<Arc<MinixInode>> {
        self.cache.get_or_load(&self.fs, self.fs_id, ino)
    }

    pub fn iput(&self, inode: &Arc<MinixInode>) {
        self.cache.put(self.fs_id, inode.ino);
    }

    /// The root for a path walk: the real root for an absolute path, the
    /// current working directory for a relative one.
    fn base(&self, path: &str) -> KernelResult<Arc<MinixInode>> {
        if path.starts_with('/') {
            self.root()
        } else {
            let cwd = self.cwd.lock().clone();
            self.cache.bump(self.fs_id, cwd.ino);
            Ok(cwd)
        }
    }

    pub fn sync(&self) -> KernelResult<()> {
        self.cache.sync_fs_inodes(&self.fs, self.fs_id)?;
        self.fs.sync()
    }

    /// Walks `path`, following symlinks inline. Returns the resolved
    /// inode. `ELOOP` once more than [`SYMLINK_MAX_DEPTH`] links have been
    /// expanded in a single walk.
    pub fn lookup_path(&self, path: &str) -> KernelResult<Arc<MinixInode>> {
        self.walk(path, 0)
    }

    fn walk(&self, path: &str, depth: u32) -> KernelResult<Arc<MinixInode>> {
        if depth > SYMLINK_MAX_DEPTH {
            return Err(Errno::ELOOP);
        }
        let mut current = self.base(path)?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if component.len() > crate::config::MINIX_NAME_LEN {
                return Err(Errno::ENAMETOOLONG);
            }
            if !current.disk.lock().is_dir() {
                return Err(Errno::ENOTDIR);
            }
            let entry = minix::dir::find_entry(&self.fs, &current, component.as_bytes())?;
            let Some(entry) = entry else {
                return Err(Errno::ENOENT);
            };
            let next = self.iget(entry.ino)?;
            self.iput(&current);
            current = next;

            let mode = current.disk.lock().mode;
            if mode & S_IFMT == S_IFLNK {
                let target = self.read_link(&current)?;
                let resolved = self.walk(&target, depth + 1)?;
                self.iput(&current);
                current = resolved;
            }
        }
        Ok(current)
    }

    /// Resolves every path component but the last, returning the parent
    /// directory and the last component without expanding a trailing
    /// symlink — the shape `lstat`/`readlink`/`unlink` all need.
    fn lookup_no_follow(&self, path: &str) -> KernelResult<Arc<MinixInode>> {
        if path.trim_end_matches('/').is_empty() {
            return self.root();
        }
        let (parent, name) = self.split_parent(path)?;
        let entry = minix::dir::find_entry(&self.fs, &parent, name.as_bytes());
        self.iput(&parent);
        match entry? {
            Some(entry) => self.iget(entry.ino),
            None => Err(Errno::ENOENT),
        }
    }

    fn read_link(&self, inode: &Arc<MinixInode>) -> KernelResult<String> {
        let (size, zone0) = {
            let disk = inode.disk.lock();
            (disk.size as usize, disk.zone[0])
        };
        if zone0 == 0 {
            return Ok(String::new());
        }
        let block = self.fs.device.fix(zone0 as u64)?;
        let len = size.min(block.data.len());
        let target = String::from_utf8_lossy(&block.data[..len]).into_owned();
        self.fs.device.unfix(block)?;
        Ok(target)
    }

    /// The target of the symlink at `path`, without following it.
    pub fn readlink(&self, path: &str) -> KernelResult<String> {
        let inode = self.lookup_no_follow(path)?;
        let mode = inode.disk.lock().mode;
        if mode & S_IFMT != S_IFLNK {
            self.iput(&inode);
            return Err(Errno::EINVAL);
        }
        let target = self.read_link(&inode);
        self.iput(&inode);
        target
    }

    /// Splits `path` into its parent directory and final component,
    /// resolving the parent relative to the root or the current working
    /// directory according to whether `path` is absolute.
    fn split_parent<'p>(&self, path: &'p str) -> KernelResult<(Arc<MinixInode>, &'p str)> {
        let absolute = path.starts_with('/');
        let trimmed = path.trim_end_matches('/');
        let (parent_path, name) = match trimmed.rfind('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };
        if name.is_empty() {
            return Err(Errno::EINVAL);
        }
        let parent = if parent_path.is_empty() {
            if absolute { self.root()? } else { self.base(path)? }
        } else {
            self.lookup_path(parent_path)?
        };
        Ok((parent, name))
    }

    /// Opens `path`, creating it (as a regular file) when `O_CREAT` is set
    /// and the name doesn't already exist. `O_EXCL` with `O_CREAT` fails if
    /// it does.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u16) -> KernelResult<Arc<MinixInode>> {
        match self.lookup_path(path) {
            Ok(inode) => {
                if flags.contains(OpenFlags::O_CREAT) && flags.contains(OpenFlags::O_EXCL) {
                    self.iput(&inode);
                    return Err(Errno::EEXIST);
                }
                if flags.contains(OpenFlags::O_DIRECTORY) && !inode.disk.lock().is_dir() {
                    self.iput(&inode);
                    return Err(Errno::ENOTDIR);
                }
                if flags.contains(OpenFlags::O_TRUNC) && !inode.disk.lock().is_dir() {
                    self.truncate_inode(&inode, 0)?;
                }
                Ok(inode)
            }
            Err(Errno::ENOENT) if flags.contains(OpenFlags::O_CREAT) => self.create(path, mode),
            Err(e) => Err(e),
        }
    }

    /// `open` plus fd-table bookkeeping: the form most callers want.
    pub fn open_fd(&self, path: &str, flags: OpenFlags, mode: u16) -> KernelResult<usize> {
        let inode = self.open(path, flags, mode)?;
        match self.fds.install(OpenFile { inode: inode.clone(), offset: 0 }) {
            Ok(fd) => Ok(fd),
            Err(e) => {
                self.iput(&inode);
                Err(e)
            }
        }
    }

    pub fn close_fd(&self, fd: usize) -> KernelResult<()> {
        let file = self.fds.close(fd)?;
        self.iput(&file.inode);
        Ok(())
    }

    pub fn create(&self, path: &str, mode: u16) -> KernelResult<Arc<MinixInode>> {
        let (parent, name) = self.split_parent(path)?;
        if !parent.disk.lock().is_dir() {
            self.iput(&parent);
            return Err(Errno::ENOTDIR);
        }
        let ino = self.fs.alloc_inode();
        if ino == 0 {
            self.iput(&parent);
            return Err(Errno::ENOSPC);
        }
        let disk = DiskInode { mode: (mode & !S_IFMT) | S_IFREG, nlinks: 1, ..Default::default() };
        self.fs.write_inode(ino, &disk)?;
        if let Err(e) = minix::dir::add_entry(&self.fs, &parent, name.as_bytes(), ino) {
            self.fs.free_inode(ino);
            self.iput(&parent);
            return Err(e);
        }
        self.iput(&parent);
        self.iget(ino)
    }

    pub fn mkdir(&self, path: &str, mode: u16) -> KernelResult<()> {
        let (parent, name) = self.split_parent(path)?;
        if !parent.disk.lock().is_dir() {
            self.iput(&parent);
            return Err(Errno::ENOTDIR);
        }
        if minix::dir::find_entry(&self.fs, &parent, name.as_bytes())?.is_some() {
            self.iput(&parent);
            return Err(Errno::EEXIST);
        }
        let ino = self.fs.alloc_inode();
        if ino == 0 {
            self.iput(&parent);
            return Err(Errno::ENOSPC);
        }
        let disk = DiskInode { mode: (mode & !S_IFMT) | S_IFDIR, nlinks: 0, ..Default::default() };
        self.fs.write_inode(ino, &disk)?;
        let dir_inode = self.iget(ino)?;
        minix::dir::make_empty(&self.fs, &dir_inode, parent.ino, ino)?;

        if let Err(e) = minix::dir::add_entry(&self.fs, &parent, name.as_bytes(), ino) {
            self.fs.free_inode(ino);
            self.iput(&dir_inode);
            self.iput(&parent);
            return Err(e);
        }
        dir_inode.disk.lock().nlinks = 2;
        parent.disk.lock().nlinks += 1;
        self.iput(&dir_inode);
        self.iput(&parent);
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> KernelResult<()> {
        let (parent, name) = self.split_parent(path)?;
        let entry = minix::dir::find_entry(&self.fs, &parent, name.as_bytes())?;
        let Some(entry) = entry else {
            self.iput(&parent);
            return Err(Errno::ENOENT);
        };
        let target = self.iget(entry.ino)?;
        if !target.disk.lock().is_dir() {
            self.iput(&target);
            self.iput(&parent);
            return Err(Errno::ENOTDIR);
        }
        if !minix::dir::is_empty(&self.fs, &target)? {
            self.iput(&target);
            self.iput(&parent);
            return Err(Errno::ENOTEMPTY);
        }
        minix::dir::remove_entry(&self.fs, &parent, name.as_bytes())?;
        parent.disk.lock().nlinks -= 1;
        target.disk.lock().nlinks = 0;
        self.fs.free_inode(target.ino);
        self.iput(&target);
        self.iput(&parent);
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> KernelResult<()> {
        let (parent, name) = self.split_parent(path)?;
        let entry = minix::dir::find_entry(&self.fs, &parent, name.as_bytes())?;
        let Some(entry) = entry else {
            self.iput(&parent);
            return Err(Errno::ENOENT);
        };
        let target = self.iget(entry.ino)?;
        if target.disk.lock().is_dir() {
            self.iput(&target);
            self.iput(&parent);
            return Err(Errno::EISDIR);
        }
        minix::dir::remove_entry(&self.fs, &parent, name.as_bytes())?;
        let nlinks = {
            let mut disk = target.disk.lock();
            disk.nlinks = disk.nlinks.saturating_sub(1);
            disk.nlinks
        };
        if nlinks == 0 {
            target.truncate(&self.fs, 0)?;
            self.fs.free_inode(target.ino);
        }
        self.iput(&target);
        self.iput(&parent);
        Ok(())
    }

    /// Adds a second name for the inode at `old_path`. Refuses directories,
    /// matching `link(2)`.
    pub fn link(&self, old_path: &str, new_path: &str) -> KernelResult<()> {
        let target = self.lookup_path(old_path)?;
        if target.disk.lock().is_dir() {
            self.iput(&target);
            return Err(Errno::EPERM);
        }
        let (parent, name) = match self.split_parent(new_path) {
            Ok(v) => v,
            Err(e) => {
                self.iput(&target);
                return Err(e);
            }
        };
        if !parent.disk.lock().is_dir() {
            self.iput(&target);
            self.iput(&parent);
            return Err(Errno::ENOTDIR);
        }
        let clash = minix::dir::find_entry(&self.fs, &parent, name.as_bytes());
        if matches!(clash, Ok(Some(_))) {
            self.iput(&target);
            self.iput(&parent);
            return Err(Errno::EEXIST);
        }
        if let Err(e) = clash {
            self.iput(&target);
            self.iput(&parent);
            return Err(e);
        }
        if let Err(e) = minix::dir::add_entry(&self.fs, &parent, name.as_bytes(), target.ino) {
            self.iput(&target);
            self.iput(&parent);
            return Err(e);
        }
        target.disk.lock().nlinks += 1;
        self.fs.write_inode(target.ino, &target.disk.lock())?;
        self.iput(&target);
        self.iput(&parent);
        Ok(())
    }

    /// Moves `old_path` to `new_path`. When a directory crosses into a new
    /// parent, its `..` entry is rewritten and both parents' link counts
    /// are adjusted to match (the moved directory's `..` no longer counts
    /// against the old parent, and does against the new one).
    pub fn rename(&self, old_path: &str, new_path: &str) -> KernelResult<()> {
        let (old_parent, old_name) = self.split_parent(old_path)?;
        let old_entry = minix::dir::find_entry(&self.fs, &old_parent, old_name.as_bytes())?;
        let Some(old_entry) = old_entry else {
            self.iput(&old_parent);
            return Err(Errno::ENOENT);
        };
        let moved = self.iget(old_entry.ino)?;
        let moved_is_dir = moved.disk.lock().is_dir();

        let (new_parent, new_name) = match self.split_parent(new_path) {
            Ok(v) => v,
            Err(e) => {
                self.iput(&moved);
                self.iput(&old_parent);
                return Err(e);
            }
        };

        if let Err(e) = self.rename_clear_destination(&new_parent, new_name, moved.ino, moved_is_dir) {
            self.iput(&moved);
            self.iput(&old_parent);
            self.iput(&new_parent);
            return Err(e);
        }

        if let Err(e) = minix::dir::add_entry(&self.fs, &new_parent, new_name.as_bytes(), moved.ino) {
            self.iput(&moved);
            self.iput(&old_parent);
            self.iput(&new_parent);
            return Err(e);
        }
        minix::dir::remove_entry(&self.fs, &old_parent, old_name.as_bytes())?;

        if moved_is_dir && old_parent.ino != new_parent.ino {
            minix::dir::remove_entry(&self.fs, &moved, b"..")?;
            minix::dir::add_entry(&self.fs, &moved, b"..", new_parent.ino)?;
            old_parent.disk.lock().nlinks -= 1;
            new_parent.disk.lock().nlinks += 1;
        }

        self.iput(&moved);
        self.iput(&old_parent);
        self.iput(&new_parent);
        Ok(())
    }

    /// If `new_name` already exists in `new_parent` and isn't the same
    /// inode as the one being moved, removes it (an empty directory or any
    /// non-directory), erroring if that isn't possible.
    fn rename_clear_destination(
        &self,
        new_parent: &Arc<MinixInode>,
        new_name: &str,
        moved_ino: u32,
        moved_is_dir: bool,
    ) -> KernelResult<()> {
        let existing = minix::dir::find_entry(&self.fs, new_parent, new_name.as_bytes())?;
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.ino == moved_ino {
            return Ok(());
        }
        let existing_inode = self.iget(existing.ino)?;
        let existing_is_dir = existing_inode.disk.lock().is_dir();
        if existing_is_dir != moved_is_dir {
            self.iput(&existing_inode);
            return Err(if moved_is_dir { Errno::ENOTDIR } else { Errno::EISDIR });
        }
        if existing_is_dir && !minix::dir::is_empty(&self.fs, &existing_inode)? {
            self.iput(&existing_inode);
            return Err(Errno::ENOTEMPTY);
        }
        minix::dir::remove_entry(&self.fs, new_parent, new_name.as_bytes())?;
        if existing_is_dir {
            new_parent.disk.lock().nlinks -= 1;
            existing_inode.disk.lock().nlinks = 0;
            self.fs.free_inode(existing_inode.ino);
        } else {
            let nlinks = {
                let mut disk = existing_inode.disk.lock();
                disk.nlinks = disk.nlinks.saturating_sub(1);
                disk.nlinks
            };
            if nlinks == 0 {
                existing_inode.truncate(&self.fs, 0)?;
                self.fs.free_inode(existing_inode.ino);
            }
        }
        self.iput(&existing_inode);
        Ok(())
    }

    pub fn read(&self, inode: &Arc<MinixInode>, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let (size, blocksize) = (inode.disk.lock().size as u64, self.fs.device.blocksize() as u64);
        if offset >= size {
            return Ok(0);
        }
        let to_read = buf.len().min((size - offset) as usize);
        let mut done = 0usize;
        while done < to_read {
            let pos = offset + done as u64;
            let lblock = pos / blocksize;
            let in_block = (pos % blocksize) as usize;
            let zone = inode.get_block(&self.fs, lblock, false)?;
            let chunk_len = (blocksize as usize - in_block).min(to_read - done);
            if zone == 0 {
                buf[done..done + chunk_len].fill(0);
            } else {
                let block = self.fs.device.fix(zone as u64)?;
                buf[done..done + chunk_len].copy_from_slice(&block.data[in_block..in_block + chunk_len]);
                self.fs.device.unfix(block)?;
            }
            done += chunk_len;
        }
        Ok(done)
    }

    pub fn write(&self, inode: &Arc<MinixInode>, offset: u64, buf: &[u8]) -> KernelResult<usize> {
        let blocksize = self.fs.device.blocksize() as u64;
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let lblock = pos / blocksize;
            let in_block = (pos % blocksize) as usize;
            let zone = inode.get_block(&self.fs, lblock, true)?;
            let chunk_len = (blocksize as usize - in_block).min(buf.len() - done);
            let mut block = self.fs.device.fix(zone as u64)?;
            block.data[in_block..in_block + chunk_len].copy_from_slice(&buf[done..done + chunk_len]);
            block.mark_dirty();
            self.fs.device.unfix(block)?;
            done += chunk_len;
        }
        let mut disk = inode.disk.lock();
        let new_size = offset + done as u64;
        if new_size > disk.size as u64 {
            disk.size = new_size as u32;
        }
        Ok(done)
    }

    pub fn read_fd(&self, fd: usize, buf: &mut [u8]) -> KernelResult<usize> {
        self.fds.with_file(fd, |file| {
            let n = self.read(&file.inode, file.offset, buf)?;
            file.offset += n as u64;
            Ok(n)
        })
    }

    pub fn write_fd(&self, fd: usize, buf: &[u8]) -> KernelResult<usize> {
        self.fds.with_file(fd, |file| {
            let n = self.write(&file.inode, file.offset, buf)?;
            file.offset += n as u64;
            Ok(n)
        })
    }

    pub fn lseek(&self, fd: usize, offset: i64, whence: Whence) -> KernelResult<u64> {
        self.fds.with_file(fd, |file| {
            let size = file.inode.disk.lock().size as i64;
            let base = match whence {
                Whence::Set => 0,
                Whence::Cur => file.offset as i64,
                Whence::End => size,
            };
            let new_offset = base + offset;
            if new_offset < 0 {
                return Err(Errno::EINVAL);
            }
            file.offset = new_offset as u64;
            Ok(file.offset)
        })
    }

    fn truncate_inode(&self, inode: &Arc<MinixInode>, new_size: u64) -> KernelResult<()> {
        let blocksize = self.fs.device.blocksize() as u64;
        let new_blocks = (new_size + blocksize - 1) / blocksize;
        inode.truncate(&self.fs, new_blocks)?;
        inode.disk.lock().size = new_size as u32;
        Ok(())
    }

    pub fn truncate(&self, path: &str, new_size: u64) -> KernelResult<()> {
        let inode = self.lookup_path(path)?;
        let result = self.truncate_inode(&inode, new_size);
        self.iput(&inode);
        result
    }

    pub fn ftruncate(&self, fd: usize, new_size: u64) -> KernelResult<()> {
        self.fds.with_file(fd, |file| self.truncate_inode(&file.inode, new_size))
    }

    pub fn symlink(&self, target: &str, link_path: &str) -> KernelResult<()> {
        let inode = self.create(link_path, 0o777)?;
        {
            let mut disk = inode.disk.lock();
            disk.mode = (disk.mode & !S_IFMT) | S_IFLNK;
        }
        self.write(&inode, 0, target.as_bytes())?;
        self.iput(&inode);
        Ok(())
    }

    pub fn stat(&self, path: &str) -> KernelResult<Stat> {
        let inode = self.lookup_path(path)?;
        let st = Stat::from_inode(&inode);
        self.iput(&inode);
        Ok(st)
    }

    pub fn lstat(&self, path: &str) -> KernelResult<Stat> {
        let inode = self.lookup_no_follow(path)?;
        let st = Stat::from_inode(&inode);
        self.iput(&inode);
        Ok(st)
    }

    pub fn fstat(&self, fd: usize) -> KernelResult<Stat> {
        self.fds.with_file(fd, |file| Ok(Stat::from_inode(&file.inode)))
    }

    pub fn chdir(&self, path: &str) -> KernelResult<()> {
        let inode = self.lookup_path(path)?;
        if !inode.disk.lock().is_dir() {
            self.iput(&inode);
            return Err(Errno::ENOTDIR);
        }
        let mut cwd = self.cwd.lock();
        let old = core::mem::replace(&mut *cwd, inode);
        drop(cwd);
        self.iput(&old);
        Ok(())
    }

    pub fn fchdir(&self, fd: usize) -> KernelResult<()> {
        let inode = self.fds.with_file(fd, |file| Ok(file.inode.clone()))?;
        if !inode.disk.lock().is_dir() {
            return Err(Errno::ENOTDIR);
        }
        self.cache.bump(self.fs_id, inode.ino);
        let mut cwd = self.cwd.lock();
        let old = core::mem::replace(&mut *cwd, inode);
        drop(cwd);
        self.iput(&old);
        Ok(())
    }

    /// Every non-empty entry across the whole directory, read in one shot.
    pub fn readdir_all(&self, inode: &Arc<MinixInode>) -> KernelResult<Vec<(u32, Vec<u8>)>> {
        minix::dir::iterate(&self.fs, inode)
    }

    pub fn opendir(&self, path: &str) -> KernelResult<usize> {
        let inode = self.lookup_path(path)?;
        if !inode.disk.lock().is_dir() {
            self.iput(&inode);
            return Err(Errno::ENOTDIR);
        }
        let entries = match minix::dir::iterate(&self.fs, &inode) {
            Ok(e) => e,
            Err(e) => {
                self.iput(&inode);
                return Err(e);
            }
        };
        match self.dirs.install(DirHandle { inode: inode.clone(), entries, pos: 0 }) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.iput(&inode);
                Err(e)
            }
        }
    }

    /// One entry at a time, POSIX `readdir(3)` style.
    pub fn readdir(&self, handle: usize) -> KernelResult<Option<(u32, Vec<u8>)>> {
        self.dirs.with(handle, |dh| {
            if dh.pos >= dh.entries.len() {
                return Ok(None);
            }
            let entry = dh.entries[dh.pos].clone();
            dh.pos += 1;
            Ok(Some(entry))
        })
    }

    /// Up to `max` entries at once, Linux `getdents(2)` style.
    pub fn getdents(&self, handle: usize, max: usize) -> KernelResult<Vec<(u32, Vec<u8>)>> {
        self.dirs.with(handle, |dh| {
            let end = (dh.pos + max).min(dh.entries.len());
            let chunk = dh.entries[dh.pos..end].to_vec();
            dh.pos = end;
            Ok(chunk)
        })
    }

    pub fn rewinddir(&self, handle: usize) -> KernelResult<()> {
        self.dirs.with(handle, |dh| {
            dh.entries = minix::dir::iterate(&self.fs, &dh.inode)?;
            dh.pos = 0;
            Ok(())
        })
    }

    pub fn closedir(&self, handle: usize) -> KernelResult<()> {
        let dh = self.dirs.close(handle)?;
        self.iput(&dh.inode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ramdisk::RamDisk;
    use alloc::boxed::Box;

    fn minix_image(total_blocks: u64) -> Vec<u8> {
        let mut image = alloc::vec![0u8; (total_blocks * 1024) as usize];
        let sb = &mut image[1024..2048];
        sb[0..4].copy_from_slice(&64u32.to_le_bytes()); // ninodes
        sb[6..8].copy_from_slice(&1u16.to_le_bytes()); // imap_blocks
        sb[8..10].copy_from_slice(&1u16.to_le_bytes()); // zmap_blocks
        sb[10..12].copy_from_slice(&10u16.to_le_bytes()); // firstdatazone
        sb[12..14].copy_from_slice(&0u16.to_le_bytes()); // log_zone_size
        sb[20..24].copy_from_slice(&(total_blocks as u32).to_le_bytes()); // nzones
        sb[24..26].copy_from_slice(&0x4D5Au16.to_le_bytes()); // magic
        sb[28..30].copy_from_slice(&1024u16.to_le_bytes()); // blocksize

        // reserve bit 0 in imap/zmap and root inode's bit.
        image[2048] = 0b0000_0011; // inode 0 reserved, inode 1 (root) allocated
        image[3072] = 0b0000_0001; // zone bit 0 reserved

        let root_off = 4096; // inode table starts at block 4 (2 + 1 + 1)
        let mode: u16 = S_IFDIR;
        image[root_off..root_off + 2].copy_from_slice(&mode.to_le_bytes());
        image[root_off + 2..root_off + 4].copy_from_slice(&2u16.to_le_bytes()); // nlinks
        image
    }

    fn mounted_vfs() -> Vfs {
        let disk = RamDisk::new(64);
        disk.load_image(&minix_image(64));
        let fs = Minix::mount(Box::new(disk)).unwrap();
        let vfs = Vfs::new(fs).unwrap();
        minix::dir::make_empty(&vfs.fs, &vfs.root().unwrap(), minix::ROOT_INO, minix::ROOT_INO).unwrap();
        vfs
    }

    #[test]
    fn root_inode_is_a_directory() {
        let vfs = mounted_vfs();
        let root = vfs.root().unwrap();
        assert!(root.disk.lock().is_dir());
    }

    #[test]
    fn create_then_open_round_trips() {
        let vfs = mounted_vfs();
        let inode = vfs.create("/hello.txt", 0o644).unwrap();
        assert!(!inode.disk.lock().is_dir());
        vfs.write(&inode, 0, b"hi").unwrap();
        let mut buf = [0u8; 2];
        let n = vfs.read(&inode, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[test]
    fn mkdir_then_rmdir_round_trips() {
        let vfs = mounted_vfs();
        vfs.mkdir("/sub", 0o755).unwrap();
        assert!(vfs.lookup_path("/sub").is_ok());
        vfs.rmdir("/sub").unwrap();
        assert!(matches!(vfs.lookup_path("/sub"), Err(Errno::ENOENT)));
    }

    #[test]
    fn deep_symlink_chain_hits_eloop() {
        let vfs = mounted_vfs();
        for i in 0..(SYMLINK_MAX_DEPTH + 2) {
            let name = alloc::format!("/l{}", i);
            let target = alloc::format!("/l{}", i + 1);
            vfs.symlink(&target, &name).unwrap();
        }
        assert!(matches!(vfs.lookup_path("/l0"), Err(Errno::ELOOP)));
    }

    #[test]
    fn link_adds_a_second_name_with_shared_inode() {
        let vfs = mounted_vfs();
        let a = vfs.create("/a", 0o644).unwrap();
        vfs.write(&a, 0, b"payload").unwrap();
        vfs.link("/a", "/b").unwrap();
        let stat_a = vfs.stat("/a").unwrap();
        let stat_b = vfs.stat("/b").unwrap();
        assert_eq!(stat_a.ino, stat_b.ino);
        assert_eq!(stat_a.nlinks, 2);

        vfs.unlink("/a").unwrap();
        let stat_b = vfs.stat("/b").unwrap();
        assert_eq!(stat_b.nlinks, 1);
    }

    #[test]
    fn rename_moves_across_directories_and_rewrites_dotdot() {
        let vfs = mounted_vfs();
        vfs.mkdir("/src", 0o755).unwrap();
        vfs.mkdir("/dst", 0o755).unwrap();
        vfs.mkdir("/src/moved", 0o755).unwrap();
        vfs.rename("/src/moved", "/dst/moved").unwrap();

        assert!(matches!(vfs.lookup_path("/src/moved"), Err(Errno::ENOENT)));
        let moved = vfs.lookup_path("/dst/moved").unwrap();
        assert!(moved.disk.lock().is_dir());

        let dst = vfs.lookup_path("/dst").unwrap();
        let entries = vfs.readdir_all(&moved).unwrap();
        let dotdot = entries.iter().find(|(_, name)| name == b"..").unwrap();
        assert_eq!(dotdot.0, dst.ino);
    }

    #[test]
    fn truncate_then_read_sees_zeros_past_new_size() {
        let vfs = mounted_vfs();
        let inode = vfs.create("/f", 0o644).unwrap();
        vfs.write(&inode, 0, b"0123456789").unwrap();
        vfs.truncate("/f", 4).unwrap();
        assert_eq!(vfs.stat("/f").unwrap().size, 4);
    }

    #[test]
    fn opendir_getdents_and_closedir() {
        let vfs = mounted_vfs();
        vfs.create("/one", 0o644).unwrap();
        vfs.create("/two", 0o644).unwrap();
        let handle = vfs.opendir("/").unwrap();
        let mut names: Vec<Vec<u8>> = Vec::new();
        while let Some((_, name)) = vfs.readdir(handle).unwrap() {
            names.push(name);
        }
        assert!(names.iter().any(|n| n == b"one"));
        assert!(names.iter().any(|n| n == b"two"));
        vfs.closedir(handle).unwrap();
    }

    #[test]
    fn chdir_then_relative_lookup() {
        let vfs = mounted_vfs();
        vfs.mkdir("/sub", 0o755).unwrap();
        vfs.chdir("/sub").unwrap();
        vfs.create("rel.txt", 0o644).unwrap();
        assert!(vfs.lookup_path("/sub/rel.txt").is_ok());
    }

    #[test]
    fn umount_refuses_while_a_file_is_open() {
        let vfs = mounted_vfs();
        let inode = vfs.create("/held", 0o644).unwrap();
        assert!(matches!(vfs.umount(), Err(Errno::EBUSY)));
        vfs.iput(&inode);
    }
}
