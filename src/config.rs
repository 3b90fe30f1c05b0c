//! Named tunables pulled out of the component design so they have one home
//! instead of being magic numbers scattered through the modules.

/// Cores this kernel is built to schedule across.
pub const MAX_CORES: usize = 8;

/// Soft cap on the inode cache; beyond this, refcount-0 entries are evicted
/// FIFO on the next lookup that needs room.
pub const INODE_CACHE_CAP: usize = 64;

/// Symlink expansion depth at which a path walk gives up with ELOOP.
pub const SYMLINK_MAX_DEPTH: u32 = 6;

/// Size of the process-wide open file descriptor bitmap.
pub const FD_TABLE_BITS: usize = 1024;

/// Minix v3 on-disk magic number.
pub const MINIX_MAGIC: u16 = 0x4D5A;

/// Minix v3 directory entry size in bytes (4-byte LE inode number + 60-byte name).
pub const MINIX_DIRENT_SIZE: usize = 64;
pub const MINIX_NAME_LEN: usize = MINIX_DIRENT_SIZE - 4;

/// Direct zone slots in a Minix v3 disk inode (of 10 total: 7 direct + 3 indirect).
pub const MINIX_DIRECT_ZONES: usize = 7;
