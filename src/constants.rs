use bitflags::bitflags;

// Open flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Read-write access
        const RDWR = 0x01;
        /// Write-only access
        const WRONLY = 0x02;
        /// Read-only access
        const RDONLY = 0x04;
        /// Truncate the file on open
        const TRUNCATE = 0x08;
        /// Create the file if it does not exist
        const CREATE = 0x10;
        /// Asynchronous writes (no sync on put)
        const ASYNC = 0x20;
        /// Sync the file on close
        const FSYNC = 0x40;
        /// Perform direct I/O
        const DIRECT = 0x80;

        /// Open even if existing lock mode does not match
        const LOCK_ANY = 0x100;
        /// Partitioned locks
        const LOCK_PARTITION = 0x200;
        /// Read-write locks
        const LOCK_RW = 0x400;
        /// No locking during open
        const LOCK_NONE = 0x800;
    }
}

// Page flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u16 {
        /// Holds record slots
        const DATA = 0x01;
        /// Holds spilled record bytes
        const OVERFLOW = 0x02;
        /// Holds directory entries
        const DIR = 0x04;
        /// On the free list
        const FREE = 0x08;
    }
}

/// Magic number identifying rdbm files ("RDBM")
pub const MAGIC: u32 = 0x5244_424D;
/// On-disk format version
pub const FORMAT_VERSION: u32 = 1;
/// Hash function version; the hash is part of the file format
pub const HASH_VERSION: u32 = 1;

/// Default page size in bytes when `Options.page_size` is 0
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Smallest accepted page size in bytes
pub const MIN_PAGE_SIZE: usize = 128;
/// Largest accepted page size in bytes
pub const MAX_PAGE_SIZE: usize = 1 << 20;
/// Default initial file size in bytes when `Options.start_size` is 0
pub const DEFAULT_START_SIZE: usize = 1 << 20;
/// Default file creation permissions
pub const DEFAULT_PERMS: u32 = 0o666;

/// Size of the per-page header in bytes
pub const PAGE_HEADER_SIZE: usize = 16;

/// Initial directory depth in bits (16 buckets)
pub const DIR_INITIAL_DEPTH: u32 = 4;
/// Directory depth cap; past this, bucket chains grow instead of splitting
pub const DIR_MAX_DEPTH: u32 = 20;
/// Chain length (in pages) that triggers a bucket split
pub const SPLIT_THRESHOLD: usize = 4;

/// Number of key-derived lock partitions
pub const NUM_PARTITIONS: usize = 64;

/// O_DIRECT on Linux, passed through custom open flags
#[cfg(target_os = "linux")]
pub const O_DIRECT: i32 = 0x4000;
