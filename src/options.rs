use lazy_static::lazy_static;

use crate::constants::{
    OpenFlags, DEFAULT_PAGE_SIZE, DEFAULT_PERMS, DEFAULT_START_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::error::{Error, Result};

lazy_static! {
    static ref ACCESS_MODES: OpenFlags =
        OpenFlags::RDONLY | OpenFlags::WRONLY | OpenFlags::RDWR;
    static ref LOCK_MODES: OpenFlags =
        OpenFlags::LOCK_PARTITION | OpenFlags::LOCK_RW | OpenFlags::LOCK_NONE;
}

/// Open-time configuration, validated as a whole before any file is
/// touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Access mode, creation behavior and lock-mode selectors
    pub flags: OpenFlags,
    /// File creation permission bits
    pub perms: u32,
    /// Page size in KB; 0 means the library default (4 KB).
    /// Immutable after the store is created.
    pub page_size: usize,
    /// Initial file size in KB; 0 means the library default (1 MB)
    pub start_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            flags: OpenFlags::RDWR | OpenFlags::CREATE,
            perms: DEFAULT_PERMS,
            page_size: 0,
            start_size: 0,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<()> {
        let access = self.flags & *ACCESS_MODES;
        if access.bits().count_ones() != 1 {
            return Err(Error::Open(format!(
                "exactly one access mode required, got {:?}",
                access
            )));
        }
        if self.flags.contains(OpenFlags::RDONLY)
            && self
                .flags
                .intersects(OpenFlags::TRUNCATE | OpenFlags::CREATE)
        {
            return Err(Error::Open(
                "RDONLY conflicts with CREATE and TRUNCATE".into(),
            ));
        }
        let lock_mode = self.flags & *LOCK_MODES;
        if lock_mode.bits().count_ones() > 1 && !self.flags.contains(OpenFlags::LOCK_ANY) {
            return Err(Error::Open(format!(
                "conflicting lock modes {:?}",
                lock_mode
            )));
        }
        let psize = self.page_size_bytes();
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&psize) || !psize.is_power_of_two() {
            return Err(Error::Open(format!(
                "page size must be a power of two between {} and {} bytes, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, psize
            )));
        }
        Ok(())
    }

    pub(crate) fn page_size_bytes(&self) -> usize {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size * 1024
        }
    }

    pub(crate) fn start_size_bytes(&self) -> usize {
        if self.start_size == 0 {
            DEFAULT_START_SIZE
        } else {
            self.start_size * 1024
        }
    }

    pub(crate) fn readonly(&self) -> bool {
        self.flags.contains(OpenFlags::RDONLY)
    }
}
