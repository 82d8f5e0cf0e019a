use std::fs::File;

use log::trace;
use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::constants::PageFlags;
use crate::error::{Error, Result};
use crate::meta::{Header, HEADER_SIZE};
use crate::page::{init_page, PageHdr};

enum MapKind {
    Ro(Mmap),
    Rw(MmapMut),
}

impl MapKind {
    fn as_slice(&self) -> &[u8] {
        match self {
            MapKind::Ro(m) => m,
            MapKind::Rw(m) => m,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// Fixed-size page store over one memory-mapped file.
///
/// Page 0 holds the header. Freed pages chain through their `next` field
/// from the header free list and are handed out again before the file
/// grows.
pub(crate) struct Pager {
    file: File,
    map: MapKind,
    header: Header,
    readonly: bool,
}

impl Pager {
    /// Initialize a fresh store file: header page plus preallocated space.
    pub(crate) fn create(file: File, page_size: usize, start_size: usize) -> Result<Self> {
        let len = start_size.max(page_size) as u64;
        file.set_len(len)?;
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        let mut pager = Pager {
            file,
            map: MapKind::Rw(map),
            header: Header::new(page_size),
            readonly: false,
        };
        pager.write_header();
        Ok(pager)
    }

    /// Map an existing store file and validate its header.
    pub(crate) fn open(file: File, readonly: bool) -> Result<Self> {
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(Error::Invalid);
        }
        let map = if readonly {
            MapKind::Ro(unsafe { MmapOptions::new().map(&file)? })
        } else {
            MapKind::Rw(unsafe { MmapOptions::new().map_mut(&file)? })
        };
        let header = Header::decode(&map.as_slice()[..HEADER_SIZE])?;
        if header.num_pages as usize * header.page_size as usize > len {
            return Err(Error::Corrupted(format!(
                "header claims {} pages but file holds {} bytes",
                header.num_pages, len
            )));
        }
        Ok(Pager {
            file,
            map,
            header,
            readonly,
        })
    }

    pub(crate) fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    pub(crate) fn num_pages(&self) -> u64 {
        self.header.num_pages
    }

    pub(crate) fn dir_root(&self) -> u64 {
        self.header.dir_root
    }

    pub(crate) fn dir_depth(&self) -> u32 {
        self.header.dir_depth
    }

    pub(crate) fn set_directory(&mut self, root: u64, depth: u32) {
        self.header.dir_root = root;
        self.header.dir_depth = depth;
        self.write_header();
    }

    fn write_header(&mut self) {
        let mut buf = [0u8; HEADER_SIZE];
        self.header.encode(&mut buf);
        match &mut self.map {
            MapKind::Rw(m) => m[..HEADER_SIZE].copy_from_slice(&buf),
            MapKind::Ro(_) => unreachable!("header writes on a read-only map"),
        }
    }

    fn bounds(&self, pgno: u64) -> Result<(usize, usize)> {
        if pgno == 0 || pgno >= self.header.num_pages {
            return Err(Error::Corrupted(format!(
                "page {} outside extent of {} pages",
                pgno, self.header.num_pages
            )));
        }
        let psize = self.page_size();
        let start = pgno as usize * psize;
        Ok((start, start + psize))
    }

    pub(crate) fn page(&self, pgno: u64) -> Result<&[u8]> {
        let (start, end) = self.bounds(pgno)?;
        Ok(&self.map.as_slice()[start..end])
    }

    pub(crate) fn page_mut(&mut self, pgno: u64) -> Result<&mut [u8]> {
        let (start, end) = self.bounds(pgno)?;
        match &mut self.map {
            MapKind::Rw(m) => Ok(&mut m[start..end]),
            MapKind::Ro(_) => Err(Error::ReadOnly),
        }
    }

    /// Hand out a page: pop the free list first, grow the file otherwise.
    /// The page comes back initialized to the requested type.
    pub(crate) fn allocate(&mut self, flags: PageFlags) -> Result<u64> {
        let pgno = if self.header.free_list != 0 {
            let pgno = self.header.free_list;
            let hdr = PageHdr::read(self.page(pgno)?);
            self.header.free_list = hdr.next;
            pgno
        } else {
            let pgno = self.header.num_pages;
            let needed = (pgno + 1) as usize * self.page_size();
            if needed > self.map.len() {
                self.grow(needed)?;
            }
            self.header.num_pages += 1;
            pgno
        };
        self.write_header();
        init_page(self.page_mut(pgno)?, flags, 0);
        trace!("allocated page {} ({:?})", pgno, flags);
        Ok(pgno)
    }

    /// Return a page to the free list.
    pub(crate) fn free_page(&mut self, pgno: u64) -> Result<()> {
        let mut hdr = PageHdr::new(PageFlags::FREE);
        hdr.next = self.header.free_list;
        hdr.write(self.page_mut(pgno)?);
        self.header.free_list = pgno;
        self.write_header();
        trace!("freed page {}", pgno);
        Ok(())
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        let new_len = needed.max(self.map.len() * 2) as u64;
        self.file.set_len(new_len)?;
        let map = unsafe { MmapOptions::new().map_mut(&self.file)? };
        self.map = MapKind::Rw(map);
        trace!("grew store file to {} bytes", new_len);
        Ok(())
    }

    /// Flush the mapping; with `force`, also fsync the file.
    pub(crate) fn flush(&self, force: bool) -> Result<()> {
        if self.readonly {
            return Ok(());
        }
        if let MapKind::Rw(m) = &self.map {
            m.flush()?;
        }
        if force {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn temp_pager(dir: &TempDir) -> Pager {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join("pager.db"))
            .unwrap();
        Pager::create(file, 256, 1024).unwrap()
    }

    #[test]
    fn allocate_grows_and_reuses() {
        let dir = TempDir::new().unwrap();
        let mut pager = temp_pager(&dir);

        let a = pager.allocate(PageFlags::DATA).unwrap();
        let b = pager.allocate(PageFlags::DATA).unwrap();
        assert_eq!((a, b), (1, 2));

        pager.free_page(a).unwrap();
        assert_eq!(pager.allocate(PageFlags::OVERFLOW).unwrap(), a);
        assert_eq!(pager.allocate(PageFlags::DATA).unwrap(), 3);
    }

    #[test]
    fn out_of_extent_is_corruption() {
        let dir = TempDir::new().unwrap();
        let pager = temp_pager(&dir);
        assert!(matches!(pager.page(99), Err(Error::Corrupted(_))));
        assert!(matches!(pager.page(0), Err(Error::Corrupted(_))));
    }

    #[test]
    fn reopen_sees_header_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pager.db");
        {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .unwrap();
            let mut pager = Pager::create(file, 256, 1024).unwrap();
            pager.allocate(PageFlags::DATA).unwrap();
            pager.set_directory(1, 4);
            pager.flush(true).unwrap();
        }
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let pager = Pager::open(file, false).unwrap();
        assert_eq!(pager.num_pages(), 2);
        assert_eq!(pager.dir_root(), 1);
        assert_eq!(pager.dir_depth(), 4);
    }
}
