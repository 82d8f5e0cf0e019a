use log::debug;

use crate::constants::{PageFlags, DIR_INITIAL_DEPTH, DIR_MAX_DEPTH, PAGE_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::page::PageHdr;
use crate::pager::Pager;

/// Stable FNV-1a 64 over the raw key bytes.
///
/// The hash is part of the file format: changing it would strand every
/// record in existing files, so `HASH_VERSION` in the header guards it.
pub(crate) fn hash_key(key: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in key {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

/// Extendible hash directory: the low `depth` bits of a key hash select a
/// bucket, each bucket entry holds the first page of its chain (0 = empty).
///
/// Persisted in a chain of directory pages and cached here in full; every
/// update writes through to the mapped pages.
pub(crate) struct Directory {
    depth: u32,
    entries: Vec<u64>,
    pages: Vec<u64>,
}

impl Directory {
    fn entries_per_page(pager: &Pager) -> usize {
        (pager.page_size() - PAGE_HEADER_SIZE) / 8
    }

    /// Build the initial directory in a fresh store.
    pub(crate) fn create(pager: &mut Pager) -> Result<Self> {
        let mut dir = Directory {
            depth: DIR_INITIAL_DEPTH,
            entries: vec![0; 1 << DIR_INITIAL_DEPTH],
            pages: Vec::new(),
        };
        dir.persist_all(pager)?;
        pager.set_directory(dir.pages[0], dir.depth);
        Ok(dir)
    }

    /// Read the directory chain of an existing store into memory.
    pub(crate) fn load(pager: &Pager) -> Result<Self> {
        let root = pager.dir_root();
        if root == 0 {
            return Err(Error::Corrupted("missing directory root".into()));
        }
        let depth = pager.dir_depth();
        if depth > DIR_MAX_DEPTH {
            return Err(Error::Corrupted(format!("directory depth {}", depth)));
        }
        let count = 1usize << depth;
        let mut entries = Vec::with_capacity(count);
        let mut pages = Vec::new();
        let mut pgno = root;
        while pgno != 0 && entries.len() < count {
            let page = pager.page(pgno)?;
            let hdr = PageHdr::read(page);
            if !hdr.flags.contains(PageFlags::DIR) {
                return Err(Error::Corrupted(format!(
                    "page {} in directory chain is not a directory page",
                    pgno
                )));
            }
            let payload = &page[PAGE_HEADER_SIZE..];
            let n = hdr.used as usize / 8;
            for i in 0..n {
                entries.push(u64::from_le_bytes(
                    payload[i * 8..i * 8 + 8].try_into().unwrap(),
                ));
            }
            pages.push(pgno);
            pgno = hdr.next;
            if pages.len() > count {
                return Err(Error::Corrupted("directory chain cycle".into()));
            }
        }
        if entries.len() != count {
            return Err(Error::Corrupted(format!(
                "directory holds {} of {} entries",
                entries.len(),
                count
            )));
        }
        Ok(Directory {
            depth,
            entries,
            pages,
        })
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }

    /// Bucket index for a key hash.
    pub(crate) fn bucket(&self, hash: u64) -> usize {
        (hash & ((1u64 << self.depth) - 1)) as usize
    }

    /// First page of the bucket's chain, 0 when the bucket is empty.
    pub(crate) fn get(&self, bucket: usize) -> u64 {
        self.entries[bucket]
    }

    /// All bucket indexes currently mapped to `head`.
    pub(crate) fn buckets_of(&self, head: u64) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, &e)| e == head)
            .map(|(i, _)| i)
            .collect()
    }

    /// Point a bucket at a new chain head, writing through to disk.
    pub(crate) fn set(&mut self, pager: &mut Pager, bucket: usize, head: u64) -> Result<()> {
        self.entries[bucket] = head;
        let epp = Self::entries_per_page(pager);
        let page = self.pages[bucket / epp];
        let off = PAGE_HEADER_SIZE + (bucket % epp) * 8;
        pager.page_mut(page)?[off..off + 8].copy_from_slice(&head.to_le_bytes());
        Ok(())
    }

    /// Double the directory: every new entry mirrors the one at its index
    /// with the new top bit cleared.
    pub(crate) fn double(&mut self, pager: &mut Pager) -> Result<()> {
        if self.depth >= DIR_MAX_DEPTH {
            return Err(Error::Corrupted("directory depth over cap".into()));
        }
        self.entries.extend_from_within(..);
        self.depth += 1;
        self.persist_all(pager)?;
        pager.set_directory(self.pages[0], self.depth);
        debug!(
            "directory doubled to {} bits ({} buckets)",
            self.depth,
            self.entries.len()
        );
        Ok(())
    }

    /// Write the whole directory into its page chain, extending the chain
    /// when the entry array outgrew it.
    fn persist_all(&mut self, pager: &mut Pager) -> Result<()> {
        let epp = Self::entries_per_page(pager);
        let pages_needed = self.entries.len().div_ceil(epp);
        while self.pages.len() < pages_needed {
            let pgno = pager.allocate(PageFlags::DIR)?;
            if let Some(&prev) = self.pages.last() {
                let page = pager.page_mut(prev)?;
                let mut hdr = PageHdr::read(page);
                hdr.next = pgno;
                hdr.write(page);
            }
            self.pages.push(pgno);
        }
        for (idx, chunk) in self.entries.chunks(epp).enumerate() {
            let page = pager.page_mut(self.pages[idx])?;
            let mut hdr = PageHdr::read(page);
            hdr.used = (chunk.len() * 8) as u32;
            hdr.next = if idx + 1 < pages_needed {
                self.pages[idx + 1]
            } else {
                0
            };
            hdr.write(page);
            for (i, &e) in chunk.iter().enumerate() {
                let off = PAGE_HEADER_SIZE + i * 8;
                page[off..off + 8].copy_from_slice(&e.to_le_bytes());
            }
        }
        Ok(())
    }
}
