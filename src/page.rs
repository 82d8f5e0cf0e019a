use crate::constants::{PageFlags, PAGE_HEADER_SIZE};
use crate::error::{Error, Result};

// Record slot flags
pub(crate) const REC_FREE: u8 = 0x00;
pub(crate) const REC_USED: u8 = 0x01;
pub(crate) const REC_SPILLED: u8 = 0x02;

/// Inline record header: flags u8, klen u16, vlen u32
pub(crate) const REC_HDR: usize = 7;
/// Free region marker: flags u8, len u32
pub(crate) const FREE_HDR: usize = 5;
/// Spilled slot: record header plus the overflow page number
pub(crate) const SPILL_SLOT: usize = REC_HDR + 8;

/// Per-page header, first 16 bytes of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageHdr {
    /// Page type flags
    pub(crate) flags: PageFlags,
    /// Hash depth of the bucket; meaningful on chain head pages only
    pub(crate) local_depth: u16,
    /// Payload bytes in use (append bound for data pages)
    pub(crate) used: u32,
    /// Next page in the chain, 0 when none
    pub(crate) next: u64,
}

impl PageHdr {
    pub(crate) fn new(flags: PageFlags) -> Self {
        PageHdr {
            flags,
            local_depth: 0,
            used: 0,
            next: 0,
        }
    }

    pub(crate) fn read(page: &[u8]) -> Self {
        PageHdr {
            flags: PageFlags::from_bits_truncate(u16::from_le_bytes(
                page[0..2].try_into().unwrap(),
            )),
            local_depth: u16::from_le_bytes(page[2..4].try_into().unwrap()),
            used: u32::from_le_bytes(page[4..8].try_into().unwrap()),
            next: u64::from_le_bytes(page[8..16].try_into().unwrap()),
        }
    }

    pub(crate) fn write(&self, page: &mut [u8]) {
        page[0..2].copy_from_slice(&self.flags.bits().to_le_bytes());
        page[2..4].copy_from_slice(&self.local_depth.to_le_bytes());
        page[4..8].copy_from_slice(&self.used.to_le_bytes());
        page[8..16].copy_from_slice(&self.next.to_le_bytes());
    }
}

/// Reset a page to an empty one of the given type.
pub(crate) fn init_page(page: &mut [u8], flags: PageFlags, local_depth: u16) {
    let mut hdr = PageHdr::new(flags);
    hdr.local_depth = local_depth;
    hdr.write(page);
}

/// A decoded record slot within a data page payload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Slot<'a> {
    /// Freed region; `size` is the total region size including the marker
    Free { size: usize },
    /// Record stored entirely in this page
    Inline { key: &'a [u8], value: &'a [u8] },
    /// Record body lives in an overflow chain starting at `pgno`
    Spilled { klen: usize, vlen: usize, pgno: u64 },
}

impl Slot<'_> {
    /// Total bytes the slot occupies in the payload.
    pub(crate) fn size(&self) -> usize {
        match self {
            Slot::Free { size } => *size,
            Slot::Inline { key, value } => REC_HDR + key.len() + value.len(),
            Slot::Spilled { .. } => SPILL_SLOT,
        }
    }
}

/// Decode the slot starting at `off` within the payload.
pub(crate) fn slot_at(payload: &[u8], off: usize) -> Result<Slot<'_>> {
    if off >= payload.len() {
        return Err(Error::Corrupted("slot offset beyond page payload".into()));
    }
    let flags = payload[off];
    if flags == REC_FREE {
        if off + FREE_HDR > payload.len() {
            return Err(Error::Corrupted("truncated free region".into()));
        }
        let len = u32::from_le_bytes(payload[off + 1..off + 5].try_into().unwrap()) as usize;
        let size = FREE_HDR + len;
        if off + size > payload.len() {
            return Err(Error::Corrupted("free region overruns page".into()));
        }
        return Ok(Slot::Free { size });
    }
    if flags & REC_USED == 0 {
        return Err(Error::Corrupted(format!("bad record flags {:#x}", flags)));
    }
    if off + REC_HDR > payload.len() {
        return Err(Error::Corrupted("truncated record header".into()));
    }
    let klen = u16::from_le_bytes(payload[off + 1..off + 3].try_into().unwrap()) as usize;
    let vlen = u32::from_le_bytes(payload[off + 3..off + 7].try_into().unwrap()) as usize;
    if flags & REC_SPILLED != 0 {
        if off + SPILL_SLOT > payload.len() {
            return Err(Error::Corrupted("truncated spill slot".into()));
        }
        let pgno = u64::from_le_bytes(payload[off + 7..off + 15].try_into().unwrap());
        return Ok(Slot::Spilled { klen, vlen, pgno });
    }
    let end = off + REC_HDR + klen + vlen;
    if end > payload.len() {
        return Err(Error::Corrupted("record overruns page".into()));
    }
    Ok(Slot::Inline {
        key: &payload[off + REC_HDR..off + REC_HDR + klen],
        value: &payload[off + REC_HDR + klen..end],
    })
}

/// Walk all slots in a payload, yielding `(offset, slot)` pairs.
pub(crate) struct SlotIter<'a> {
    payload: &'a [u8],
    used: usize,
    off: usize,
}

impl<'a> SlotIter<'a> {
    pub(crate) fn new(payload: &'a [u8], used: usize) -> Self {
        SlotIter {
            payload,
            used,
            off: 0,
        }
    }
}

impl<'a> Iterator for SlotIter<'a> {
    type Item = Result<(usize, Slot<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.off >= self.used {
            return None;
        }
        match slot_at(self.payload, self.off) {
            Ok(slot) => {
                let off = self.off;
                self.off += slot.size();
                Some(Ok((off, slot)))
            }
            Err(e) => {
                // Stop after a decode failure
                self.off = self.used;
                Some(Err(e))
            }
        }
    }
}

fn write_rec_hdr(payload: &mut [u8], off: usize, flags: u8, klen: usize, vlen: usize) {
    payload[off] = flags;
    payload[off + 1..off + 3].copy_from_slice(&(klen as u16).to_le_bytes());
    payload[off + 3..off + 7].copy_from_slice(&(vlen as u32).to_le_bytes());
}

fn write_free(payload: &mut [u8], off: usize, size: usize) {
    payload[off] = REC_FREE;
    payload[off + 1..off + 5].copy_from_slice(&((size - FREE_HDR) as u32).to_le_bytes());
}

/// Find space for a slot of `size` bytes: first fit over freed regions,
/// then the append bound. Returns the write offset, or None if the page
/// has no room. A reused free region keeps a trailing free marker unless
/// the remainder is too small to hold one.
fn find_space(page: &[u8], size: usize) -> Result<Option<(usize, usize)>> {
    let hdr = PageHdr::read(page);
    let payload = &page[PAGE_HEADER_SIZE..];
    for item in SlotIter::new(payload, hdr.used as usize) {
        let (off, slot) = item?;
        if let Slot::Free { size: region } = slot {
            if region == size || region >= size + FREE_HDR {
                return Ok(Some((off, region)));
            }
        }
    }
    if hdr.used as usize + size <= payload.len() {
        return Ok(Some((hdr.used as usize, 0)));
    }
    Ok(None)
}

fn place(page: &mut [u8], off: usize, region: usize, size: usize) {
    let mut hdr = PageHdr::read(page);
    if region == 0 {
        hdr.used += size as u32;
        hdr.write(page);
    } else if region > size {
        let payload = &mut page[PAGE_HEADER_SIZE..];
        write_free(payload, off + size, region - size);
    }
}

/// Insert a record stored entirely in this page. Returns false when the
/// page has no room for it.
pub(crate) fn insert_inline(page: &mut [u8], key: &[u8], value: &[u8]) -> Result<bool> {
    let size = REC_HDR + key.len() + value.len();
    let Some((off, region)) = find_space(page, size)? else {
        return Ok(false);
    };
    place(page, off, region, size);
    let payload = &mut page[PAGE_HEADER_SIZE..];
    write_rec_hdr(payload, off, REC_USED, key.len(), value.len());
    payload[off + REC_HDR..off + REC_HDR + key.len()].copy_from_slice(key);
    payload[off + REC_HDR + key.len()..off + size].copy_from_slice(value);
    Ok(true)
}

/// Insert a spill slot pointing at an overflow chain. Returns false when
/// the page has no room for it.
pub(crate) fn insert_spill(
    page: &mut [u8],
    klen: usize,
    vlen: usize,
    pgno: u64,
) -> Result<bool> {
    let Some((off, region)) = find_space(page, SPILL_SLOT)? else {
        return Ok(false);
    };
    place(page, off, region, SPILL_SLOT);
    let payload = &mut page[PAGE_HEADER_SIZE..];
    write_rec_hdr(payload, off, REC_USED | REC_SPILLED, klen, vlen);
    payload[off + 7..off + 15].copy_from_slice(&pgno.to_le_bytes());
    Ok(true)
}

/// Free the slot at `off`, then coalesce adjacent free regions and give
/// back trailing free space to the append bound.
pub(crate) fn remove_at(page: &mut [u8], off: usize) -> Result<()> {
    let mut hdr = PageHdr::read(page);
    let used = hdr.used as usize;
    {
        let payload = &mut page[PAGE_HEADER_SIZE..];
        let size = slot_at(payload, off)?.size();
        write_free(payload, off, size);
    }

    // Merge runs of free regions in one pass.
    let mut pos = 0usize;
    let mut tail_free: Option<usize> = None;
    while pos < used {
        let slot = slot_at(&page[PAGE_HEADER_SIZE..], pos)?;
        let size = slot.size();
        if matches!(slot, Slot::Free { .. }) {
            let mut run = size;
            while pos + run < used {
                match slot_at(&page[PAGE_HEADER_SIZE..], pos + run)? {
                    Slot::Free { size: s } => run += s,
                    _ => break,
                }
            }
            if run != size {
                write_free(&mut page[PAGE_HEADER_SIZE..], pos, run);
            }
            tail_free = Some(pos);
            pos += run;
        } else {
            tail_free = None;
            pos += size;
        }
    }

    // A free region ending at the append bound is returned to it.
    if let Some(start) = tail_free {
        hdr.used = start as u32;
        hdr.write(page);
    }
    Ok(())
}

/// Overwrite the inline value at `off` when the new value fits in place.
/// Returns false if it does not fit; the caller then relocates the record.
pub(crate) fn replace_inline_at(page: &mut [u8], off: usize, new_value: &[u8]) -> Result<bool> {
    let (klen, vlen) = {
        let payload = &page[PAGE_HEADER_SIZE..];
        match slot_at(payload, off)? {
            Slot::Inline { key, value } => (key.len(), value.len()),
            _ => return Ok(false),
        }
    };
    let spare = vlen.checked_sub(new_value.len());
    let fits = match spare {
        Some(0) => true,
        Some(s) => s >= FREE_HDR,
        None => false,
    };
    if !fits {
        return Ok(false);
    }
    let payload = &mut page[PAGE_HEADER_SIZE..];
    write_rec_hdr(payload, off, REC_USED, klen, new_value.len());
    let vstart = off + REC_HDR + klen;
    payload[vstart..vstart + new_value.len()].copy_from_slice(new_value);
    if let Some(s) = spare {
        if s > 0 {
            write_free(payload, vstart + new_value.len(), s);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PageFlags;

    fn blank_page() -> Vec<u8> {
        let mut page = vec![0u8; 512];
        init_page(&mut page, PageFlags::DATA, 0);
        page
    }

    fn slots(page: &[u8]) -> Vec<(usize, String)> {
        let hdr = PageHdr::read(page);
        SlotIter::new(&page[PAGE_HEADER_SIZE..], hdr.used as usize)
            .map(|r| {
                let (off, slot) = r.unwrap();
                let tag = match slot {
                    Slot::Free { .. } => "free".to_string(),
                    Slot::Inline { key, .. } => format!("inline:{}", String::from_utf8_lossy(key)),
                    Slot::Spilled { .. } => "spilled".to_string(),
                };
                (off, tag)
            })
            .collect()
    }

    #[test]
    fn insert_and_walk() {
        let mut page = blank_page();
        assert!(insert_inline(&mut page, b"alpha", b"1").unwrap());
        assert!(insert_inline(&mut page, b"beta", b"2").unwrap());
        let found = slots(&page);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, "inline:alpha");
        assert_eq!(found[1].1, "inline:beta");
    }

    #[test]
    fn page_full_refuses() {
        let mut page = blank_page();
        let value = vec![0u8; 200];
        assert!(insert_inline(&mut page, b"a", &value).unwrap());
        assert!(insert_inline(&mut page, b"b", &value).unwrap());
        assert!(!insert_inline(&mut page, b"c", &value).unwrap());
    }

    #[test]
    fn remove_coalesces_and_reclaims_tail() {
        let mut page = blank_page();
        assert!(insert_inline(&mut page, b"a", b"11").unwrap());
        assert!(insert_inline(&mut page, b"b", b"22").unwrap());
        assert!(insert_inline(&mut page, b"c", b"33").unwrap());
        let all = slots(&page);

        // Free the middle, then the tail: the two regions coalesce and the
        // append bound moves back to the end of "a".
        remove_at(&mut page, all[1].0).unwrap();
        remove_at(&mut page, all[2].0).unwrap();
        let hdr = PageHdr::read(&page);
        assert_eq!(hdr.used as usize, all[1].0);
        assert_eq!(slots(&page).len(), 1);
    }

    #[test]
    fn freed_space_is_reused() {
        let mut page = blank_page();
        assert!(insert_inline(&mut page, b"a", b"aaaaaaaa").unwrap());
        assert!(insert_inline(&mut page, b"b", b"b").unwrap());
        let all = slots(&page);
        remove_at(&mut page, all[0].0).unwrap();

        // Same-size record lands in the freed region.
        assert!(insert_inline(&mut page, b"z", b"zzzzzzzz").unwrap());
        let found = slots(&page);
        assert_eq!(found[0].1, "inline:z");
        assert_eq!(found[0].0, all[0].0);
    }

    #[test]
    fn replace_in_place_shrinks() {
        let mut page = blank_page();
        assert!(insert_inline(&mut page, b"key", b"0123456789").unwrap());
        assert!(replace_inline_at(&mut page, 0, b"01234").unwrap());
        match slot_at(&page[PAGE_HEADER_SIZE..], 0).unwrap() {
            Slot::Inline { key, value } => {
                assert_eq!(key, b"key");
                assert_eq!(value, b"01234");
            }
            other => panic!("unexpected slot {:?}", other),
        }
        // A 1-byte shrink cannot host a free marker and must relocate.
        assert!(!replace_inline_at(&mut page, 0, b"0123").unwrap());
    }

    #[test]
    fn oversized_used_bound_is_corruption() {
        // A damaged page header claiming more payload than the page holds
        // must surface as corruption, not a panic.
        let mut page = blank_page();
        assert!(insert_inline(&mut page, b"k", b"v").unwrap());
        let mut hdr = PageHdr::read(&page);
        hdr.used = 10_000;
        hdr.write(&mut page);

        let last = SlotIter::new(&page[PAGE_HEADER_SIZE..], hdr.used as usize)
            .last()
            .unwrap();
        assert!(matches!(last, Err(Error::Corrupted(_))));
        assert!(matches!(
            find_space(&page, 8),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn spill_slot_round_trip() {
        let mut page = blank_page();
        assert!(insert_spill(&mut page, 3, 100_000, 7).unwrap());
        match slot_at(&page[PAGE_HEADER_SIZE..], 0).unwrap() {
            Slot::Spilled { klen, vlen, pgno } => {
                assert_eq!((klen, vlen, pgno), (3, 100_000, 7));
            }
            other => panic!("unexpected slot {:?}", other),
        }
    }
}
