use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};

use crate::constants::{
    OpenFlags, PageFlags, DIR_MAX_DEPTH, PAGE_HEADER_SIZE, SPLIT_THRESHOLD,
};
use crate::directory::{hash_key, Directory};
use crate::error::{Error, Result};
use crate::lock::LockCoordinator;
use crate::options::Options;
use crate::page::{self, PageHdr, Slot, SlotIter, REC_HDR};
use crate::pager::Pager;

/// Forward iteration cursor: next page to visit and the payload offset of
/// the next slot within it.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    pgno: u64,
    off: usize,
}

impl Cursor {
    fn start() -> Self {
        Cursor { pgno: 1, off: 0 }
    }
}

/// Per-handle mutable state, guarded by the handle's own mutex.
struct HandleState {
    closed: bool,
    has_lock: bool,
    cursor: Cursor,
    entry: Option<(Vec<u8>, Vec<u8>)>,
}

/// Pager plus directory; every page read or write goes through here.
struct Core {
    pager: Pager,
    dir: Directory,
}

/// State shared by a handle and all its duplicates.
struct Shared {
    core: RwLock<Core>,
    locks: LockCoordinator,
    poisoned: AtomicBool,
    readonly: bool,
}

/// A handle to an open store.
///
/// All operations are safe to call from multiple threads. Duplicated
/// handles (see [`Store::dup`]) share the underlying page store and lock
/// coordinator but keep their own iteration cursor and lock-held flag.
pub struct Store {
    shared: Arc<Shared>,
    state: Mutex<HandleState>,
    options: Options,
}

impl Store {
    /// Open an existing store or create a new one.
    ///
    /// Fails with [`Error::Open`] on bad paths, permissions or conflicting
    /// options, with [`Error::Invalid`] or [`Error::VersionMismatch`] when
    /// the file is not a compatible store file.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Store> {
        let path = path.as_ref();
        options.validate()?;
        let flags = options.flags;

        let mut oo = OpenOptions::new();
        oo.read(true).write(!options.readonly());
        if flags.contains(OpenFlags::CREATE) {
            oo.create(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            oo.mode(options.perms);
            #[cfg(target_os = "linux")]
            if flags.contains(OpenFlags::DIRECT) {
                oo.custom_flags(crate::constants::O_DIRECT);
            }
        }
        let file = oo
            .open(path)
            .map_err(|e| Error::Open(format!("{}: {}", path.display(), e)))?;

        let mut len = file.metadata()?.len();
        if flags.contains(OpenFlags::TRUNCATE) && len > 0 {
            file.set_len(0)?;
            len = 0;
        }

        let core = if len == 0 {
            if options.readonly() {
                return Err(Error::Invalid);
            }
            let mut pager =
                Pager::create(file, options.page_size_bytes(), options.start_size_bytes())?;
            let dir = Directory::create(&mut pager)?;
            info!(
                "created store {} (page size {}, {} buckets)",
                path.display(),
                pager.page_size(),
                1u64 << dir.depth()
            );
            Core { pager, dir }
        } else {
            let pager = Pager::open(file, options.readonly())?;
            if options.page_size != 0 && pager.page_size() != options.page_size_bytes() {
                return Err(Error::Open(format!(
                    "page size {} requested but store was created with {}",
                    options.page_size_bytes(),
                    pager.page_size()
                )));
            }
            let dir = Directory::load(&pager)?;
            debug!(
                "opened store {} ({} pages, {} bit directory)",
                path.display(),
                pager.num_pages(),
                dir.depth()
            );
            Core { pager, dir }
        };

        Ok(Store {
            shared: Arc::new(Shared {
                core: RwLock::new(core),
                locks: LockCoordinator::new(),
                poisoned: AtomicBool::new(false),
                readonly: options.readonly(),
            }),
            state: Mutex::new(HandleState {
                closed: false,
                has_lock: false,
                cursor: Cursor::start(),
                entry: None,
            }),
            options,
        })
    }

    /// Duplicate this handle. The duplicate shares the underlying store
    /// but gets its own iteration cursor and lock-held flag.
    pub fn dup(&self) -> Result<Store> {
        let state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(Store {
            shared: Arc::clone(&self.shared),
            state: Mutex::new(HandleState {
                closed: false,
                has_lock: false,
                cursor: Cursor::start(),
                entry: None,
            }),
            options: self.options,
        })
    }

    /// Fetch the value stored under `key`.
    ///
    /// Takes the key's partition lock for the duration of the call, so
    /// reads on unrelated key ranges proceed concurrently.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.begin()?;
        check_key(key)?;
        let hash = hash_key(key);
        let partition = LockCoordinator::partition_of(hash);
        self.shared.locks.lock_partition(partition);
        let result = self.read_core().get(key, hash);
        self.shared.locks.unlock_partition(partition);
        self.note_corruption(result)
    }

    /// Store `value` under `key`, replacing any existing value.
    ///
    /// Takes the store-wide exclusive lock for the duration of the call.
    /// If this handle holds the exclusive lock from an abandoned iteration
    /// this call blocks until [`Store::unlock`] is called.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.begin()?;
        check_key(key)?;
        check_value_len(value.len() as u64)?;
        if self.shared.readonly {
            return Err(Error::ReadOnly);
        }
        let hash = hash_key(key);
        self.shared.locks.lock_exclusive();
        let result = self.write_core().put(key, value, hash);
        self.shared.locks.unlock_exclusive();
        self.note_corruption(result)
    }

    /// Delete the entry stored under `key`. Deleting an absent key fails
    /// with [`Error::NotFound`].
    ///
    /// Takes the store-wide exclusive lock for the duration of the call.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.begin()?;
        check_key(key)?;
        if self.shared.readonly {
            return Err(Error::ReadOnly);
        }
        let hash = hash_key(key);
        self.shared.locks.lock_exclusive();
        let result = self.write_core().delete(key, hash);
        self.shared.locks.unlock_exclusive();
        self.note_corruption(result)
    }

    /// Acquire the store-wide exclusive lock. Locking twice without an
    /// intervening unlock is a no-op.
    pub fn lock(&self) -> Result<()> {
        let mut state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        if !state.has_lock {
            self.shared.locks.lock_exclusive();
            state.has_lock = true;
        }
        Ok(())
    }

    /// Release the exclusive lock held by this handle. Unlocking without
    /// holding the lock is a no-op.
    pub fn unlock(&self) -> Result<()> {
        let mut state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        if state.has_lock {
            self.shared.locks.unlock_exclusive();
            state.has_lock = false;
        }
        Ok(())
    }

    /// Advance the iterator. Returns `true` when a record was fetched and
    /// can be read with [`Store::entry`], `false` when the pass is done.
    ///
    /// The first call acquires the store-wide exclusive lock and holds it
    /// across calls; exhausting the sequence releases it automatically.
    /// A caller breaking out of an iteration early MUST call
    /// [`Store::unlock`], or the store stays locked for the life of the
    /// handle.
    pub fn fetch(&self) -> Result<bool> {
        let mut state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        if self.shared.poisoned.load(Ordering::SeqCst) {
            return Err(Error::Corrupted("store poisoned by earlier error".into()));
        }
        if !state.has_lock {
            self.shared.locks.lock_exclusive();
            state.has_lock = true;
        }
        let mut cursor = state.cursor;
        let result = self.read_core().next_record(&mut cursor);
        match self.note_corruption(result)? {
            Some((key, value)) => {
                state.cursor = cursor;
                state.entry = Some((key, value));
                Ok(true)
            }
            None => {
                state.cursor = cursor;
                self.shared.locks.unlock_exclusive();
                state.has_lock = false;
                Ok(false)
            }
        }
    }

    /// The most recently fetched key-value pair.
    pub fn entry(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        state.entry.clone().ok_or(Error::NoCurrentEntry)
    }

    /// Reset the iterator to the beginning. Lock state is not affected.
    pub fn restart(&self) -> Result<()> {
        let mut state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        state.cursor = Cursor::start();
        state.entry = None;
        Ok(())
    }

    /// Flush buffered writes to the underlying file. With `force`, fsync.
    pub fn sync(&self, force: bool) -> Result<()> {
        self.begin()?;
        if self.shared.readonly {
            return Err(Error::ReadOnly);
        }
        self.read_core().pager.flush(force)
    }

    /// Flush and close the handle. Any later operation on it fails with
    /// [`Error::Closed`]; the underlying store is released when the last
    /// duplicate is gone.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state_guard();
        if state.closed {
            return Ok(());
        }
        if state.has_lock {
            self.shared.locks.unlock_exclusive();
            state.has_lock = false;
        }
        if !self.shared.readonly {
            let force = self.options.flags.contains(OpenFlags::FSYNC);
            self.read_core().pager.flush(force)?;
        }
        state.closed = true;
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        let state = self.state_guard();
        if state.closed {
            return Err(Error::Closed);
        }
        drop(state);
        if self.shared.poisoned.load(Ordering::SeqCst) {
            return Err(Error::Corrupted("store poisoned by earlier error".into()));
        }
        Ok(())
    }

    /// Corruption is fatal to the store: remember it so later calls fail
    /// fast instead of walking damaged pages again.
    fn note_corruption<T>(&self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::Corrupted(_))) {
            self.shared.poisoned.store(true, Ordering::SeqCst);
        }
        result
    }

    fn state_guard(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_core(&self) -> RwLockReadGuard<'_, Core> {
        self.shared.core.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_core(&self) -> RwLockWriteGuard<'_, Core> {
        self.shared.core.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > u16::MAX as usize {
        return Err(Error::BadKeySize);
    }
    Ok(())
}

// Record headers store the value length as a u32; anything longer would
// wrap the stored length and read back truncated.
fn check_value_len(len: u64) -> Result<()> {
    if len > u32::MAX as u64 {
        return Err(Error::BadValSize);
    }
    Ok(())
}

/// Where a key was found within its bucket chain.
enum Found {
    Inline { pgno: u64, off: usize },
    Spilled { pgno: u64, off: usize, chain: u64 },
}

/// How a record body is handed to the chain insert path.
enum Body<'a> {
    Inline(&'a [u8]),
    Spill { vlen: usize, chain: u64 },
}

impl Core {
    fn payload_cap(&self) -> usize {
        self.pager.page_size() - PAGE_HEADER_SIZE
    }

    fn get(&self, key: &[u8], hash: u64) -> Result<Vec<u8>> {
        let head = self.dir.get(self.dir.bucket(hash));
        if head == 0 {
            return Err(Error::NotFound);
        }
        match self.find_in_chain(head, key)? {
            None => Err(Error::NotFound),
            Some(Found::Inline { pgno, off }) => {
                let page = self.pager.page(pgno)?;
                match page::slot_at(&page[PAGE_HEADER_SIZE..], off)? {
                    Slot::Inline { value, .. } => Ok(value.to_vec()),
                    _ => Err(Error::Corrupted("slot changed type".into())),
                }
            }
            Some(Found::Spilled { pgno, off, chain }) => {
                let page = self.pager.page(pgno)?;
                match page::slot_at(&page[PAGE_HEADER_SIZE..], off)? {
                    Slot::Spilled { klen, vlen, .. } => {
                        let body = self.read_spill(chain, klen + vlen)?;
                        Ok(body[klen..].to_vec())
                    }
                    _ => Err(Error::Corrupted("slot changed type".into())),
                }
            }
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8], hash: u64) -> Result<()> {
        let bucket = self.dir.bucket(hash);
        let mut head = self.dir.get(bucket);
        if head == 0 {
            // A fresh bucket is referenced by exactly one directory entry,
            // so its local depth starts at the global depth.
            head = self.alloc_head(self.dir.depth() as u16)?;
            self.dir.set(&mut self.pager, bucket, head)?;
        }

        // Replace semantics: an existing record is overwritten in place
        // when the new value fits, relocated otherwise.
        match self.find_in_chain(head, key)? {
            Some(Found::Inline { pgno, off }) => {
                let fits_inline = REC_HDR + key.len() + value.len() <= self.payload_cap();
                if fits_inline {
                    let page = self.pager.page_mut(pgno)?;
                    if page::replace_inline_at(page, off, value)? {
                        return Ok(());
                    }
                }
                let page = self.pager.page_mut(pgno)?;
                page::remove_at(page, off)?;
            }
            Some(Found::Spilled { pgno, off, chain }) => {
                let page = self.pager.page_mut(pgno)?;
                page::remove_at(page, off)?;
                self.free_spill(chain)?;
            }
            None => {}
        }

        self.insert(head, key, value)?;
        self.maybe_split(bucket)
    }

    fn delete(&mut self, key: &[u8], hash: u64) -> Result<()> {
        let head = self.dir.get(self.dir.bucket(hash));
        if head == 0 {
            return Err(Error::NotFound);
        }
        match self.find_in_chain(head, key)? {
            None => Err(Error::NotFound),
            Some(Found::Inline { pgno, off }) => {
                page::remove_at(self.pager.page_mut(pgno)?, off)
            }
            Some(Found::Spilled { pgno, off, chain }) => {
                page::remove_at(self.pager.page_mut(pgno)?, off)?;
                self.free_spill(chain)
            }
        }
    }

    /// Walk a bucket chain looking for `key`. Spilled records are matched
    /// by reading back the key prefix of their overflow chain.
    fn find_in_chain(&self, head: u64, key: &[u8]) -> Result<Option<Found>> {
        for pgno in self.chain_pages(head)? {
            let page = self.pager.page(pgno)?;
            let hdr = PageHdr::read(page);
            let mut spilled = Vec::new();
            for item in SlotIter::new(&page[PAGE_HEADER_SIZE..], hdr.used as usize) {
                let (off, slot) = item?;
                match slot {
                    Slot::Inline { key: k, .. } if k == key => {
                        return Ok(Some(Found::Inline { pgno, off }));
                    }
                    Slot::Spilled { klen, pgno: chain, .. } if klen == key.len() => {
                        spilled.push((off, chain));
                    }
                    _ => {}
                }
            }
            for (off, chain) in spilled {
                if self.read_spill(chain, key.len())? == key {
                    return Ok(Some(Found::Spilled { pgno, off, chain }));
                }
            }
        }
        Ok(None)
    }

    /// Insert a new record into the bucket chain, spilling the body to
    /// overflow pages when it cannot fit in a single page.
    fn insert(&mut self, head: u64, key: &[u8], value: &[u8]) -> Result<()> {
        if REC_HDR + key.len() + value.len() > self.payload_cap() {
            let chain = self.write_spill(key, value)?;
            self.chain_insert(head, key, Body::Spill {
                vlen: value.len(),
                chain,
            })
        } else {
            self.chain_insert(head, key, Body::Inline(value))
        }
    }

    /// First-fit across the chain's pages, appending a new page at the
    /// tail when none has room.
    fn chain_insert(&mut self, head: u64, key: &[u8], body: Body<'_>) -> Result<()> {
        let pages = self.chain_pages(head)?;
        for &pgno in &pages {
            if self.try_insert_at(pgno, key, &body)? {
                return Ok(());
            }
        }
        let new_page = self.pager.allocate(PageFlags::DATA)?;
        let tail = *pages.last().expect("chain has at least its head");
        let page = self.pager.page_mut(tail)?;
        let mut hdr = PageHdr::read(page);
        hdr.next = new_page;
        hdr.write(page);
        if !self.try_insert_at(new_page, key, &body)? {
            return Err(Error::Corrupted("record does not fit an empty page".into()));
        }
        Ok(())
    }

    fn try_insert_at(&mut self, pgno: u64, key: &[u8], body: &Body<'_>) -> Result<bool> {
        let page = self.pager.page_mut(pgno)?;
        match body {
            Body::Inline(value) => page::insert_inline(page, key, value),
            Body::Spill { vlen, chain } => {
                page::insert_spill(page, key.len(), *vlen, *chain)
            }
        }
    }

    /// Collect the page numbers of a bucket chain, guarding against
    /// cycles.
    fn chain_pages(&self, head: u64) -> Result<Vec<u64>> {
        let mut pages = Vec::new();
        let mut pgno = head;
        while pgno != 0 {
            let page = self.pager.page(pgno)?;
            let hdr = PageHdr::read(page);
            if !hdr.flags.contains(PageFlags::DATA) {
                return Err(Error::Corrupted(format!(
                    "page {} in bucket chain is not a data page",
                    pgno
                )));
            }
            pages.push(pgno);
            if pages.len() as u64 > self.pager.num_pages() {
                return Err(Error::Corrupted("bucket chain cycle".into()));
            }
            pgno = hdr.next;
        }
        Ok(pages)
    }

    /// Write `key || value` into a fresh chain of overflow pages and
    /// return its first page number.
    fn write_spill(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
        let cap = self.payload_cap();
        let bytes: Vec<u8> = key.iter().chain(value.iter()).copied().collect();
        let mut first = 0u64;
        let mut prev = 0u64;
        for chunk in bytes.chunks(cap) {
            let pgno = self.pager.allocate(PageFlags::OVERFLOW)?;
            let page = self.pager.page_mut(pgno)?;
            let mut hdr = PageHdr::read(page);
            hdr.used = chunk.len() as u32;
            hdr.write(page);
            page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);
            if prev != 0 {
                let prev_page = self.pager.page_mut(prev)?;
                let mut prev_hdr = PageHdr::read(prev_page);
                prev_hdr.next = pgno;
                prev_hdr.write(prev_page);
            } else {
                first = pgno;
            }
            prev = pgno;
        }
        Ok(first)
    }

    /// Read the first `len` bytes of an overflow chain.
    fn read_spill(&self, chain: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut pgno = chain;
        let mut hops = 0u64;
        while pgno != 0 && out.len() < len {
            let page = self.pager.page(pgno)?;
            let hdr = PageHdr::read(page);
            if !hdr.flags.contains(PageFlags::OVERFLOW) {
                return Err(Error::Corrupted(format!(
                    "page {} in overflow chain is not an overflow page",
                    pgno
                )));
            }
            let take = (hdr.used as usize).min(len - out.len());
            out.extend_from_slice(&page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + take]);
            pgno = hdr.next;
            hops += 1;
            if hops > self.pager.num_pages() {
                return Err(Error::Corrupted("overflow chain cycle".into()));
            }
        }
        if out.len() < len {
            return Err(Error::Corrupted("overflow chain shorter than record".into()));
        }
        Ok(out)
    }

    /// Free every page of an overflow chain.
    fn free_spill(&mut self, chain: u64) -> Result<()> {
        let mut pages = Vec::new();
        let mut pgno = chain;
        while pgno != 0 {
            let hdr = PageHdr::read(self.pager.page(pgno)?);
            pages.push(pgno);
            if pages.len() as u64 > self.pager.num_pages() {
                return Err(Error::Corrupted("overflow chain cycle".into()));
            }
            pgno = hdr.next;
        }
        for pgno in pages {
            self.pager.free_page(pgno)?;
        }
        Ok(())
    }

    /// Split the bucket when its chain outgrew the threshold, doubling
    /// the directory first when the bucket is at full depth.
    fn maybe_split(&mut self, bucket: usize) -> Result<()> {
        let head = self.dir.get(bucket);
        if head == 0 {
            return Ok(());
        }
        if self.chain_pages(head)?.len() <= SPLIT_THRESHOLD {
            return Ok(());
        }
        let local = PageHdr::read(self.pager.page(head)?).local_depth as u32;
        if local >= DIR_MAX_DEPTH {
            return Ok(());
        }
        if local == self.dir.depth() {
            if self.dir.depth() >= DIR_MAX_DEPTH {
                return Ok(());
            }
            self.dir.double(&mut self.pager)?;
        }
        self.split_chain(head, local)
    }

    fn split_chain(&mut self, old_head: u64, local: u32) -> Result<()> {
        let new_local = (local + 1) as u16;

        // Pull every record out of the old chain. Spilled bodies stay
        // where they are; only their slots move.
        struct Moved {
            key: Vec<u8>,
            body: MovedBody,
        }
        enum MovedBody {
            Inline(Vec<u8>),
            Spill { vlen: usize, chain: u64 },
        }
        let old_pages = self.chain_pages(old_head)?;
        let mut moved = Vec::new();
        for &pgno in &old_pages {
            let page = self.pager.page(pgno)?;
            let hdr = PageHdr::read(page);
            let mut spilled = Vec::new();
            for item in SlotIter::new(&page[PAGE_HEADER_SIZE..], hdr.used as usize) {
                let (_, slot) = item?;
                match slot {
                    Slot::Inline { key, value } => moved.push(Moved {
                        key: key.to_vec(),
                        body: MovedBody::Inline(value.to_vec()),
                    }),
                    Slot::Spilled { klen, vlen, pgno: chain } => {
                        spilled.push((klen, vlen, chain));
                    }
                    Slot::Free { .. } => {}
                }
            }
            for (klen, vlen, chain) in spilled {
                moved.push(Moved {
                    key: self.read_spill(chain, klen)?,
                    body: MovedBody::Spill { vlen, chain },
                });
            }
        }

        let low = self.alloc_head(new_local)?;
        let high = self.alloc_head(new_local)?;
        for rec in &moved {
            let target = if (hash_key(&rec.key) >> local) & 1 == 1 {
                high
            } else {
                low
            };
            match &rec.body {
                MovedBody::Inline(value) => {
                    self.chain_insert(target, &rec.key, Body::Inline(value))?
                }
                MovedBody::Spill { vlen, chain } => self.chain_insert(
                    target,
                    &rec.key,
                    Body::Spill {
                        vlen: *vlen,
                        chain: *chain,
                    },
                )?,
            }
        }
        for pgno in old_pages {
            self.pager.free_page(pgno)?;
        }
        for bucket in self.dir.buckets_of(old_head) {
            let target = if (bucket >> local) & 1 == 1 { high } else { low };
            self.dir.set(&mut self.pager, bucket, target)?;
        }
        debug!(
            "split bucket chain {} at depth {} into {} and {} ({} records)",
            old_head,
            local,
            low,
            high,
            moved.len()
        );
        Ok(())
    }

    fn alloc_head(&mut self, local_depth: u16) -> Result<u64> {
        let pgno = self.pager.allocate(PageFlags::DATA)?;
        let page = self.pager.page_mut(pgno)?;
        let mut hdr = PageHdr::read(page);
        hdr.local_depth = local_depth;
        hdr.write(page);
        Ok(pgno)
    }

    /// Advance the cursor to the next stored record: ascending page
    /// number, then in-page slot order.
    fn next_record(&self, cursor: &mut Cursor) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        while cursor.pgno < self.pager.num_pages() {
            let page = self.pager.page(cursor.pgno)?;
            let hdr = PageHdr::read(page);
            if !hdr.flags.contains(PageFlags::DATA) {
                cursor.pgno += 1;
                cursor.off = 0;
                continue;
            }
            let used = hdr.used as usize;
            while cursor.off < used {
                let slot = page::slot_at(&page[PAGE_HEADER_SIZE..], cursor.off)?;
                let size = slot.size();
                match slot {
                    Slot::Free { .. } => cursor.off += size,
                    Slot::Inline { key, value } => {
                        let entry = (key.to_vec(), value.to_vec());
                        cursor.off += size;
                        return Ok(Some(entry));
                    }
                    Slot::Spilled { klen, vlen, pgno } => {
                        let body = self.read_spill(pgno, klen + vlen)?;
                        let entry = (body[..klen].to_vec(), body[klen..].to_vec());
                        cursor.off += size;
                        return Ok(Some(entry));
                    }
                }
            }
            cursor.pgno += 1;
            cursor.off = 0;
        }
        Ok(None)
    }
}
