use crate::constants::{FORMAT_VERSION, HASH_VERSION, MAGIC, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::error::{Error, Result};

/// Serialized size of the header in bytes
pub(crate) const HEADER_SIZE: usize = 48;

/// On-disk store header, held in page 0.
///
/// The header is self-describing: magic and version are validated on every
/// open so an incompatible file fails instead of being silently rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    /// Magic number identifying rdbm files
    pub(crate) magic: u32,
    /// On-disk format version
    pub(crate) version: u32,
    /// Hash function version
    pub(crate) hash_version: u32,
    /// Page size in bytes, fixed at creation
    pub(crate) page_size: u32,
    /// Directory depth in bits
    pub(crate) dir_depth: u32,
    /// First page of the directory chain
    pub(crate) dir_root: u64,
    /// Head of the free page list, 0 when empty
    pub(crate) free_list: u64,
    /// Number of pages in the file, header page included
    pub(crate) num_pages: u64,
}

impl Header {
    pub(crate) fn new(page_size: usize) -> Self {
        Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            hash_version: HASH_VERSION,
            page_size: page_size as u32,
            dir_depth: 0,
            dir_root: 0,
            free_list: 0,
            num_pages: 1,
        }
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.hash_version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.page_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.dir_depth.to_le_bytes());
        buf[20..24].copy_from_slice(&[0u8; 4]);
        buf[24..32].copy_from_slice(&self.dir_root.to_le_bytes());
        buf[32..40].copy_from_slice(&self.free_list.to_le_bytes());
        buf[40..48].copy_from_slice(&self.num_pages.to_le_bytes());
    }

    /// Decode and validate a header read from page 0.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Invalid);
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Invalid);
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let hash_version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if version != FORMAT_VERSION || hash_version != HASH_VERSION {
            return Err(Error::VersionMismatch);
        }
        let header = Header {
            magic,
            version,
            hash_version,
            page_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            dir_depth: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            dir_root: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            free_list: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            num_pages: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
        };
        let psize = header.page_size as usize;
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&psize) || !psize.is_power_of_two() {
            return Err(Error::Corrupted(format!("bad page size {}", psize)));
        }
        if header.num_pages == 0 {
            return Err(Error::Corrupted("zero page count".into()));
        }
        Ok(header)
    }
}
