//! rdbm: a single-file, memory-mapped, hashed key-value store.
//!
//! Keys map to page chains through an extendible hash directory; records
//! live in fixed-size pages, with oversized bodies spilling to overflow
//! page chains. Mutations take a store-wide exclusive lock, reads take a
//! key-derived partition lock, and forward iteration holds the exclusive
//! lock across [`Store::fetch`] calls until the pass is exhausted or the
//! caller unlocks.
//!
//! ```no_run
//! use rdbm::{Options, Store};
//!
//! # fn main() -> rdbm::Result<()> {
//! let db = Store::open("my.db", Options::default())?;
//! db.put(b"key1", b"val1")?;
//! assert_eq!(db.get(b"key1")?, b"val1");
//!
//! while db.fetch()? {
//!     let (key, value) = db.entry()?;
//!     println!("{:?} => {:?}", key, value);
//! }
//! # Ok(())
//! # }
//! ```

mod constants;
mod directory;
mod error;
mod lock;
mod meta;
mod options;
mod page;
mod pager;
mod store;

pub use constants::OpenFlags;
pub use error::{Error, Result};
pub use options::Options;
pub use store::Store;

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
