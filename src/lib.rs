//! Persistent, process-shared key-value storage coordinated through the filesystem.
//!
//! Multiple independent OS processes may open the same on-disk store concurrently, some
//! reading, some writing, without a coordinating server. Every published state of the
//! store is an immutable *generation* (an append log plus a static index, stored in its
//! own directory); a `current` symlink selects the authoritative generation; publication
//! is a single atomic rename serialized by an advisory lock on a well-known lock file.
//! Readers keep their descriptors open for the life of a session, so a generation that
//! is superseded and reclaimed underneath them stays readable until they let go.
//!
//! Writes are copy-on-write: the first mutation on a handle snapshots the current
//! generation into a fresh one, further mutations append to it, and the next read (or
//! `close`) seals and publishes it. Two concurrently-writing handles do not merge;
//! whichever publishes last wins in full.
//!
//! # Example
//!
//! ```rust
//! use hammerspace::{store::Config, Map};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut map = Map::init(Config {
//!     path: dir.path().join("store"),
//! })
//! .unwrap();
//!
//! map.insert(b"hello", b"world").unwrap();
//! assert_eq!(map.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! map.close().unwrap();
//! ```

pub mod codec;
pub mod handle;
pub mod lock;
pub mod map;
mod probe;
pub mod store;

pub use handle::Handle;
pub use map::{ConstantDefault, DefaultStrategy, Map};
