//! Generation-versioned store coordinated purely through the filesystem.
//!
//! [Store] owns a store path's on-disk layout and the promote/publish/garbage-collect
//! protocol over it. Every published state is a *generation*: an immutable directory
//! holding a sealed log and its static index, never mutated after publication. A
//! `current` symlink names the authoritative generation; the lock file mediates the
//! advisory locks that serialize publication.
//!
//! # Layout
//!
//! ```text
//! <store_path>/
//!   hammerspace.lock           # empty, lock-only file
//!   current -> <generation-id> # symlink, relative target
//!   <generation-id>/           # one per generation, retained until reclaimed
//!     hammerspace.spl          # append-only log
//!     hammerspace.spi          # static index built from the log
//! ```
//!
//! # Atomic publication
//!
//! Publication creates a temporary symlink to the sealed generation and renames it onto
//! `current` while holding the lock file exclusively. A reader resolving `current`
//! mid-publish sees either the old generation or the new one, never a torn state.
//! Because symlink targets are relative generation ids, the tree is self-contained and
//! relocatable.
//!
//! # Reclamation
//!
//! Removing a superseded generation is best-effort: a reader elsewhere may still hold
//! its descriptors open, and on POSIX filesystems the removal then only unlinks the
//! directory entries while the open data lives on. Failure to remove is logged and
//! otherwise ignored; it never blocks publication.

mod storage;
pub use storage::{ReadSession, Store, WriteSession};

use std::path::PathBuf;
use thiserror::Error;

/// Name of the lock-only file at the store root.
pub(crate) const LOCK_NAME: &str = "hammerspace.lock";
/// Name of the symlink selecting the authoritative generation.
pub(crate) const CURRENT_NAME: &str = "current";
/// Name of the log file inside a generation directory.
pub(crate) const LOG_NAME: &str = "hammerspace.spl";
/// Name of the index file inside a generation directory.
pub(crate) const INDEX_NAME: &str = "hammerspace.spi";

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::Error),
}

/// Configuration for [Store].
#[derive(Clone)]
pub struct Config {
    /// Directory rooting one logical key-value store. Created if absent.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::init(Config {
            path: dir.path().join("store"),
        })
        .unwrap()
    }

    #[test]
    fn test_empty_store_reads_as_absent() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.open_read().unwrap().is_none());
    }

    #[test]
    fn test_write_publish_read() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"foo", b"bar").unwrap();
        let generation = store.publish(session).unwrap();

        let read = store.open_read().unwrap().unwrap();
        assert_eq!(read.generation(), generation);
        assert_eq!(read.get(b"foo").unwrap(), Some(b"bar".to_vec()));
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn test_begin_write_copies_current() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"a", b"1").unwrap();
        session.put(b"b", b"2").unwrap();
        store.publish(session).unwrap();

        // The copy carries existing entries forward; the empty variant does not.
        let mut session = store.begin_write(true).unwrap();
        session.put(b"c", b"3").unwrap();
        store.publish(session).unwrap();
        let read = store.open_read().unwrap().unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read.get(b"a").unwrap(), Some(b"1".to_vec()));
        drop(read);

        let mut session = store.begin_write(false).unwrap();
        session.put(b"d", b"4").unwrap();
        store.publish(session).unwrap();
        let read = store.open_read().unwrap().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.get(b"a").unwrap(), None);
        assert_eq!(read.get(b"d").unwrap(), Some(b"4".to_vec()));
    }

    #[test]
    fn test_publish_reclaims_superseded_generation() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"k", b"v1").unwrap();
        let first = store.publish(session).unwrap();
        assert!(dir.path().join("store").join(&first).exists());

        let mut session = store.begin_write(true).unwrap();
        session.put(b"k", b"v2").unwrap();
        let second = store.publish(session).unwrap();

        // With no open readers the old directory is gone; the new one remains.
        assert!(!dir.path().join("store").join(&first).exists());
        assert!(dir.path().join("store").join(&second).exists());
    }

    #[test]
    fn test_reader_survives_reclaim() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"pinned", b"value").unwrap();
        let first = store.publish(session).unwrap();

        let read = store.open_read().unwrap().unwrap();
        assert_eq!(read.generation(), first);

        // Supersede and reclaim the generation the reader is pinned to.
        let mut session = store.begin_write(false).unwrap();
        session.put(b"other", b"data").unwrap();
        store.publish(session).unwrap();
        assert!(!dir.path().join("store").join(&first).exists());

        // Descriptors opened before the reclaim stay valid and consistent.
        assert_eq!(read.get(b"pinned").unwrap(), Some(b"value".to_vec()));
        assert_eq!(read.get(b"other").unwrap(), None);
    }

    #[test]
    fn test_discard_removes_unpublished_generation() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"k", b"v").unwrap();
        let generation = session.generation().to_string();
        store.discard(session).unwrap();

        assert!(!dir.path().join("store").join(generation).exists());
        assert!(store.open_read().unwrap().is_none());
    }

    #[test]
    fn test_unpublish_empties_store() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"k", b"v").unwrap();
        let generation = store.publish(session).unwrap();

        store.unpublish().unwrap();
        assert!(store.open_read().unwrap().is_none());
        assert!(!dir.path().join("store").join(generation).exists());
        assert!(!dir.path().join("store").join(CURRENT_NAME).exists());

        // Unpublishing an already-empty store is a no-op.
        store.unpublish().unwrap();
    }

    #[test]
    fn test_dangling_current_reads_as_empty() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut session = store.begin_write(true).unwrap();
        session.put(b"k", b"v").unwrap();
        let generation = store.publish(session).unwrap();

        // Simulate the benign race with a concurrent reclaim: the generation vanishes
        // between repointings while `current` still names it.
        fs::remove_dir_all(dir.path().join("store").join(generation)).unwrap();
        assert!(store.open_read().unwrap().is_none());
    }

    #[test]
    fn test_generation_ids_are_unique() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let a = store.begin_write(false).unwrap();
        let b = store.begin_write(false).unwrap();
        assert_ne!(a.generation(), b.generation());
        store.discard(a).unwrap();
        store.discard(b).unwrap();
    }
}
