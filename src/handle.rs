//! Read/write mode multiplexer over one [Store](crate::store::Store).
//!
//! A [Handle] is one caller's session with a store. It is in one of three modes: idle,
//! reading (one open read session), or writing (one open, unpublished write session).
//! Every operation funnels through the same transition rules, so no code path can
//! bypass them:
//!
//! - Reads publish first. A `get` (or `len`, `contains`, `iter`) issued while a write
//!   session is open seals and publishes that session, then reopens against the newly
//!   published generation. Interleaving reads and writes on one handle therefore pays a
//!   full seal-and-publish cycle per switch; the design optimizes for batched writes.
//! - Writes copy first. A `put` or `delete` issued while reading (or idle) closes any
//!   read session and starts a write session that begins as a full snapshot of the
//!   current generation.
//! - Mutations are invisible to every other handle until published.
//!
//! Because each write session snapshots `current` when writing *starts*, two
//! concurrently-writing handles do not merge: whichever publishes last wins in full,
//! and keys written only by the other handle are lost. That is the consistency model,
//! not an accident.
//!
//! A handle assumes single-threaded, one-call-at-a-time use; share across threads only
//! with external synchronization.

use crate::store::{Config, Error, ReadSession, Store, WriteSession};
use std::mem;

enum Mode {
    Idle,
    Reading(ReadSession),
    Writing(WriteSession),
}

/// One open instance of a store. See the module docs for the mode-transition rules.
pub struct Handle {
    store: Store,
    mode: Mode,
}

impl Handle {
    /// Open a handle on the store at the configured path.
    pub fn init(config: Config) -> Result<Self, Error> {
        Ok(Self {
            store: Store::init(config)?,
            mode: Mode::Idle,
        })
    }

    /// Look up `key` in the published state. Absent keys are `None`, never an error,
    /// including on a store that has never been written.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.ensure_read()? {
            Some(session) => session.get(key),
            None => Ok(None),
        }
    }

    /// Whether `key` is present in the published state.
    pub fn contains(&mut self, key: &[u8]) -> Result<bool, Error> {
        match self.ensure_read()? {
            Some(session) => Ok(session.contains(key)),
            None => Ok(false),
        }
    }

    /// Number of keys in the published state.
    pub fn len(&mut self) -> Result<usize, Error> {
        match self.ensure_read()? {
            Some(session) => Ok(session.len()),
            None => Ok(0),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Buffer a write of `key`. Not visible to any other handle until published.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.ensure_write()?.put(key, value)
    }

    /// Buffer a tombstone for `key`.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.ensure_write()?.delete(key)
    }

    /// Empty everything this handle knows about. An unpublished write session is
    /// discarded (including its starting snapshot) and the published state it copied
    /// from is unpublished as well; with no write session open, only the published
    /// state is unpublished. Returns the handle to idle.
    pub fn clear(&mut self) -> Result<(), Error> {
        if let Mode::Writing(session) = mem::replace(&mut self.mode, Mode::Idle) {
            self.store.discard(session)?;
        }
        self.store.unpublish()
    }

    /// Replace the entire contents with `pairs`. Equivalent to `clear` followed by bulk
    /// `put`s, except the write session starts empty instead of copying a snapshot that
    /// would be immediately discarded.
    pub fn replace<I>(&mut self, pairs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        self.clear()?;
        let mut session = self.store.begin_write(false)?;
        for (key, value) in pairs {
            session.put(&key, &value)?;
        }
        self.mode = Mode::Writing(session);
        Ok(())
    }

    /// Publish any open write session and release any open read session. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if let Mode::Writing(session) = mem::replace(&mut self.mode, Mode::Idle) {
            self.store.publish(session)?;
        }
        Ok(())
    }

    /// The generation the currently open read session is pinned to, if any. Stable for
    /// the life of that session; changes only across close/reopen.
    pub fn uid(&self) -> Option<&str> {
        match &self.mode {
            Mode::Reading(session) => Some(session.generation()),
            _ => None,
        }
    }

    /// Iterate the published state. Publishes any open write session first, then
    /// traverses a private read session independent of the handle's cached one, so
    /// mutations issued from inside the loop (which flow through the normal
    /// transitions) never perturb the traversal. Each call produces a fresh pass over
    /// the then-current published state.
    pub fn iter(&mut self) -> Result<Iter, Error> {
        if matches!(self.mode, Mode::Writing(_)) {
            self.publish()?;
        }
        Ok(Iter {
            session: self.store.open_read()?,
            pos: 0,
        })
    }

    fn publish(&mut self) -> Result<(), Error> {
        if let Mode::Writing(session) = mem::replace(&mut self.mode, Mode::Idle) {
            self.store.publish(session)?;
        }
        Ok(())
    }

    /// Publish-on-read: seal any open write session, then make sure a read session is
    /// open (unless the store is empty).
    fn ensure_read(&mut self) -> Result<Option<&ReadSession>, Error> {
        if matches!(self.mode, Mode::Writing(_)) {
            self.publish()?;
        }
        if matches!(self.mode, Mode::Idle) {
            if let Some(session) = self.store.open_read()? {
                self.mode = Mode::Reading(session);
            }
        }
        match &self.mode {
            Mode::Reading(session) => Ok(Some(session)),
            _ => Ok(None),
        }
    }

    /// Copy-on-first-write: drop any read session and open a write session snapshotting
    /// the current generation, or reuse the one already open.
    fn ensure_write(&mut self) -> Result<&mut WriteSession, Error> {
        if !matches!(self.mode, Mode::Writing(_)) {
            // Release read descriptors before snapshotting.
            self.mode = Mode::Idle;
            self.mode = Mode::Writing(self.store.begin_write(true)?);
        }
        match &mut self.mode {
            Mode::Writing(session) => Ok(session),
            _ => unreachable!("write session installed above"),
        }
    }
}

/// Owning iterator over one pass of a store's published state.
///
/// Holds its own read session, released when the iterator is dropped (including on
/// early termination).
pub struct Iter {
    session: Option<ReadSession>,
    pos: usize,
}

impl Iterator for Iter {
    type Item = Result<(Vec<u8>, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let session = self.session.as_ref()?;
        let entry = session.entry_at(self.pos);
        self.pos += 1;
        match entry {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
