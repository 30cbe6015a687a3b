//! Advisory-lock capability over a well-known lock file.
//!
//! Locks are cooperative (`flock`-based) and scoped: acquiring returns a guard whose
//! [Drop] releases the lock, so every exit path (including error propagation) releases.
//! A process that exits while holding a lock has it released by the OS.

use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A held advisory lock. Released on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire a shared lock on `path`, blocking until granted.
    pub fn shared(path: &Path) -> io::Result<Self> {
        let file = Self::open(path)?;
        file.lock_shared()?;
        Ok(Self { file })
    }

    /// Acquire an exclusive lock on `path`, blocking until granted.
    pub fn exclusive(path: &Path) -> io::Result<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
