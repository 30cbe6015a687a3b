use super::{Config, Error, CURRENT_NAME, INDEX_NAME, LOCK_NAME, LOG_NAME};
use crate::{
    codec::{self, IndexReader, LogWriter},
    lock::FileLock,
    probe,
};
use std::{
    fs,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Implementation of the generation store.
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Initialize a store rooted at the configured path, creating the directory if
    /// needed. The first time a path is used (no lock file yet), the filesystem's
    /// capabilities are probed; degradation is warned about, never fatal.
    pub fn init(config: Config) -> Result<Self, Error> {
        fs::create_dir_all(&config.path)?;
        if !config.path.join(LOCK_NAME).exists() {
            probe::run(&config.path);
        }
        Ok(Self { path: config.path })
    }

    fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_NAME)
    }

    fn current_path(&self) -> PathBuf {
        self.path.join(CURRENT_NAME)
    }

    /// Open a read session against the currently published generation, or `None` if the
    /// store is empty.
    ///
    /// The shared lock is held only while resolving `current` and opening the pair:
    /// once the descriptors are open they are immune to later renames and deletes, so
    /// the session outlives the lock. A generation that fails to open (absent,
    /// truncated, or mid-reclaim) is treated as an empty store, never an error.
    pub fn open_read(&self) -> Result<Option<ReadSession>, Error> {
        let _lock = FileLock::shared(&self.lock_path())?;
        Ok(self.open_current())
    }

    fn open_current(&self) -> Option<ReadSession> {
        let target = match fs::read_link(self.current_path()) {
            Ok(target) => target,
            Err(_) => return None,
        };
        let generation = target.to_string_lossy().into_owned();
        let dir = self.path.join(&target);
        match IndexReader::open(&dir.join(INDEX_NAME), &dir.join(LOG_NAME)) {
            Ok(reader) => Some(ReadSession { reader, generation }),
            Err(err) => {
                debug!(%generation, %err, "current generation failed to open; treating as empty");
                None
            }
        }
    }

    /// Start a write session against a fresh generation. With `copy_existing`, the new
    /// log begins as a full replay of the currently published generation; otherwise it
    /// starts empty (full replacement).
    pub fn begin_write(&self, copy_existing: bool) -> Result<WriteSession, Error> {
        let generation = new_generation_id();
        let dir = self.path.join(&generation);
        fs::create_dir_all(&dir)?;
        let mut writer = LogWriter::create(&dir.join(LOG_NAME))?;

        if copy_existing {
            if let Some(session) = self.open_read()? {
                for entry in session.reader.iter() {
                    let (key, value) = entry?;
                    writer.put(&key, &value)?;
                }
            }
        }

        debug!(%generation, copy_existing, "began write session");
        Ok(WriteSession {
            generation,
            dir,
            writer,
        })
    }

    /// Seal `session` and atomically repoint `current` at it, then best-effort reclaim
    /// the generation it supersedes. Returns the published generation id.
    pub fn publish(&self, session: WriteSession) -> Result<String, Error> {
        let WriteSession {
            generation,
            dir,
            writer,
        } = session;
        writer.close()?;
        codec::build(&dir.join(INDEX_NAME), &dir.join(LOG_NAME))?;

        // The temporary symlink name is unique (generation ids are), so concurrent
        // publishers never trample each other's staging link.
        let staged = self.path.join(format!("{CURRENT_NAME}.{generation}"));
        symlink(&generation, &staged)?;

        let superseded = {
            let _lock = FileLock::exclusive(&self.lock_path())?;
            let previous = fs::read_link(self.current_path()).ok();
            if let Err(err) = fs::rename(&staged, self.current_path()) {
                let _ = fs::remove_file(&staged);
                return Err(err.into());
            }
            previous
        };

        debug!(%generation, "published");
        if let Some(previous) = superseded {
            self.reclaim(&previous);
        }
        Ok(generation)
    }

    /// Delete `session`'s generation without publishing it.
    pub fn discard(&self, session: WriteSession) -> Result<(), Error> {
        let WriteSession { dir, writer, .. } = session;
        drop(writer);
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Remove the `current` pointer (if present) and best-effort reclaim the generation
    /// it named, leaving the store logically empty.
    pub fn unpublish(&self) -> Result<(), Error> {
        let removed = {
            let _lock = FileLock::exclusive(&self.lock_path())?;
            match fs::read_link(self.current_path()) {
                Ok(target) => {
                    fs::remove_file(self.current_path())?;
                    Some(target)
                }
                Err(_) => None,
            }
        };
        if let Some(target) = removed {
            self.reclaim(&target);
        }
        Ok(())
    }

    /// Best-effort removal of a superseded generation. Failure is expected when another
    /// process still holds the generation open on filesystems that refuse such
    /// removals; the directory is left for out-of-band cleanup.
    fn reclaim(&self, target: &Path) {
        let dir = self.path.join(target);
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(target = %target.display(), "reclaimed superseded generation"),
            Err(err) => {
                debug!(target = %target.display(), %err, "could not reclaim superseded generation")
            }
        }
    }
}

/// A generation id unique across processes and time: the writing process's pid plus a
/// random component, so ids never collide even across machine reboots within the
/// retention window.
fn new_generation_id() -> String {
    format!("{}_{:016x}", std::process::id(), rand::random::<u64>())
}

/// An open log + index pair pinned to one published generation.
pub struct ReadSession {
    reader: IndexReader,
    generation: String,
}

impl ReadSession {
    /// The generation this session is pinned to. Stable for the session's lifetime.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.reader.get(key)?)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.reader.contains(key)
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    /// The pair at iteration position `pos`, in first-insertion order.
    pub fn entry_at(&self, pos: usize) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        Ok(self.reader.entry_at(pos)?)
    }
}

/// An open log appender targeting a new, not-yet-published generation.
pub struct WriteSession {
    generation: String,
    dir: PathBuf,
    writer: LogWriter,
}

impl WriteSession {
    /// The id of the generation this session will publish as.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        Ok(self.writer.put(key, value)?)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        Ok(self.writer.delete(key)?)
    }
}
