use super::{
    log::{OP_DELETE, OP_PUT, RECORD_HEADER_SIZE, RECORD_TRAILER_SIZE},
    Error,
};
use bytes::{Buf, BufMut};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Write},
    os::unix::fs::FileExt,
    path::Path,
};
use tracing::debug;

const MAGIC: &[u8; 4] = b"hsix";
const VERSION: u8 = 1;
/// Magic + version + entry count.
const INDEX_HEADER_SIZE: usize = 13;

/// Location of a key's surviving record in the log.
#[derive(Debug, Clone)]
struct Entry {
    record_offset: u64,
    value_len: u32,
}

/// Last-wins fold of the log, preserving the position of each surviving key's first
/// write. Deleting a key frees its slot; a later reinsertion appends.
struct Fold {
    slots: Vec<Option<(Vec<u8>, Entry)>>,
    positions: HashMap<Vec<u8>, usize>,
}

impl Fold {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn put(&mut self, key: Vec<u8>, entry: Entry) {
        match self.positions.get(&key) {
            Some(&slot) => self.slots[slot] = Some((key, entry)),
            None => {
                self.positions.insert(key.clone(), self.slots.len());
                self.slots.push(Some((key, entry)));
            }
        }
    }

    fn delete(&mut self, key: &[u8]) {
        if let Some(slot) = self.positions.remove(key) {
            self.slots[slot] = None;
        }
    }
}

/// Build the static index at `index_path` from the sealed log at `log_path`.
///
/// The log must be complete: a truncated or unparseable record is an error, not a
/// stopping point, because the builder only ever runs over a log this process just
/// sealed.
pub fn build(index_path: &Path, log_path: &Path) -> Result<(), Error> {
    let mut log = BufReader::new(File::open(log_path)?);
    let mut fold = Fold::new();
    let mut offset = 0u64;
    loop {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        match read_fully(&mut log, &mut header)? {
            0 => break,
            n if n < RECORD_HEADER_SIZE => return Err(Error::Corrupt("truncated log record")),
            _ => {}
        }
        let mut buf = &header[..];
        let op = buf.get_u8();
        let key_len = buf.get_u32_le() as usize;
        let value_len = buf.get_u32_le();

        let mut body = vec![0u8; key_len + value_len as usize];
        log.read_exact(&mut body)
            .map_err(|_| Error::Corrupt("truncated log record"))?;
        let mut crc_bytes = [0u8; RECORD_TRAILER_SIZE];
        log.read_exact(&mut crc_bytes)
            .map_err(|_| Error::Corrupt("truncated log record"))?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(&body);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            return Err(Error::Corrupt("log record checksum mismatch"));
        }

        let key = body[..key_len].to_vec();
        match op {
            OP_PUT => fold.put(
                key,
                Entry {
                    record_offset: offset,
                    value_len,
                },
            ),
            OP_DELETE => fold.delete(&key),
            _ => return Err(Error::Corrupt("unknown log record op")),
        }
        offset +=
            (RECORD_HEADER_SIZE + key_len + value_len as usize + RECORD_TRAILER_SIZE) as u64;
    }

    // Serialize surviving entries and seal with a trailing CRC so a reader can tell a
    // complete index from a mid-write one.
    let live = fold.slots.iter().flatten().count() as u64;
    let mut buf = Vec::new();
    buf.put_slice(MAGIC);
    buf.put_u8(VERSION);
    buf.put_u64_le(live);
    for (key, entry) in fold.slots.iter().flatten() {
        buf.put_u32_le(key.len() as u32);
        buf.put_slice(key);
        buf.put_u64_le(entry.record_offset);
        buf.put_u32_le(entry.value_len);
    }
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    let mut out = File::create(index_path)?;
    out.write_all(&buf)?;
    out.sync_all()?;
    debug!(entries = live, "built index");
    Ok(())
}

/// Point-lookup and ordered-iteration reader over a sealed log + index pair.
///
/// Open descriptors to both files are held for the reader's lifetime, so the data stays
/// reachable even after the generation directory is unlinked.
pub struct IndexReader {
    log: File,
    entries: HashMap<Vec<u8>, Entry>,
    order: Vec<Vec<u8>>,
    // Keeps the index file's descriptor pinned alongside the log's.
    _index: File,
}

impl IndexReader {
    /// Open the pair, failing if either file is absent, truncated, or mid-write.
    pub fn open(index_path: &Path, log_path: &Path) -> Result<Self, Error> {
        let mut index = File::open(index_path)?;
        let log = File::open(log_path)?;

        let mut bytes = Vec::new();
        index.read_to_end(&mut bytes)?;
        if bytes.len() < INDEX_HEADER_SIZE + RECORD_TRAILER_SIZE {
            return Err(Error::Corrupt("index too short"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - RECORD_TRAILER_SIZE);
        let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(body) != crc {
            return Err(Error::Corrupt("index checksum mismatch"));
        }

        let mut buf = body;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(Error::Corrupt("bad index magic"));
        }
        if buf.get_u8() != VERSION {
            return Err(Error::Corrupt("unsupported index version"));
        }
        let count = buf.get_u64_le() as usize;

        let mut entries = HashMap::with_capacity(count);
        let mut order = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(Error::Corrupt("index entry truncated"));
            }
            let key_len = buf.get_u32_le() as usize;
            if buf.remaining() < key_len + 12 {
                return Err(Error::Corrupt("index entry truncated"));
            }
            let mut key = vec![0u8; key_len];
            buf.copy_to_slice(&mut key);
            let record_offset = buf.get_u64_le();
            let value_len = buf.get_u32_le();
            entries.insert(
                key.clone(),
                Entry {
                    record_offset,
                    value_len,
                },
            );
            order.push(key);
        }
        if buf.has_remaining() {
            return Err(Error::Corrupt("trailing bytes after index entries"));
        }

        Ok(Self {
            log,
            entries,
            order,
            _index: index,
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Fetch the value for `key`, reading (and verifying) its record from the log.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.entries.get(key) {
            Some(entry) => Ok(Some(self.read_value(key, entry)?)),
            None => Ok(None),
        }
    }

    /// The full pair at iteration position `pos`, if in range.
    pub fn entry_at(&self, pos: usize) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        let Some(key) = self.order.get(pos) else {
            return Ok(None);
        };
        let entry = self
            .entries
            .get(key)
            .ok_or(Error::Corrupt("index order references unknown key"))?;
        let value = self.read_value(key, entry)?;
        Ok(Some((key.clone(), value)))
    }

    /// Iterate live pairs in first-insertion order.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            reader: self,
            pos: 0,
        }
    }

    fn read_value(&self, key: &[u8], entry: &Entry) -> Result<Vec<u8>, Error> {
        let record_len =
            RECORD_HEADER_SIZE + key.len() + entry.value_len as usize + RECORD_TRAILER_SIZE;
        let mut record = vec![0u8; record_len];
        self.log
            .read_exact_at(&mut record, entry.record_offset)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::Corrupt("log shorter than index"),
                _ => Error::Io(err),
            })?;

        let (body, trailer) = record.split_at(record_len - RECORD_TRAILER_SIZE);
        let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(body) != crc {
            return Err(Error::Corrupt("log record checksum mismatch"));
        }

        let value_start = RECORD_HEADER_SIZE + key.len();
        Ok(body[value_start..].to_vec())
    }
}

/// Borrowed iterator over an [IndexReader]'s live pairs.
pub struct Entries<'a> {
    reader: &'a IndexReader,
    pos: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.reader.entry_at(self.pos);
        self.pos += 1;
        match entry {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Read as many bytes as possible into `buf`, returning how many were read. Unlike
/// `read_exact`, a clean EOF at offset zero is distinguishable from a partial record.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
