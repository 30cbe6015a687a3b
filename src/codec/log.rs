use super::Error;
use bytes::BufMut;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::trace;

pub(crate) const OP_PUT: u8 = 1;
pub(crate) const OP_DELETE: u8 = 2;

/// Fixed bytes before the key: op + key length + value length.
pub(crate) const RECORD_HEADER_SIZE: usize = 9;
/// Trailing CRC32.
pub(crate) const RECORD_TRAILER_SIZE: usize = 4;

/// Appender for a generation's log file.
///
/// Records become durable on [LogWriter::close], which flushes and syncs before the
/// index is built over the file.
pub struct LogWriter {
    out: BufWriter<File>,
}

impl LogWriter {
    /// Create a new log at `path`, truncating anything already there.
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Append a put record.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.append(OP_PUT, key, value)
    }

    /// Append a tombstone for `key`.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.append(OP_DELETE, key, &[])
    }

    fn append(&mut self, op: u8, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let key_len = u32::try_from(key.len()).map_err(|_| Error::RecordTooLarge)?;
        let value_len = u32::try_from(value.len()).map_err(|_| Error::RecordTooLarge)?;

        let mut buf =
            Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len() + RECORD_TRAILER_SIZE);
        buf.put_u8(op);
        buf.put_u32_le(key_len);
        buf.put_u32_le(value_len);
        buf.put_slice(key);
        buf.put_slice(value);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);

        self.out.write_all(&buf)?;
        trace!(op, key_len, value_len, "appended record");
        Ok(())
    }

    /// Flush and sync the log, consuming the writer.
    pub fn close(mut self) -> Result<(), Error> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}
