//! Append-log writer and static-index builder/reader for one generation.
//!
//! A generation's contents live in two files: an append-only log of put/delete records
//! and an immutable index built from the log once it is sealed. The index resolves a key
//! to the log record holding its value; values are never copied out of the log.
//!
//! # Log format
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+-----------+-------------+----+----+----+----+
//! |  0 |  1 |  2 |  3 |  4 |  5 |  6 |  7 |  8 |    ...    |     ...     |  N |N+1 |N+2 |N+3 |
//! +----+----+----+----+----+----+----+----+----+-----------+-------------+----+----+----+----+
//! | Op | Key length (u32)  | Value length (u32)|    Key    |    Value    |   CRC32 (u32)     |
//! +----+----+----+----+----+----+----+----+----+-----------+-------------+----+----+----+----+
//!
//! Op = 1 (put) or 2 (delete); deletes carry a zero value length.
//! ```
//!
//! _To ensure the integrity of the data, a CRC32 checksum over every prior byte of the
//! record is appended to it. This ensures partial writes are detected before any data is
//! relied on._
//!
//! # Index format
//!
//! ```text
//! +----+----+----+----+----+----+---------------+-----------------+----+----+----+----+
//! |  0 |  1 |  2 |  3 |  4 |  5 |    ...   | 12 |       ...       |  N |N+1 |N+2 |N+3 |
//! +----+----+----+----+----+----+---------------+-----------------+----+----+----+----+
//! |     Magic         | V  |  Entry count (u64) |     Entries     |   CRC32 (u32)     |
//! +----+----+----+----+----+----+---------------+-----------------+----+----+----+----+
//!
//! Entry: Key length (u32) | Key | Record offset (u64) | Value length (u32)
//! ```
//!
//! Entries are the last-wins fold of the log (tombstones removed), listed in the order
//! each surviving key was first written. [IndexReader::open] refuses files that are
//! absent, truncated, or mid-write (trailer CRC mismatch); that failure mode is what
//! lets a caller racing a concurrent reclaim fall back to an empty view.
//!
//! The reader holds descriptors to both files for its whole lifetime. On POSIX
//! filesystems this keeps a generation readable even after its directory entry has been
//! unlinked by a later publication.

mod index;
mod log;

pub use index::{build, Entries, IndexReader};
pub use log::LogWriter;

use thiserror::Error;

/// Errors that can occur when encoding or decoding a generation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt: {0}")]
    Corrupt(&'static str),
    #[error("record too large")]
    RecordTooLarge,
}
