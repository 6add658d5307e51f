use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{DbError, Result};

/// Byte length of the per-document frame header: payload length then CRC32
/// of the payload, both little-endian u32.
pub(crate) const FRAME_HEADER: u64 = 8;

/// One append-only data file. The committed watermark is the number of bytes
/// that are durably part of the database; anything past it is a torn tail
/// from an interrupted append.
pub(crate) struct Segment {
    no: u32,
    path: PathBuf,
    file: Mutex<File>,
    committed: AtomicU64,
}

impl Segment {
    /// Creates a fresh segment file, wiping any orphan left by a crashed
    /// rollover that never reached the catalog.
    pub fn create(path: PathBuf, no: u32) -> Result<Segment> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Segment {
            no,
            path,
            file: Mutex::new(file),
            committed: AtomicU64::new(0),
        })
    }

    /// Opens an existing segment and reconciles the file length against the
    /// catalog watermark. A longer file gets its torn tail truncated; a
    /// shorter file has lost committed data.
    pub fn open(path: PathBuf, no: u32, committed: u64) -> Result<Segment> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DbError::DatabaseCorrupt(format!(
                        "segment file '{}' is missing",
                        path.display()
                    ))
                } else {
                    DbError::Io(e)
                }
            })?;
        let len = file.metadata()?.len();
        if len < committed {
            return Err(DbError::DatabaseCorrupt(format!(
                "segment '{}' is shorter than its committed length ({len} < {committed})",
                path.display()
            )));
        }
        if len > committed {
            log::warn!(
                "segment '{}': truncating torn tail of {} bytes",
                path.display(),
                len - committed
            );
            file.set_len(committed)?;
        }
        Ok(Segment {
            no,
            path,
            file: Mutex::new(file),
            committed: AtomicU64::new(committed),
        })
    }

    pub fn no(&self) -> u32 {
        self.no
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Writes `frames` starting at the watermark and syncs the file. Returns
    /// the length the watermark should advance to once the catalog commit
    /// succeeds. Bytes left behind by an earlier failed append are dropped
    /// first.
    pub fn write_frames(&self, frames: &[u8]) -> Result<u64> {
        let base = self.committed();
        let mut file = self.file.lock();
        file.set_len(base)?;
        file.seek(SeekFrom::Start(base))?;
        file.write_all(frames)?;
        file.sync_data()?;
        Ok(base + frames.len() as u64)
    }

    /// Publishes a new watermark. Call only after the catalog recorded it.
    pub fn advance(&self, committed: u64) {
        self.committed.store(committed, Ordering::Release);
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}
