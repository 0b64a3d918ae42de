//! Seekable byte resources that can back a memo log.
//!
//! The log is append-only during normal operation, but recovery needs to
//! rewind and cut off a torn tail, so a resource must support truncation in
//! addition to `Read + Write + Seek`.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A byte resource holding a memo log.
///
/// After construction the resource is owned by a single writer, so
/// implementations need `Send` but not `Sync`.
pub trait LogResource: Read + Write + Seek + Send + 'static {
    /// Shrinks the resource to `len` bytes. The cursor position is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be resized.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Pushes buffered writes down to durable storage.
    ///
    /// Defaults to [`Write::flush`]; file-backed resources also sync data.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or syncing fails.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl LogResource for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }
}

impl LogResource for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = to_index(len)?;
        self.get_mut().truncate(len);
        Ok(())
    }
}

fn to_index(offset: u64) -> io::Result<usize> {
    usize::try_from(offset).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {offset} does not fit in memory"),
        )
    })
}

// ---------------------------------------------------------------------------
// SharedBuffer
// ---------------------------------------------------------------------------

/// An in-memory log whose bytes are shared between handles.
///
/// Every clone sees the same bytes but keeps its own cursor, which makes it
/// possible to hand one handle to a memo and keep another to inspect or
/// reopen the log afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer pre-filled with `bytes`, positioned at the start.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            pos: 0,
        }
    }

    /// Returns a new handle on the same bytes, positioned at the start.
    #[must_use]
    pub fn reopen(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            pos: 0,
        }
    }

    /// Returns a copy of the current contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Returns the current length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns `true` if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns this handle's cursor position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for SharedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock();
        let start = to_index(self.pos)?.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock();
        let start = to_index(self.pos)?;
        let end = start + buf.len();
        if data.len() < end {
            // Writing past the end zero-fills the gap, as a file would.
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::Current(n) => (self.pos, n),
            SeekFrom::End(n) => (self.data.lock().len() as u64, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl LogResource for SharedBuffer {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = to_index(len)?;
        self.data.lock().truncate(len);
        Ok(())
    }
}
