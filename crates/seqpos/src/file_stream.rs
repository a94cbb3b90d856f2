// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{File, OpenOptions};
use std::io::{Read, Result, Seek as _, SeekFrom, Write as _};
use std::path::Path;

use crate::stream::Stream;

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// A [`Stream`] over a file on disk, with a write-behind buffer.
///
/// Writes accumulate in memory until the buffer fills, the cursor moves away from the
/// end of the buffered run, or [`flush`](Stream::flush) is called. Reads, truncation and
/// length queries drain the buffer first, so they always observe every write.
///
/// The buffer is drained on drop; errors at that point are ignored. Call
/// [`flush`](Stream::flush) to observe them.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    position: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    capacity: usize,
}

impl FileStream {
    /// Opens an existing file for reading and writing, with the cursor at offset 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_std(file))
    }

    /// Opens a file for reading and writing, creating it if it does not exist and
    /// truncating it if it does.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_std(file))
    }

    /// Wraps an already opened file. The cursor starts at offset 0 regardless of the
    /// file's own cursor.
    #[must_use]
    pub const fn from_std(file: File) -> Self {
        Self::with_capacity(file, DEFAULT_BUFFER_SIZE)
    }

    /// Wraps an already opened file, buffering at most `capacity` bytes of writes.
    ///
    /// A `capacity` of 0 writes straight through.
    #[must_use]
    pub const fn with_capacity(file: File, capacity: usize) -> Self {
        Self {
            file,
            position: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            capacity,
        }
    }

    /// Returns the number of written bytes not yet handed to the operating system.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn buffer_end(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    fn drain(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let _ = self.file.seek(SeekFrom::Start(self.buffer_start))?;
        self.file.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

impl Stream for FileStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.drain()?;
        let available = self.file.metadata()?.len().saturating_sub(offset);
        let len = usize::try_from(available).map_or(len, |available| len.min(available));

        let _ = self.file.seek(SeekFrom::Start(offset))?;
        let mut out = Vec::with_capacity(len);
        let _ = (&mut self.file).take(len as u64).read_to_end(&mut out)?;
        Ok(out)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.buffer.is_empty() && self.buffer_end() != self.position {
            self.drain()?;
        }
        if self.buffer.is_empty() {
            self.buffer_start = self.position;
        }
        self.buffer.extend_from_slice(data);
        self.position += data.len() as u64;
        if self.buffer.len() >= self.capacity {
            self.drain()?;
        }
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        self.drain()?;
        self.file.set_len(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.file.flush()
    }

    fn len(&mut self) -> Result<u64> {
        let on_disk = self.file.metadata()?.len();
        Ok(on_disk.max(self.buffer_end()))
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        let _ = self.drain();
    }
}
