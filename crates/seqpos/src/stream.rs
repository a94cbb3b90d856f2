// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Result;

/// A seekable byte stream underlying one connected unit.
///
/// The stream keeps a single cursor. [`write`](Self::write), [`seek`](Self::seek) and
/// [`truncate`](Self::truncate) operate relative to it; [`read_at`](Self::read_at) is
/// positional and leaves the cursor untouched.
///
/// Implementations may buffer writes. Buffered bytes must be visible to
/// [`read_at`](Self::read_at) and [`len`](Self::len) and are made durable by
/// [`flush`](Self::flush).
#[cfg_attr(test, mockall::automock)]
pub trait Stream: Send {
    /// Returns the current absolute offset of the cursor.
    fn position(&self) -> u64;

    /// Reads up to `len` bytes starting at `offset` without moving the cursor.
    ///
    /// Returns fewer than `len` bytes only when the end of the stream is reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Writes all of `data` at the cursor and advances the cursor past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Moves the cursor to the absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying seek fails.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Discards everything at and beyond the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying truncate fails.
    fn truncate(&mut self) -> Result<()>;

    /// Pushes buffered writes to the underlying storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying flush fails.
    fn flush(&mut self) -> Result<()>;

    /// Returns the length of the stream in bytes, buffered writes included.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying metadata query fails.
    fn len(&mut self) -> Result<u64>;

    /// Returns `true` if the stream holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying metadata query fails.
    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
