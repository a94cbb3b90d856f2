// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Result;

use crate::stream::Stream;

/// A [`Stream`] held entirely in memory.
///
/// Useful for scratch units and for tests. Writes past the end grow the buffer; a seek
/// beyond the end followed by a write fills the gap with zeroes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: u64,
}

impl MemoryStream {
    /// Creates an empty stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
        }
    }

    /// Creates a stream holding `data`, with the cursor at offset 0.
    #[must_use]
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// Returns the bytes currently held by the stream.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the stream and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn cursor(&self) -> usize {
        usize::try_from(self.position).unwrap_or(usize::MAX)
    }
}

impl Stream for MemoryStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let start = self.cursor();
        let end = start.saturating_add(data.len());
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        self.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        let cursor = self.cursor();
        if cursor < self.data.len() {
            self.data.truncate(cursor);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}
