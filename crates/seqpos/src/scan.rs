// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Backward record scanning for both record forms.
//!
//! Both scanners take the offset of a record boundary and return the offset of the
//! boundary before it. Neither moves the stream cursor; the caller seeks to the result.

use std::io::{Error, ErrorKind, Result};

use tracing::{Level, event};

use crate::stream::Stream;

/// Byte that terminates a formatted record.
pub const RECORD_TERMINATOR: u8 = b'\n';

/// Width in bytes of the length header and footer around an unformatted record.
///
/// Markers are native-endian `u64` values.
pub const MARKER_LEN: usize = size_of::<u64>();

/// Default number of bytes read per step by the formatted backward scan.
pub const DEFAULT_SCAN_CHUNK: usize = 4096;

/// Splits `[0, end)` into consecutive windows of at most `chunk` bytes, yielded from
/// the end of the range towards its start.
///
/// Each window is `(start, len)`; the first ends at `end`, every following one ends
/// where the previous began, and the last starts at 0.
#[derive(Debug, Clone)]
pub(crate) struct BackwardWindows {
    end: u64,
    chunk: u64,
}

impl BackwardWindows {
    pub(crate) fn new(end: u64, chunk: usize) -> Self {
        Self {
            end,
            chunk: chunk.max(1) as u64,
        }
    }
}

impl Iterator for BackwardWindows {
    type Item = (u64, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.end == 0 {
            return None;
        }
        let start = self.end.saturating_sub(self.chunk);
        let len = usize::try_from(self.end - start).unwrap_or(usize::MAX);
        self.end = start;
        Some((start, len))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.end.div_ceil(self.chunk)).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl ExactSizeIterator for BackwardWindows {}

/// Finds the start of the formatted record that precedes the boundary at `pos`.
///
/// `pos` must be the first byte after a record terminator. The byte at `pos - 1` is
/// that terminator and is skipped; the search looks for the terminator before it and
/// returns the offset just past it, or 0 when the record is the first in the file.
///
/// # Errors
///
/// Fails if a read fails, or with [`ErrorKind::UnexpectedEof`] if the stream returns
/// fewer bytes than requested.
pub fn formatted_backspace<S: Stream + ?Sized>(stream: &mut S, pos: u64, chunk: usize) -> Result<u64> {
    for (start, len) in BackwardWindows::new(pos.saturating_sub(1), chunk) {
        let window = stream.read_at(start, len)?;
        if window.len() != len {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "short read while scanning backwards for a record terminator",
            ));
        }
        event!(Level::TRACE, message = "scan window", start, len);

        if let Some(i) = window.iter().rposition(|&b| b == RECORD_TERMINATOR) {
            return Ok(start + i as u64 + 1);
        }
    }
    Ok(0)
}

/// Finds the start of the unformatted record that precedes the boundary at `pos`.
///
/// Reads the length footer ending at `pos` and steps back over the whole frame.
///
/// # Errors
///
/// Fails if the read fails, or with [`ErrorKind::InvalidData`] if there is no room for
/// a footer before `pos` or the footer describes a frame that would start before
/// offset 0.
pub fn unformatted_backspace<S: Stream + ?Sized>(stream: &mut S, pos: u64) -> Result<u64> {
    let marker = MARKER_LEN as u64;
    let footer_at = pos
        .checked_sub(marker)
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "no record length footer before the current position"))?;

    let payload = read_marker(stream, footer_at)?;
    event!(Level::TRACE, message = "record footer", offset = footer_at, payload);

    payload
        .checked_add(2 * marker)
        .and_then(|frame| pos.checked_sub(frame))
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "record length footer points before the start of the file"))
}

/// Reads one length marker at `offset`.
pub(crate) fn read_marker<S: Stream + ?Sized>(stream: &mut S, offset: u64) -> Result<u64> {
    let bytes = stream.read_at(offset, MARKER_LEN)?;
    let Ok(bytes) = <[u8; MARKER_LEN]>::try_from(bytes.as_slice()) else {
        return Err(Error::new(ErrorKind::InvalidData, "truncated record length marker"));
    };
    Ok(u64::from_ne_bytes(bytes))
}

/// Encodes `payload` as a complete unformatted record frame.
#[must_use]
pub fn frame_record(payload: &[u8]) -> Vec<u8> {
    let marker = (payload.len() as u64).to_ne_bytes();
    let mut frame = Vec::with_capacity(payload.len() + 2 * MARKER_LEN);
    frame.extend_from_slice(&marker);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&marker);
    frame
}
