// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sequential record transfer: just enough reading and writing to build files the
//! positioning statements can walk.

use std::io;

use tracing::{Level, event};

use crate::error::{Error, Result};
use crate::runtime::{Runtime, UnitTable};
use crate::scan::{MARKER_LEN, RECORD_TERMINATOR, frame_record, read_marker};
use crate::stream::Stream;
use crate::unit::{Access, EndfileState, Form, Mode, Position, Unit, UnitId};

impl Runtime {
    /// Writes one complete record to unit `id` at its cursor.
    ///
    /// A formatted record is written as `payload` followed by a terminator; an
    /// unformatted record is framed by its length. A pending partial record is
    /// completed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadUnit`] if `id` is not connected, [`Error::BadOption`] for a
    /// direct-access unit or a formatted payload containing a terminator, or
    /// [`Error::Os`] if the write fails.
    pub fn write_record(&self, id: UnitId, payload: &[u8]) -> Result<()> {
        self.locked(id, |units| {
            let unit = sequential_unit(units, id)?;
            if unit.form == Form::Formatted && payload.contains(&RECORD_TERMINATOR) {
                return Err(Error::BadOption("formatted record contains a record terminator"));
            }

            if unit.current_record != 0 {
                unit.advance_record()?;
            }

            match unit.form {
                Form::Formatted => {
                    unit.stream.write(payload)?;
                    unit.stream.write(&[RECORD_TERMINATOR])?;
                }
                Form::Unformatted => unit.stream.write(&frame_record(payload))?,
            }

            unit.mode = Mode::Writing;
            unit.endfile = EndfileState::NoEndfile;
            unit.last_record += 1;
            unit.position = Position::AsIs;

            event!(Level::TRACE, message = "record written", unit = id, len = payload.len());
            Ok(())
        })
    }

    /// Writes `bytes` to unit `id` without ending the record (non-advancing output).
    ///
    /// The record stays pending until the next complete record is written or an
    /// endfile record is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadUnit`] if `id` is not connected, [`Error::BadOption`] for a
    /// direct-access or unformatted unit or for bytes containing a terminator, or
    /// [`Error::Os`] if the write fails.
    pub fn write_partial(&self, id: UnitId, bytes: &[u8]) -> Result<()> {
        self.locked(id, |units| {
            let unit = sequential_unit(units, id)?;
            if unit.form != Form::Formatted {
                return Err(Error::BadOption("non-advancing output requires a formatted unit"));
            }
            if bytes.contains(&RECORD_TERMINATOR) {
                return Err(Error::BadOption("formatted record contains a record terminator"));
            }

            unit.stream.write(bytes)?;
            unit.mode = Mode::Writing;
            unit.endfile = EndfileState::NoEndfile;
            unit.current_record = 1;
            unit.position = Position::AsIs;
            Ok(())
        })
    }

    /// Reads the next record from unit `id` and returns its payload.
    ///
    /// A final formatted line without a terminator still counts as a record. If the
    /// unit was writing, the stream is first truncated at the cursor, so records past
    /// the last one written are gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfFile`] when the cursor is at the end of the file or at an
    /// endfile record; the unit is then left just past the endfile record. Returns
    /// [`Error::BadUnit`] if `id` is not connected, [`Error::BadOption`] for a
    /// direct-access unit, or [`Error::Os`] if the read fails or an unformatted frame is
    /// damaged.
    pub fn read_record(&self, id: UnitId) -> Result<Vec<u8>> {
        let chunk = self.scan_chunk();
        self.locked(id, |units| {
            let unit = sequential_unit(units, id)?;

            if unit.endfile != EndfileState::NoEndfile {
                unit.endfile = EndfileState::AfterEndfile;
                return Err(Error::EndOfFile(id));
            }

            if unit.mode == Mode::Writing {
                if unit.current_record != 0 {
                    unit.advance_record()?;
                }
                unit.truncate_here()?;
                unit.mode = Mode::Reading;
            }

            let pos = unit.stream.position();
            if pos >= unit.stream.len()? {
                unit.endfile = EndfileState::AfterEndfile;
                return Err(Error::EndOfFile(id));
            }

            let (record, next) = match unit.form {
                Form::Formatted => read_formatted(&mut *unit.stream, pos, chunk)?,
                Form::Unformatted => read_unformatted(&mut *unit.stream, pos)?,
            };
            unit.stream.seek(next)?;

            unit.last_record += 1;
            unit.current_record = 0;
            unit.position = Position::AsIs;

            event!(Level::TRACE, message = "record read", unit = id, from = pos, to = next);
            Ok(record)
        })
    }
}

impl Unit {
    /// Finishes the pending partial record, if any.
    pub(crate) fn advance_record(&mut self) -> io::Result<()> {
        if self.current_record == 0 {
            return Ok(());
        }
        if self.mode == Mode::Writing && self.form == Form::Formatted {
            self.stream.write(&[RECORD_TERMINATOR])?;
            self.last_record += 1;
        }
        self.current_record = 0;
        Ok(())
    }
}

fn sequential_unit(units: &mut UnitTable, id: UnitId) -> Result<&mut Unit> {
    let unit = units.get_mut(&id).ok_or(Error::BadUnit(id))?;
    if unit.access == Access::Direct {
        return Err(Error::BadOption("record transfer by record number is not supported"));
    }
    Ok(unit)
}

/// Reads forward from `pos` up to and including the next terminator.
///
/// Returns the record without its terminator and the offset just past it.
fn read_formatted<S: Stream + ?Sized>(stream: &mut S, pos: u64, chunk: usize) -> io::Result<(Vec<u8>, u64)> {
    let mut record = Vec::new();
    let mut at = pos;
    loop {
        let window = stream.read_at(at, chunk)?;
        if window.is_empty() {
            return Ok((record, at));
        }
        if let Some(i) = window.iter().position(|&b| b == RECORD_TERMINATOR) {
            record.extend_from_slice(&window[..i]);
            return Ok((record, at + i as u64 + 1));
        }
        record.extend_from_slice(&window);
        at += window.len() as u64;
    }
}

/// Reads the frame starting at `pos`, checking that header and footer agree.
///
/// Returns the payload and the offset just past the footer.
fn read_unformatted<S: Stream + ?Sized>(stream: &mut S, pos: u64) -> io::Result<(Vec<u8>, u64)> {
    let marker = MARKER_LEN as u64;
    let header = read_marker(stream, pos)?;

    let file_len = stream.len()?;
    let end = header.checked_add(2 * marker).and_then(|frame| pos.checked_add(frame));
    if end.is_none_or(|end| end > file_len) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "record frame extends past the end of the file"));
    }

    let payload_at = pos + marker;
    let payload_len = usize::try_from(header).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let payload = stream.read_at(payload_at, payload_len)?;
    if payload.len() != payload_len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read inside a record frame"));
    }

    let footer_at = payload_at + header;
    let footer = read_marker(stream, footer_at)?;
    if footer != header {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "record length header and footer disagree"));
    }

    Ok((payload, footer_at + marker))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

    use super::*;
    use crate::unit::UnitOptions;
    use crate::{ErrorKind, MemoryStream};

    fn runtime_with(form: Form, data: &[u8]) -> Runtime {
        let runtime = Runtime::builder().with_scan_chunk(3).build();
        runtime
            .open(1, MemoryStream::from_bytes(data), UnitOptions::new().form(form))
            .unwrap();
        runtime
    }

    #[test]
    fn formatted_records_round_trip() {
        let runtime = runtime_with(Form::Formatted, b"");
        runtime.write_record(1, b"alpha").unwrap();
        runtime.write_record(1, b"").unwrap();
        runtime.write_record(1, b"gamma").unwrap();
        runtime.rewind(1).unwrap();

        assert_eq!(runtime.read_record(1).unwrap(), b"alpha");
        assert_eq!(runtime.read_record(1).unwrap(), b"");
        assert_eq!(runtime.read_record(1).unwrap(), b"gamma");
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
        assert_eq!(runtime.inspect(1).unwrap().endfile, EndfileState::AfterEndfile);
    }

    #[test]
    fn unformatted_records_round_trip() {
        let runtime = runtime_with(Form::Unformatted, b"");
        runtime.write_record(1, b"\x00\x01\n\x02").unwrap();
        runtime.write_record(1, b"").unwrap();
        runtime.rewind(1).unwrap();

        assert_eq!(runtime.read_record(1).unwrap(), b"\x00\x01\n\x02");
        assert_eq!(runtime.read_record(1).unwrap(), b"");
        assert_eq!(runtime.inspect(1).unwrap().offset, 20 + 16);
    }

    #[test]
    fn final_unterminated_line_is_a_record() {
        let runtime = runtime_with(Form::Formatted, b"one\ntail");
        assert_eq!(runtime.read_record(1).unwrap(), b"one");
        assert_eq!(runtime.read_record(1).unwrap(), b"tail");
        assert_eq!(runtime.inspect(1).unwrap().offset, 8);
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
    }

    #[test]
    fn reading_at_endfile_moves_past_it() {
        let runtime = runtime_with(Form::Formatted, b"");
        assert_eq!(runtime.inspect(1).unwrap().endfile, EndfileState::AtEndfile);
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
        assert_eq!(runtime.inspect(1).unwrap().endfile, EndfileState::AfterEndfile);

        runtime.backspace(1).unwrap();
        assert_eq!(runtime.inspect(1).unwrap().endfile, EndfileState::AtEndfile);
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
    }

    #[test]
    fn partial_record_is_completed_by_next_write() {
        let runtime = runtime_with(Form::Formatted, b"");
        runtime.write_partial(1, b"ab").unwrap();
        runtime.write_partial(1, b"cd").unwrap();
        runtime.write_record(1, b"next").unwrap();
        runtime.rewind(1).unwrap();

        assert_eq!(runtime.read_record(1).unwrap(), b"abcd");
        assert_eq!(runtime.read_record(1).unwrap(), b"next");
    }

    #[test]
    fn partial_record_is_completed_by_read() {
        let runtime = runtime_with(Form::Formatted, b"");
        runtime.write_partial(1, b"ab").unwrap();
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
        let info = runtime.inspect(1).unwrap();
        assert_eq!(info.offset, 3);
        assert_eq!(info.last_record, 1);
        assert_eq!(info.mode, Mode::Reading);
    }

    #[test]
    fn read_after_write_ends_file_at_last_record() {
        let runtime = runtime_with(Form::Formatted, b"");
        for record in [&b"a"[..], &b"b"[..], &b"c"[..]] {
            runtime.write_record(1, record).unwrap();
        }
        runtime.rewind(1).unwrap();
        runtime.write_record(1, b"zz").unwrap();

        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
        runtime.rewind(1).unwrap();
        assert_eq!(runtime.read_record(1).unwrap(), b"zz");
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
    }

    #[test]
    fn read_after_unformatted_write_drops_stale_frames() {
        let runtime = runtime_with(Form::Unformatted, b"");
        runtime.write_record(1, b"first").unwrap();
        runtime.write_record(1, b"second").unwrap();
        runtime.rewind(1).unwrap();
        runtime.write_record(1, b"new").unwrap();

        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::EndOfFile);
        assert_eq!(runtime.inspect(1).unwrap().offset, 3 + 16);
    }

    #[test]
    fn write_partial_rejects_unformatted() {
        let runtime = runtime_with(Form::Unformatted, b"");
        let err = runtime.write_partial(1, b"ab").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadOption);
    }

    #[test]
    fn formatted_payload_with_terminator_is_rejected() {
        let runtime = runtime_with(Form::Formatted, b"");
        assert_eq!(runtime.write_record(1, b"a\nb").unwrap_err().kind(), ErrorKind::BadOption);
        assert_eq!(runtime.write_partial(1, b"\n").unwrap_err().kind(), ErrorKind::BadOption);
        assert_eq!(runtime.inspect(1).unwrap().offset, 0);
    }

    #[test]
    fn transfer_on_direct_access_is_rejected() {
        let runtime = Runtime::new();
        runtime
            .open(1, MemoryStream::new(), UnitOptions::new().access(Access::Direct))
            .unwrap();
        assert_eq!(runtime.write_record(1, b"x").unwrap_err().kind(), ErrorKind::BadOption);
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::BadOption);
    }

    #[test]
    fn transfer_on_unknown_unit_is_bad_unit() {
        let runtime = Runtime::new();
        assert_eq!(runtime.write_record(2, b"x").unwrap_err().kind(), ErrorKind::BadUnit);
        assert_eq!(runtime.read_record(2).unwrap_err().kind(), ErrorKind::BadUnit);
    }

    #[test]
    fn mismatched_footer_is_os_error() {
        let mut data = frame_record(b"abc");
        let last = data.len() - 1;
        data[last - 7] ^= 0xFF;
        data[last] ^= 0xFF;
        let runtime = runtime_with(Form::Unformatted, &data);
        let err = runtime.read_record(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Os);
    }

    #[test]
    fn truncated_frame_is_os_error() {
        let mut data = frame_record(b"abcdef");
        data.truncate(12);
        let runtime = runtime_with(Form::Unformatted, &data);
        assert_eq!(runtime.read_record(1).unwrap_err().kind(), ErrorKind::Os);
    }

    #[test]
    fn advance_record_without_pending_record_is_a_no_op() {
        let mut unit = Unit::new(1, Box::new(MemoryStream::new()), UnitOptions::new());
        unit.mode = Mode::Writing;
        unit.advance_record().unwrap();
        assert_eq!(unit.stream.position(), 0);
        assert_eq!(unit.last_record, 0);
    }
}
