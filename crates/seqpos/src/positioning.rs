// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The file positioning statements: BACKSPACE, ENDFILE, REWIND and FLUSH.

use tracing::{Level, event};

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::scan::{formatted_backspace, unformatted_backspace};
use crate::unit::{Access, EndfileState, Form, Mode, Position, UnitId};

impl Runtime {
    /// Moves unit `id` back by one record.
    ///
    /// - On a direct-access unit this does nothing.
    /// - Just past the endfile record, it steps back over that record only: the unit is
    ///   left just before it and the stream is not touched.
    /// - At the start of the file it does nothing.
    ///
    /// Otherwise, if the unit was writing, everything up to the cursor becomes the
    /// definitive content of the file (the stream is flushed and truncated there) and the
    /// unit switches to reading. The cursor is then moved to the start of the previous
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadUnit`] if `id` is not connected, or [`Error::Os`] if the stream
    /// cannot be read or repositioned. After an [`Error::Os`] the cursor is not guaranteed
    /// to be on a record boundary.
    pub fn backspace(&self, id: UnitId) -> Result<()> {
        let chunk = self.scan_chunk();
        self.locked(id, |units| {
            let unit = units.get_mut(&id).ok_or(Error::BadUnit(id))?;

            if unit.access == Access::Direct {
                event!(Level::DEBUG, message = "backspace ignored on direct access", unit = id);
                return Ok(());
            }

            if unit.endfile == EndfileState::AfterEndfile {
                unit.endfile = EndfileState::AtEndfile;
                event!(Level::DEBUG, message = "backspace over endfile record", unit = id);
                return Ok(());
            }

            let pos = unit.stream.position();
            if pos == 0 {
                event!(Level::DEBUG, message = "backspace at start of file", unit = id);
                return Ok(());
            }

            if unit.mode == Mode::Writing {
                unit.truncate_here()?;
                unit.mode = Mode::Reading;
            }

            let target = match unit.form {
                Form::Formatted => formatted_backspace(&mut *unit.stream, pos, chunk)?,
                Form::Unformatted => unformatted_backspace(&mut *unit.stream, pos)?,
            };
            unit.stream.seek(target)?;

            unit.last_record = unit.last_record.saturating_sub(1);
            unit.endfile = EndfileState::NoEndfile;
            unit.current_record = 0;

            event!(Level::DEBUG, message = "backspace", unit = id, from = pos, to = target);
            Ok(())
        })
    }

    /// Writes an endfile record on unit `id`.
    ///
    /// A pending partial record is completed first. The stream is then flushed and
    /// truncated at the cursor, so the cursor becomes the end of the file, and the unit
    /// is left just past the endfile record.
    ///
    /// Does nothing if `id` is not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Os`] if completing the pending record, flushing or truncating
    /// fails.
    pub fn endfile(&self, id: UnitId) -> Result<()> {
        self.locked(id, |units| {
            let Some(unit) = units.get_mut(&id) else {
                return Ok(());
            };

            if unit.current_record != 0 {
                unit.advance_record()?;
            }

            unit.truncate_here()?;
            unit.endfile = EndfileState::AfterEndfile;

            event!(Level::DEBUG, message = "endfile", unit = id, at = unit.stream.position());
            Ok(())
        })
    }

    /// Positions unit `id` at the start of its file.
    ///
    /// If the unit was writing, the stream is flushed and truncated at the cursor first,
    /// so the last record written becomes the last record of the file. The unit is left
    /// reading, so rewinding twice in a row keeps the file content intact.
    ///
    /// Does nothing if `id` is not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOption`] if the unit is not sequential (the unit is left
    /// unchanged), or [`Error::Os`] if the stream cannot be flushed, truncated or
    /// repositioned.
    pub fn rewind(&self, id: UnitId) -> Result<()> {
        self.locked(id, |units| {
            let Some(unit) = units.get_mut(&id) else {
                return Ok(());
            };

            if unit.access != Access::Sequential {
                return Err(Error::BadOption("cannot rewind a direct-access unit"));
            }

            if unit.mode == Mode::Writing {
                unit.truncate_here()?;
            }
            unit.mode = Mode::Reading;
            unit.last_record = 0;
            unit.stream.seek(0)?;

            unit.endfile = EndfileState::NoEndfile;
            unit.current_record = 0;
            unit.retest_end_of_file()?;
            unit.position = Position::Rewind;

            event!(Level::DEBUG, message = "rewind", unit = id, endfile = ?unit.endfile);
            Ok(())
        })
    }

    /// Flushes buffered output of unit `id` to the underlying storage.
    ///
    /// No positioning state changes. Does nothing if `id` is not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Os`] if the flush fails.
    pub fn flush(&self, id: UnitId) -> Result<()> {
        self.locked(id, |units| {
            if let Some(unit) = units.get_mut(&id) {
                unit.stream.flush()?;
                event!(Level::DEBUG, message = "flush", unit = id);
            }
            Ok(())
        })
    }
}
