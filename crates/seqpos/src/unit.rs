// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::stream::Stream;

/// Identifies a connected unit within a [`Runtime`](crate::Runtime).
pub type UnitId = u32;

/// How records of a unit are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// Records are read and written in order.
    #[default]
    Sequential,
    /// Records are addressed by record number.
    Direct,
}

/// How records of a unit are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Form {
    /// Text records, each terminated by `b'\n'`.
    #[default]
    Formatted,
    /// Binary records framed by a length header and an identical length footer.
    Unformatted,
}

/// Direction of the last transfer on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// The last transfer was a read, or the unit was just positioned.
    #[default]
    Reading,
    /// The last transfer was a write.
    Writing,
}

/// Where a unit stands relative to its endfile record.
///
/// `AfterEndfile` is virtual: it is recorded when a unit hits or writes the end of the
/// file, and is consumed by a single backspace without touching the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndfileState {
    /// Not at the end of the file.
    #[default]
    NoEndfile,
    /// Positioned just before the endfile record.
    AtEndfile,
    /// Positioned just past the endfile record.
    AfterEndfile,
}

/// Last known logical position, as reported by inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    /// Unspecified; the unit has been transferred on since it was last positioned.
    #[default]
    AsIs,
    /// At the initial point of the file.
    Rewind,
    /// At the terminal point of the file.
    Append,
}

/// Options supplied when connecting a stream to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitOptions {
    access: Access,
    form: Form,
    position: Position,
}

impl UnitOptions {
    /// Formatted sequential access, positioned at the start of the file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            access: Access::Sequential,
            form: Form::Formatted,
            position: Position::AsIs,
        }
    }

    /// Sets the access method.
    #[must_use]
    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Sets the record form.
    #[must_use]
    pub const fn form(mut self, form: Form) -> Self {
        self.form = form;
        self
    }

    /// Sets the initial position. [`Position::Append`] places the cursor at the end of
    /// the file.
    #[must_use]
    pub const fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// One connected unit: a stream plus its positioning state.
///
/// Units live in the runtime's unit table and are only reachable while its critical
/// section is held.
pub(crate) struct Unit {
    pub(crate) id: UnitId,
    pub(crate) access: Access,
    pub(crate) form: Form,
    pub(crate) mode: Mode,
    pub(crate) endfile: EndfileState,
    pub(crate) current_record: u64,
    pub(crate) last_record: u64,
    pub(crate) position: Position,
    pub(crate) stream: Box<dyn Stream>,
}

impl Unit {
    pub(crate) fn new(id: UnitId, stream: Box<dyn Stream>, options: UnitOptions) -> Self {
        Self {
            id,
            access: options.access,
            form: options.form,
            mode: Mode::Reading,
            endfile: EndfileState::NoEndfile,
            current_record: 0,
            last_record: 0,
            position: options.position,
            stream,
        }
    }

    /// Takes a copy of the unit's state for inquiry.
    pub(crate) fn info(&self) -> UnitInfo {
        UnitInfo {
            access: self.access,
            form: self.form,
            mode: self.mode,
            endfile: self.endfile,
            current_record: self.current_record,
            last_record: self.last_record,
            position: self.position,
            offset: self.stream.position(),
        }
    }

    /// Makes everything written so far the definitive content of the file by flushing
    /// and cutting the stream at the cursor.
    pub(crate) fn truncate_here(&mut self) -> std::io::Result<()> {
        self.stream.flush()?;
        self.stream.truncate()
    }

    /// Marks the unit as sitting just before its endfile record if the cursor is at the
    /// physical end of the stream.
    pub(crate) fn retest_end_of_file(&mut self) -> std::io::Result<()> {
        if self.endfile == EndfileState::NoEndfile && self.stream.len()? == self.stream.position() {
            self.endfile = EndfileState::AtEndfile;
        }
        Ok(())
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("info", &self.info())
            .finish_non_exhaustive()
    }
}

/// A snapshot of a unit's positioning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct UnitInfo {
    /// Access method fixed at connection.
    pub access: Access,
    /// Record form fixed at connection.
    pub form: Form,
    /// Direction of the last transfer.
    pub mode: Mode,
    /// Endfile state machine.
    pub endfile: EndfileState,
    /// Nonzero while a partial record is pending.
    pub current_record: u64,
    /// Records transferred since the last rewind.
    pub last_record: u64,
    /// Last known logical position.
    pub position: Position,
    /// Current stream offset.
    pub offset: u64,
}
