// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::{Level, event};

use crate::error::{Error, ErrorSink, LogSink, Result};
use crate::scan::DEFAULT_SCAN_CHUNK;
use crate::stream::Stream;
use crate::unit::{EndfileState, Mode, Position, Unit, UnitId, UnitInfo, UnitOptions};

pub(crate) type UnitTable = HashMap<UnitId, Unit>;

/// The runtime context: a table of connected units guarded by one critical section.
///
/// Every operation on a `Runtime` locks the whole unit table for its duration, so the
/// operations are atomic with respect to each other even when the runtime is shared
/// between threads. Nothing is made atomic with respect to other processes touching
/// the same files.
///
/// Failed operations report their error to the runtime's [`ErrorSink`] exactly once
/// and then return it.
///
/// # Examples
///
/// ```
/// use seqpos::{MemoryStream, Runtime, UnitOptions};
///
/// # fn main() -> seqpos::Result<()> {
/// let runtime = Runtime::new();
/// runtime.open(10, MemoryStream::new(), UnitOptions::new())?;
///
/// runtime.write_record(10, b"first")?;
/// runtime.write_record(10, b"second")?;
/// runtime.backspace(10)?;
/// runtime.backspace(10)?;
///
/// assert_eq!(runtime.read_record(10)?, b"first");
/// # Ok(())
/// # }
/// ```
pub struct Runtime {
    units: Mutex<UnitTable>,
    sink: Box<dyn ErrorSink>,
    scan_chunk: usize,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Returns a builder for configuring a runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Number of bytes read per step when scanning backwards over formatted records.
    #[must_use]
    pub const fn scan_chunk(&self) -> usize {
        self.scan_chunk
    }

    /// Connects `stream` to unit `id`.
    ///
    /// The stream's cursor is placed at offset 0, or at its end for
    /// [`Position::Append`], in which case the unit starts just before its endfile
    /// record. An empty stream also starts just before its endfile record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOption`] if `id` is already connected, or [`Error::Os`] if the
    /// stream cannot be positioned.
    pub fn open(&self, id: UnitId, stream: impl Stream + 'static, options: UnitOptions) -> Result<()> {
        self.locked(id, |units| {
            if units.contains_key(&id) {
                return Err(Error::BadOption("unit is already connected"));
            }

            let mut unit = Unit::new(id, Box::new(stream), options);
            if unit.position == Position::Append {
                let end = unit.stream.len()?;
                unit.stream.seek(end)?;
                unit.endfile = EndfileState::AtEndfile;
            } else {
                unit.stream.seek(0)?;
                unit.retest_end_of_file()?;
            }

            event!(Level::DEBUG, message = "unit connected", unit = id, info = ?unit.info());
            let _ = units.insert(id, unit);
            Ok(())
        })
    }

    /// Disconnects unit `id`, flushing and dropping its stream.
    ///
    /// If the unit was writing, the stream is also truncated at the cursor, so the last
    /// record written is the last record of the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadUnit`] if `id` is not connected, or [`Error::Os`] if the final
    /// flush or truncate fails. The unit is disconnected either way.
    pub fn close(&self, id: UnitId) -> Result<()> {
        self.locked(id, |units| {
            let mut unit = units.remove(&id).ok_or(Error::BadUnit(id))?;
            if unit.mode == Mode::Writing {
                unit.truncate_here()?;
            } else {
                unit.stream.flush()?;
            }
            event!(Level::DEBUG, message = "unit disconnected", unit = id);
            Ok(())
        })
    }

    /// Returns `true` if unit `id` is connected.
    #[must_use]
    pub fn is_connected(&self, id: UnitId) -> bool {
        self.units.lock().contains_key(&id)
    }

    /// Returns a snapshot of unit `id`'s positioning state, or `None` if it is not
    /// connected.
    #[must_use]
    pub fn inspect(&self, id: UnitId) -> Option<UnitInfo> {
        self.units.lock().get(&id).map(Unit::info)
    }

    /// Runs `op` inside the critical section and reports a failure to the sink.
    ///
    /// The guard is released when this returns, on every path.
    pub(crate) fn locked<T>(&self, id: UnitId, op: impl FnOnce(&mut UnitTable) -> Result<T>) -> Result<T> {
        let mut units = self.units.lock();
        let result = op(&mut units);
        if let Err(error) = &result {
            self.sink.report(id, error);
        }
        result
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("units", &self.units.lock().len())
            .field("scan_chunk", &self.scan_chunk)
            .finish_non_exhaustive()
    }
}

/// Collects configuration for a [`Runtime`].
///
/// # Examples
///
/// ```
/// use seqpos::{LogSink, Runtime};
///
/// let runtime = Runtime::builder().with_scan_chunk(512).with_error_sink(LogSink).build();
/// assert_eq!(runtime.scan_chunk(), 512);
/// ```
pub struct RuntimeBuilder {
    scan_chunk: usize,
    sink: Box<dyn ErrorSink>,
}

impl RuntimeBuilder {
    /// Creates a builder with a 4 KiB scan chunk and a [`LogSink`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            scan_chunk: DEFAULT_SCAN_CHUNK,
            sink: Box::new(LogSink),
        }
    }

    /// Sets how many bytes the formatted backward scan reads per step.
    ///
    /// Larger chunks mean fewer reads but more wasted bytes when records are short.
    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_scan_chunk(mut self, chunk: usize) -> Self {
        self.scan_chunk = chunk.max(1);
        self
    }

    /// Sets where failed operations are reported.
    #[must_use]
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Builds the runtime.
    #[must_use]
    pub fn build(self) -> Runtime {
        Runtime {
            units: Mutex::new(HashMap::new()),
            sink: self.sink,
            scan_chunk: self.scan_chunk,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("scan_chunk", &self.scan_chunk)
            .finish_non_exhaustive()
    }
}
