// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Record positioning for sequential record files.
//!
//! This crate implements the four file positioning statements of a record-oriented
//! language runtime: **BACKSPACE**, **ENDFILE**, **REWIND** and **FLUSH**. Files are
//! treated as ordered sequences of records rather than byte streams, in one of two
//! encodings:
//!
//! - **Formatted** records are text lines, each terminated by `b'\n'`.
//! - **Unformatted** records are binary blocks framed by their payload length, written
//!   once before and once after the payload as a native-endian `u64`:
//!
//!   ```text
//!   [length: 8 bytes][payload: length bytes][length: 8 bytes]
//!   ```
//!
//! Moving forward over records is easy; moving back is the interesting part. A
//! backspace over formatted records scans backwards in fixed-size chunks for the
//! previous terminator, while a backspace over unformatted records reads the length
//! footer of the previous record and jumps over the whole frame.
//!
//! # Units
//!
//! All state lives in a [`Runtime`], which maps numeric [`UnitId`]s to connected
//! streams. Each unit remembers its access method, record form, transfer direction,
//! endfile state and record counters. Streams are anything implementing [`Stream`];
//! [`MemoryStream`] and [`FileStream`] are provided.
//!
//! ```
//! use seqpos::{Form, MemoryStream, Runtime, UnitOptions};
//!
//! # fn main() -> seqpos::Result<()> {
//! let runtime = Runtime::new();
//! runtime.open(7, MemoryStream::new(), UnitOptions::new().form(Form::Unformatted))?;
//!
//! runtime.write_record(7, &[1, 2, 3])?;
//! runtime.write_record(7, &[4, 5])?;
//!
//! // Backspacing while writing makes what was written the end of the file.
//! runtime.backspace(7)?;
//! assert_eq!(runtime.read_record(7)?, [4, 5]);
//!
//! runtime.rewind(7)?;
//! assert_eq!(runtime.read_record(7)?, [1, 2, 3]);
//! # Ok(())
//! # }
//! ```
//!
//! # The endfile record
//!
//! A unit is either away from the end of its file, just before the endfile record, or
//! just past it (see [`EndfileState`]). [`Runtime::endfile`] truncates the file at the
//! cursor and leaves the unit just past the endfile record. That position is virtual:
//! a following [`Runtime::backspace`] only steps back over the endfile record and does
//! not move the stream.
//!
//! ```
//! use seqpos::{EndfileState, MemoryStream, Runtime, UnitOptions};
//!
//! # fn main() -> seqpos::Result<()> {
//! let runtime = Runtime::new();
//! runtime.open(1, MemoryStream::new(), UnitOptions::new())?;
//! runtime.write_record(1, b"only")?;
//! runtime.endfile(1)?;
//!
//! runtime.backspace(1)?;
//! let info = runtime.inspect(1).expect("unit is connected");
//! assert_eq!(info.endfile, EndfileState::AtEndfile);
//! assert_eq!(info.offset, 5);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every operation returns a [`Result`]. Failures are also passed once to the
//! runtime's [`ErrorSink`], which defaults to logging through `tracing`. Operations
//! that have nothing to do, such as a backspace at the start of a file, succeed
//! without reporting anything.
//!
//! # Thread safety
//!
//! A [`Runtime`] is `Send + Sync`. Each operation holds the runtime's lock for its
//! whole duration, so operations issued from different threads never interleave.

pub use crate::error::{Error, ErrorKind, ErrorSink, LogSink, Result};
pub use crate::file_stream::FileStream;
pub use crate::memory_stream::MemoryStream;
pub use crate::runtime::{Runtime, RuntimeBuilder};
pub use crate::scan::{
    DEFAULT_SCAN_CHUNK, MARKER_LEN, RECORD_TERMINATOR, formatted_backspace, frame_record, unformatted_backspace,
};
pub use crate::stream::Stream;
pub use crate::unit::{Access, EndfileState, Form, Mode, Position, UnitId, UnitInfo, UnitOptions};

mod error;
mod file_stream;
mod memory_stream;
mod positioning;
mod record;
mod runtime;
mod scan;
mod stream;
mod unit;
