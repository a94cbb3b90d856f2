// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use thiserror::Error;
use tracing::{Level, event};

use crate::unit::UnitId;

/// An error raised by a positioning or record transfer operation.
///
/// Every error returned from a [`Runtime`](crate::Runtime) operation has already been
/// passed to the runtime's [`ErrorSink`] exactly once. Callers may inspect it further or
/// simply discard it.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying stream failed a read, write, seek, flush or truncate, or the
    /// bytes on disk do not form a valid record.
    ///
    /// After this error the stream offset is not guaranteed to sit on a record boundary.
    #[error(transparent)]
    Os(#[from] std::io::Error),

    /// The unit identifier is not connected to a stream.
    #[error("unit {0} is not connected")]
    BadUnit(UnitId),

    /// The operation is not valid for the unit it was applied to.
    #[error("{0}")]
    BadOption(&'static str),

    /// A read reached the end of the file.
    #[error("end of file on unit {0}")]
    EndOfFile(UnitId),
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Os(_) => ErrorKind::Os,
            Self::BadUnit(_) => ErrorKind::BadUnit,
            Self::BadOption(_) => ErrorKind::BadOption,
            Self::EndOfFile(_) => ErrorKind::EndOfFile,
        }
    }
}

/// Classification of an [`Error`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::Os`].
    Os,
    /// See [`Error::BadUnit`].
    BadUnit,
    /// See [`Error::BadOption`].
    BadOption,
    /// See [`Error::EndOfFile`].
    EndOfFile,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Os => "os error",
            Self::BadUnit => "bad unit",
            Self::BadOption => "bad option",
            Self::EndOfFile => "end of file",
        };
        f.write_str(name)
    }
}

/// A specialized `Result` for positioning and record transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a positioning error as a standard I/O error.
///
/// Stream failures are unwrapped back into the original I/O error; everything else
/// is mapped to the closest [`std::io::ErrorKind`].
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Os(error) => error,
            Error::EndOfFile(_) => Self::new(std::io::ErrorKind::UnexpectedEof, value),
            Error::BadUnit(_) => Self::new(std::io::ErrorKind::NotFound, value),
            Error::BadOption(_) => Self::new(std::io::ErrorKind::InvalidInput, value),
        }
    }
}

/// Receives every error raised by a [`Runtime`](crate::Runtime) operation.
///
/// The runtime calls [`report`](Self::report) once per failed operation, while still
/// holding its critical section, before returning the error to the caller. Successful
/// operations and no-op outcomes never reach the sink.
///
/// The critical section is not reentrant: a sink that calls back into the same
/// [`Runtime`](crate::Runtime), even just [`inspect`](crate::Runtime::inspect),
/// deadlocks.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    /// Records a failed operation on `unit`.
    fn report(&self, unit: UnitId, error: &Error);
}

impl<T: ErrorSink + ?Sized> ErrorSink for std::sync::Arc<T> {
    fn report(&self, unit: UnitId, error: &Error) {
        (**self).report(unit, error);
    }
}

/// The default [`ErrorSink`]: emits each error as a `tracing` event at `ERROR` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, unit: UnitId, error: &Error) {
        event!(
            Level::ERROR,
            message = "record positioning failed",
            unit,
            kind = %error.kind(),
            error = %error,
        );
    }
}
