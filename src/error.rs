//! Library-wide error taxonomy.
use bson::{DecoderError, EncoderError, oid};

use std::{error, fmt, io, result, sync};

/// A type for results generated by the driver.
pub type Result<T> = result::Result<T, Error>;

/// The error type for driver operations.
///
/// `CursorNotFound`, `QueryFailure`, and `WriteFailure` are protocol-level
/// failures reported by the server; the connection remains usable after any
/// of them. `IoError` means the byte channel itself broke and is propagated
/// unchanged from the socket layer.
#[derive(Debug)]
pub enum Error {
    /// A malformed argument was given to a driver call.
    ArgumentError(String),
    /// The server no longer knows the requested cursor id.
    CursorNotFound(i64),
    /// The server rejected a query; carries the server's `$err` message.
    QueryFailure(String),
    /// A confirmed write failed; carries the server's error code and `err`
    /// message from `getLastError`.
    WriteFailure(i32, String),
    /// The underlying connection failed.
    IoError(io::Error),
    /// A document could not be serialized to BSON.
    EncoderError(EncoderError),
    /// A reply payload could not be deserialized from BSON.
    DecoderError(DecoderError),
    /// An ObjectId could not be generated.
    OidError(oid::Error),
    /// The server sent a response the driver could not use.
    ResponseError(String),
    /// A driver lock was poisoned by a panicking thread.
    PoisonLockError,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ArgumentError(ref inner) => inner.fmt(fmt),
            Error::CursorNotFound(id) => write!(fmt, "The server has no cursor with id {}.", id),
            Error::QueryFailure(ref msg) => write!(fmt, "The server failed the query: {}", msg),
            Error::WriteFailure(code, ref msg) => {
                write!(fmt, "The write failed (code {}): {}", code, msg)
            }
            Error::IoError(ref inner) => inner.fmt(fmt),
            Error::EncoderError(ref inner) => inner.fmt(fmt),
            Error::DecoderError(ref inner) => inner.fmt(fmt),
            Error::OidError(ref inner) => inner.fmt(fmt),
            Error::ResponseError(ref inner) => inner.fmt(fmt),
            Error::PoisonLockError => fmt.write_str("Lock poisoned by a panicking thread."),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(error::Error + 'static)> {
        match *self {
            Error::IoError(ref inner) => Some(inner),
            Error::EncoderError(ref inner) => Some(inner),
            Error::DecoderError(ref inner) => Some(inner),
            Error::OidError(ref inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<EncoderError> for Error {
    fn from(err: EncoderError) -> Error {
        Error::EncoderError(err)
    }
}

impl From<DecoderError> for Error {
    fn from(err: DecoderError) -> Error {
        Error::DecoderError(err)
    }
}

impl From<oid::Error> for Error {
    fn from(err: oid::Error) -> Error {
        Error::OidError(err)
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::PoisonLockError
    }
}
