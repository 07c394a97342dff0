//! Error types for the driver core.
use bson;
use connstring::Host;
use std::{error, fmt, io, sync};

/// A type for results generated by the driver core.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The error type for all driver operations.
#[derive(Debug)]
pub enum Error {
    /// The user tried to perform an operation with invalid arguments.
    ArgumentError(String),
    /// The server returned a non-ok command reply; carries the server's
    /// error payload.
    OperationError(String),
    /// The server's response could not be interpreted.
    ResponseError(String),
    /// A cursor-bearing reply did not contain a well-formed cursor.
    CursorNotFoundError,
    /// An I/O error occurred while dialing or exchanging messages.
    IoError(io::Error),
    /// A BSON document could not be serialized.
    EncoderError(bson::EncoderError),
    /// A BSON document could not be deserialized.
    DecoderError(bson::DecoderError),
    /// A lock was poisoned by a panicking thread.
    PoisonLockError,
    /// An authentication handshake round failed; the connection involved
    /// must not be reused.
    AuthenticationError(String),
    /// An authentication mechanism name is not supported by this driver.
    UnsupportedMechanism(String),
    /// No server matched the selector within the selection deadline. The
    /// last error observed for each known server is attached for
    /// diagnostics.
    SelectionTimeoutError {
        message: String,
        server_errors: Vec<(Host, String)>,
    },
    /// Several errors occurred during one logical operation, such as a
    /// cursor close that failed after iteration had already failed.
    CombinedError(Vec<Error>),
    /// A catch-all for errors that fit no other variant.
    DefaultError(String),
}

impl<'a> From<&'a str> for Error {
    fn from(s: &str) -> Error {
        Error::DefaultError(s.to_owned())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::DefaultError(s)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<bson::EncoderError> for Error {
    fn from(err: bson::EncoderError) -> Error {
        Error::EncoderError(err)
    }
}

impl From<bson::DecoderError> for Error {
    fn from(err: bson::DecoderError) -> Error {
        Error::DecoderError(err)
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::PoisonLockError
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ArgumentError(ref inner) => inner.fmt(fmt),
            Error::OperationError(ref inner) => inner.fmt(fmt),
            Error::ResponseError(ref inner) => inner.fmt(fmt),
            Error::CursorNotFoundError => write!(fmt, "No cursor found in the command reply."),
            Error::IoError(ref inner) => inner.fmt(fmt),
            Error::EncoderError(ref inner) => inner.fmt(fmt),
            Error::DecoderError(ref inner) => inner.fmt(fmt),
            Error::PoisonLockError => write!(fmt, "Lock poisoned by a panicking thread."),
            Error::AuthenticationError(ref inner) => inner.fmt(fmt),
            Error::UnsupportedMechanism(ref mechanism) => {
                write!(fmt, "Unsupported authentication mechanism: {}", mechanism)
            }
            Error::SelectionTimeoutError { ref message, ref server_errors } => {
                write!(fmt, "{}", message)?;
                for &(ref host, ref err) in server_errors {
                    write!(fmt, " [{}: {}]", host, err)?;
                }
                Ok(())
            }
            Error::CombinedError(ref errors) => {
                let strings: Vec<String> = errors.iter().map(|e| format!("{}", e)).collect();
                write!(fmt, "{}", strings.join("; "))
            }
            Error::DefaultError(ref inner) => inner.fmt(fmt),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::ArgumentError(ref inner) |
            Error::OperationError(ref inner) |
            Error::ResponseError(ref inner) |
            Error::AuthenticationError(ref inner) |
            Error::DefaultError(ref inner) => inner,
            Error::CursorNotFoundError => "No cursor found in the command reply",
            Error::IoError(ref inner) => inner.description(),
            Error::EncoderError(ref inner) => inner.description(),
            Error::DecoderError(ref inner) => inner.description(),
            Error::PoisonLockError => "Lock poisoned by a panicking thread",
            Error::UnsupportedMechanism(_) => "Unsupported authentication mechanism",
            Error::SelectionTimeoutError { ref message, .. } => message,
            Error::CombinedError(_) => "Multiple errors occurred",
        }
    }

    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::IoError(ref inner) => Some(inner),
            Error::EncoderError(ref inner) => Some(inner),
            Error::DecoderError(ref inner) => Some(inner),
            Error::CombinedError(ref errors) => errors.first().map(|e| e as &error::Error),
            _ => None,
        }
    }
}
