//! The crate-wide failure taxonomy.

use std::io;

/// Why an operation failed.
///
/// Every rejection in this crate carries a `Fault`. The type is `Clone`
/// because a settled promise hands each of its observers its own copy of the
/// outcome; for the same reason I/O errors are captured as a kind plus a
/// message rather than the non-cloneable [`std::io::Error`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    /// The default cancellation reason.
    #[error("operation was cancelled")]
    Cancelled,

    /// A deadline elapsed before the operation settled.
    #[error("operation timed out")]
    Timeout,

    /// The result of a promise was queried while it was still pending.
    #[error("promise has not settled yet")]
    Unresolved,

    /// A promise was resolved with itself, directly or through a chain.
    #[error("promise resolution forms a cycle")]
    CircularReference,

    /// Misuse at the API boundary.
    #[error("logic error: {0}")]
    Logic(&'static str),

    /// Aggregate failure from a combinator, keyed by operand.
    #[error("{0:?}")]
    Multi(Vec<(String, Fault)>),

    /// A second read was requested while one was already pending.
    #[error("a read is already pending")]
    Busy,

    /// The stream cannot be read from.
    #[error("stream is not readable")]
    Unreadable,

    /// The stream cannot be written to.
    #[error("stream is not writable")]
    Unwritable,

    /// The stream was closed while the operation was pending.
    #[error("stream is closed")]
    Closed,

    /// An underlying system call failed.
    #[error("i/o failure: {message}")]
    Io {
        /// The kind reported by the operating system.
        kind: io::ErrorKind,
        /// Human-readable description of the failure.
        message: String,
    },
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Fault::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
