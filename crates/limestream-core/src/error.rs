//! Error types for limestream.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Configuration, resource, transport and
//! invalid-argument failures are all captured here.
//!
//! Read and write timeouts on the streaming engine are *not* errors: a
//! timed-out `read`/`write` returns `Ok` with fewer samples than requested.
//! [`Error::Timeout`] is only produced by transport-level waits.

use crate::types::Direction;

/// The error type for all limestream operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error on the control or bulk data path.
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed sample packet, bad header field).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the transport.
    #[error("timeout waiting for transport")]
    Timeout,

    /// An invalid argument or configuration value was supplied.
    ///
    /// Covers bad channel ids, zero buffer lengths, zero channel counts and
    /// burst lengths that cannot fit the ring buffer.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The engine has not been initialized (or was destroyed).
    #[error("engine not initialized")]
    NotInitialized,

    /// `init` was called on an engine that is already initialized.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// Sample buffer memory could not be allocated.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// A streaming direction stopped after exhausting its transport retry
    /// budget. Reported by the next `read` (RX) or `write` (TX) call.
    #[error("{direction} stream failed: {reason}")]
    StreamFailed {
        /// The direction whose worker failed.
        direction: Direction,
        /// The last transport error observed by the worker.
        reason: String,
    },

    /// No device is connected on the port.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
