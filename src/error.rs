//! Error taxonomy
//!
//! Each variant is a distinct failure *kind* with its own retry semantics.
//! The connection never swallows an error and never retries; classification
//! here is what lets the session/pool layer decide between "safe to retry"
//! and "must not retry".

use thiserror::Error;

/// Driver connection error
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying transport failed mid-operation. The connection reports
    /// not-alive afterwards and must be discarded, never retried on.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server explicitly declined a request (bad transaction state,
    /// constraint violation, syntax error). The connection remains usable.
    #[error("server rejected request [{code}]: {message}")]
    ServerRejected {
        /// Server-assigned failure code
        code: String,
        /// Human-readable message
        message: String,
    },

    /// Ambiguous commit outcome: the transaction may or may not have
    /// committed server-side. At-most-once semantics — the caller must not
    /// blindly retry, and the connection is no longer reusable.
    #[error("commit outcome unknown: {0}")]
    CommitFailed(String),

    /// Failure while reading or buffering results. Poisons the owning stream
    /// and, if inside a transaction, the transaction.
    #[error("result stream failed: {0}")]
    Stream(String),

    /// The target server does not support or refuses routing queries (e.g. a
    /// standalone instance). Callers fall back to direct addressing.
    #[error("routing unavailable: {0}")]
    RoutingUnavailable(String),

    /// Operation is illegal in the connection's current state (query before
    /// begin, second begin, read past the terminal summary, stale handle).
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        /// What the operation required
        expected: String,
        /// What the connection was doing instead
        actual: String,
    },

    /// Operation on a connection that has been closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    pub(crate) fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
