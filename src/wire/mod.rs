//! Wire exchange abstraction
//!
//! This module handles:
//! * The [`Exchange`] trait the connection drives (send request, receive reply)
//! * Transport-level error classification ([`WireError`])
//! * A scripted exchange for driving a connection without a server
//!
//! A real driver plugs a socket-backed codec in here; this crate only
//! requires the two-way classification of failures the connection's contract
//! depends on: transport-broken versus server-rejected.

mod script;

pub use script::ScriptedExchange;

use crate::protocol::{Request, Response};

/// Failure reported by an exchange implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    /// The transport broke mid-operation; no further traffic is possible
    #[error("transport broken: {0}")]
    Broken(String),

    /// The server explicitly declined the request; the conversation
    /// continues
    #[error("server failure [{code}]: {message}")]
    Rejected {
        /// Server-assigned failure code
        code: String,
        /// Human-readable message
        message: String,
    },
}

/// One structured request/response conversation with a server.
///
/// Implementations own framing, encoding, and socket I/O. Calls are made
/// strictly in order by a single owner; an exchange never needs to be `Sync`.
/// Cancellation and deadlines are the implementation's business (e.g. a
/// socket read timeout), not signalled per call.
#[async_trait::async_trait]
pub trait Exchange: Send {
    /// Send one request.
    async fn send(&mut self, request: Request) -> Result<(), WireError>;

    /// Receive the next reply.
    async fn recv(&mut self) -> Result<Response, WireError>;
}
