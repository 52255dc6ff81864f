//! Connection-level state machine for a Bolt-family graph database driver.
//!
//! This crate implements the stateful contract a driver uses to talk to a
//! single graph-database server connection: transaction lifecycle, query
//! execution, result streaming, routing-table discovery, and connection
//! health/reset. It sits below a session API and above a transport; the
//! transport is abstracted as a structured request/response [`wire::Exchange`]
//! so that pools and tests can drive a real [`Connection`] without a server.
//!
//! A [`Connection`] is one sequential wire conversation. It is driven through
//! `&mut self` methods by exactly one owner at a time; concurrency lives in
//! the pool layer above, never here. The connection never retries an
//! operation internally — every failure is returned to the caller, classified
//! by [`Error`] variant so the caller can tell "safe to retry" from "must not
//! retry".
//!
//! # Example
//!
//! ```no_run
//! # async fn example(exchange: Box<dyn bolt_conn::wire::Exchange>) -> bolt_conn::Result<()> {
//! use bolt_conn::{Connection, db::{Command, TxConfig, AccessMode}};
//!
//! let mut conn = Connection::new(exchange, "server-1", "5.12.0", 1);
//! let tx = conn.tx_begin(TxConfig::new(AccessMode::Write)).await?;
//! let stream = conn.run_tx(tx, Command::new("CREATE (n:Node) RETURN n")).await?;
//! conn.buffer(stream).await?;
//! conn.tx_commit(tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod db;
pub mod error;
pub mod protocol;
pub mod wire;

pub use connection::{Connection, ConnectionState, StreamItem};
pub use error::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
