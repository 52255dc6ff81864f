//! Protocol message types
//!
//! Structured requests and replies exchanged with the server. The on-wire
//! byte encoding lives below the [`crate::wire::Exchange`] boundary and is
//! not this crate's concern; these types are the shapes an exchange
//! implementation must carry.

use crate::db::{Command, Metadata, TxConfig};
use serde_json::Value;
use std::collections::HashMap;

/// Request (client → server)
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Open an explicit transaction
    Begin {
        /// Declared transaction parameters
        config: TxConfig,
        /// Target database (empty = server default)
        database: String,
    },

    /// Commit the open transaction
    Commit,

    /// Roll back the open transaction
    Rollback,

    /// Run an auto-commit query
    Run {
        /// Query and parameters
        command: Command,
        /// Declared transaction parameters for the implicit transaction
        config: TxConfig,
        /// Target database (empty = server default)
        database: String,
    },

    /// Run a query inside the open explicit transaction
    RunInTx {
        /// Query and parameters
        command: Command,
    },

    /// Request all records of the current result
    PullAll,

    /// Ask the server to drop the current result without transmitting records
    DiscardAll,

    /// Clear all server-side transaction/query state
    Reset,

    /// Announce connection shutdown; no reply follows
    Goodbye,

    /// Fetch the routing table for a database
    Route {
        /// Routing context passed through from the connection URI
        context: HashMap<String, String>,
        /// Bookmarks the routing query must observe
        bookmarks: Vec<String>,
        /// Database to route for (empty = server default)
        database: String,
        /// User to impersonate for database resolution, if any
        impersonated_user: Option<String>,
    },
}

/// Reply (server → client)
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Request succeeded; metadata depends on the request:
    /// `fields` after a run, `bookmark`/`stats` after a commit or at the end
    /// of a stream, `rt` after a route.
    Success(Metadata),

    /// One row of result data
    Record(Vec<Value>),
}

impl Response {
    /// Success reply with empty metadata
    pub fn success() -> Self {
        Response::Success(Metadata::new())
    }

    /// Success reply carrying the given metadata object.
    ///
    /// Panics if `metadata` is not a JSON object; callers build it with
    /// `serde_json::json!({..})`.
    pub fn success_with(metadata: Value) -> Self {
        match metadata {
            Value::Object(map) => Response::Success(map),
            other => panic!("success metadata must be an object, got {other}"),
        }
    }
}
