//! Domain data model shared by the connection and the session layer above it

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Metadata mapping attached to requests and success replies
pub type Metadata = serde_json::Map<String, Value>;

/// Transaction access mode
///
/// Drives server-side routing: `Read` transactions may be served by read
/// replicas, `Write` transactions must reach a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read-only transaction
    Read,
    /// Read-write transaction
    Write,
}

/// Declared parameters of a transaction (explicit or auto-commit)
///
/// Recorded verbatim on BEGIN/RUN so the server can enforce causal
/// consistency (bookmarks) and so callers can inspect what was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxConfig {
    /// Access mode
    pub mode: AccessMode,
    /// Causal-ordering tokens from prior transactions this one must observe
    pub bookmarks: Vec<String>,
    /// Server-side transaction timeout
    pub timeout: Option<Duration>,
    /// Arbitrary transaction metadata
    pub metadata: Metadata,
}

impl TxConfig {
    /// Create a config with the given mode and no bookmarks/timeout/metadata
    pub fn new(mode: AccessMode) -> Self {
        Self {
            mode,
            bookmarks: Vec::new(),
            timeout: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the bookmarks the transaction must observe
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set the server-side timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for TxConfig {
    fn default() -> Self {
        Self::new(AccessMode::Write)
    }
}

/// A query to execute, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Query text
    pub text: String,
    /// Named query parameters
    pub parameters: Metadata,
}

impl Command {
    /// Create a parameterless command
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Metadata::new(),
        }
    }

    /// Bind a named parameter
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Opaque token identifying an open server-side transaction
///
/// Created by `tx_begin`, consumed by exactly one of `tx_commit` or
/// `tx_rollback`; invalid afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle(pub(crate) u64);

/// Opaque token identifying an in-flight result stream
///
/// Valid until fully consumed (a terminal summary was returned) or
/// explicitly buffered/discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) u64);

/// One row of result data
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Field values, positionally matching the stream's keys
    pub values: Vec<Value>,
}

/// Terminal metadata closing a stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    /// Bookmark produced by the transaction, if the server sent one
    pub bookmark: Option<String>,
    /// Update counters (nodes created, properties set, ...)
    pub counters: HashMap<String, i64>,
    /// Raw success metadata as received
    pub metadata: Metadata,
}

impl Summary {
    /// Build a summary from a success reply's metadata
    pub fn from_metadata(metadata: Metadata) -> Self {
        let bookmark = metadata
            .get("bookmark")
            .and_then(Value::as_str)
            .map(str::to_string);
        let counters = metadata
            .get("stats")
            .and_then(Value::as_object)
            .map(|stats| {
                stats
                    .iter()
                    .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            bookmark,
            counters,
            metadata,
        }
    }
}

/// Cluster topology for one database: server addresses by role, plus expiry
///
/// Fetched per database; cached by the caller, never by the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    /// Servers that answer routing queries
    pub routers: Vec<String>,
    /// Servers that serve read transactions
    pub readers: Vec<String>,
    /// Servers that serve write transactions
    pub writers: Vec<String>,
    /// How long the table may be cached
    pub ttl: Duration,
    /// Resolved database name the table applies to
    pub database: String,
}

impl RoutingTable {
    /// Parse a ROUTE success reply.
    ///
    /// `requested` is the database name the caller asked for; the table's
    /// `database` field is set to the server-resolved name when the reply
    /// carries one, falling back to the requested name. The caller may have
    /// passed an alias or an empty string — the field always ends up holding
    /// the resolved value.
    pub fn from_metadata(metadata: &Metadata, requested: &str) -> Self {
        let rt = metadata.get("rt").and_then(Value::as_object);
        let ttl = rt
            .and_then(|m| m.get("ttl"))
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);
        let database = rt
            .and_then(|m| m.get("db"))
            .and_then(Value::as_str)
            .filter(|db| !db.is_empty())
            .unwrap_or(requested)
            .to_string();

        let mut table = Self {
            routers: Vec::new(),
            readers: Vec::new(),
            writers: Vec::new(),
            ttl,
            database,
        };

        let servers = rt
            .and_then(|m| m.get("servers"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for entry in servers {
            let role = entry.get("role").and_then(Value::as_str).unwrap_or("");
            let addresses: Vec<String> = entry
                .get("addresses")
                .and_then(Value::as_array)
                .map(|addrs| {
                    addrs
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            match role {
                "ROUTE" => table.routers = addresses,
                "READ" => table.readers = addresses,
                "WRITE" => table.writers = addresses,
                _ => {}
            }
        }
        table
    }
}
