//! Core connection type

use super::state::ConnectionState;
use crate::db::{
    Command, Metadata, Record, RoutingTable, StreamHandle, Summary, TxConfig, TxHandle,
};
use crate::protocol::{Request, Response};
use crate::wire::{Exchange, WireError};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::Instrument;

/// One element of a result stream
///
/// Every successful [`Connection::next`] call yields exactly one of these.
/// `Summary` is terminal: the stream handle is invalid afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// One row of result data
    Record(Record),
    /// Terminal metadata; closes the stream
    Summary(Summary),
}

struct OpenTx {
    handle: TxHandle,
    config: TxConfig,
}

struct OpenStream {
    handle: StreamHandle,
    keys: Vec<String>,
    /// Owned by the open explicit transaction (vs auto-commit)
    in_tx: bool,
    /// PULL/DISCARD has been sent; replies are in flight on the wire
    pulling: bool,
    /// Records drained off the wire by `buffer`
    buffered: VecDeque<Record>,
    /// Terminal summary received off the wire, not yet delivered
    summary: Option<Summary>,
}

impl OpenStream {
    /// The wire still owes this stream records or a summary
    fn attached(&self) -> bool {
        self.summary.is_none()
    }
}

/// A single logical conversation with one graph database server.
///
/// Owned exclusively by one pool/session at a time; all methods take
/// `&mut self` and assume in-order invocation. The connection enforces legal
/// operation sequencing (no query before begin, one transaction at a time,
/// one wire-attached stream at a time) and never retries anything
/// internally.
///
/// The wire carries one conversation, so at most one stream is ever attached
/// to it. Issuing a new query while a stream is still attached first buffers
/// that stream into memory; fully buffered streams stay readable through
/// [`Connection::next`] until their terminal summary is delivered.
pub struct Connection {
    exchange: Box<dyn Exchange>,
    state: ConnectionState,
    server_name: String,
    server_version: String,
    id: u64,
    alive: bool,
    birth: Instant,
    database: String,
    bookmark: String,
    tx: Option<OpenTx>,
    streams: Vec<OpenStream>,
    next_handle: u64,
}

impl Connection {
    /// Create a connection over an established exchange.
    ///
    /// `server_name` and `server_version` come from the transport's handshake
    /// (out of scope here); `id` is the pool-assigned connection number used
    /// in logs.
    pub fn new(
        exchange: Box<dyn Exchange>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        id: u64,
    ) -> Self {
        Self {
            exchange,
            state: ConnectionState::Idle,
            server_name: server_name.into(),
            server_version: server_version.into(),
            id,
            alive: true,
            birth: Instant::now(),
            database: String::new(),
            bookmark: String::new(),
            tx: None,
            streams: Vec::new(),
            next_handle: 1,
        }
    }

    // -- Lifecycle & health --

    /// Whether the underlying transport is still usable.
    ///
    /// Pools must check this before reuse and discard dead connections.
    pub fn is_alive(&self) -> bool {
        self.alive && self.state.is_open()
    }

    /// When this connection was established
    pub fn birthdate(&self) -> Instant {
        self.birth
    }

    /// Name of the server this connection talks to
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Server version reported at handshake
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Pool-assigned connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last-seen bookmark; empty until a transaction has committed
    pub fn bookmark(&self) -> &str {
        &self.bookmark
    }

    /// Currently selected database; empty means the server default
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Release the connection.
    ///
    /// Idempotent. Failures here are not actionable by the caller, so the
    /// goodbye is fire-and-forget and nothing is returned.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.alive {
            let _ = self.exchange.send(Request::Goodbye).await;
        }
        self.tx = None;
        self.streams.clear();
        self.alive = false;
        self.state = ConnectionState::Closed;
        tracing::debug!(id = self.id, "connection closed");
    }

    /// Clear any server-side transaction/query state so the connection can
    /// go back to a pool as if freshly acquired.
    ///
    /// No-op when nothing is open. Best-effort: a server refusal is logged
    /// and swallowed; transport breakage marks the connection dead.
    pub async fn reset(&mut self) {
        if !self.state.is_open() {
            return;
        }
        if self.tx.is_none() && self.streams.is_empty() {
            return;
        }
        match self.round_trip(Request::Reset).await {
            Ok(_) => {
                self.tx = None;
                self.streams.clear();
                self.state = ConnectionState::Idle;
            }
            Err(WireError::Broken(reason)) => {
                tracing::debug!(id = self.id, %reason, "reset lost the transport");
                self.mark_defunct();
            }
            Err(WireError::Rejected { code, message }) => {
                tracing::warn!(id = self.id, %code, %message, "server refused reset");
                // The local protocol position is abandoned either way.
                self.tx = None;
                self.streams.clear();
                self.state = ConnectionState::Idle;
            }
        }
    }

    /// Reset with positive confirmation.
    ///
    /// Always round-trips, even when nothing looks open locally — used after
    /// an error whose recoverability is unknown. A transport failure is
    /// returned as [`Error::Transport`] and the connection must be treated as
    /// dead afterwards (`is_alive` reports `false`).
    pub async fn force_reset(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        if !self.alive {
            return Err(Error::Transport("transport already failed".into()));
        }
        self.tx = None;
        self.streams.clear();
        match self.round_trip(Request::Reset).await {
            Ok(_) => {
                self.state = ConnectionState::Idle;
                Ok(())
            }
            Err(WireError::Broken(reason)) => {
                self.mark_defunct();
                Err(Error::Transport(reason))
            }
            Err(WireError::Rejected { code, message }) => {
                // Transaction and streams are already dropped locally; the
                // connection goes back to idle rather than wedging in a
                // transaction state that no longer exists.
                self.state = ConnectionState::Idle;
                Err(Error::ServerRejected { code, message })
            }
        }
    }

    // -- Database selection --

    /// Select the database for subsequent `run`/`tx_begin`.
    ///
    /// Purely local bookkeeping; no server round trip.
    pub fn select_database(&mut self, name: impl Into<String>) {
        self.database = name.into();
    }

    // -- Transaction control --

    /// Open an explicit transaction with the declared parameters.
    ///
    /// Valid only when idle. On server refusal ([`Error::ServerRejected`])
    /// the connection stays idle and usable.
    pub async fn tx_begin(&mut self, config: TxConfig) -> Result<TxHandle> {
        let span = tracing::debug_span!("tx_begin", id = self.id);
        async {
            self.require_open()?;
            if self.tx.is_some() {
                return Err(Error::invalid_state("idle", "transaction open"));
            }
            self.detach_wire_stream().await?;

            let request = Request::Begin {
                config: config.clone(),
                database: self.database.clone(),
            };
            match self.round_trip(request).await {
                Ok(_) => {
                    self.state.transition(ConnectionState::TxOpen)?;
                    let handle = TxHandle(self.take_handle());
                    self.tx = Some(OpenTx { handle, config });
                    tracing::debug!(id = self.id, ?handle, "transaction open");
                    Ok(handle)
                }
                Err(err) => Err(self.fail_request(err)),
            }
        }
        .instrument(span)
        .await
    }

    /// Commit the open transaction and advance the bookmark.
    ///
    /// At-most-once: on failure the outcome is ambiguous, the error kind is
    /// [`Error::CommitFailed`], and the connection is no longer reusable —
    /// the caller must not retry the same logical transaction on it.
    pub async fn tx_commit(&mut self, handle: TxHandle) -> Result<()> {
        self.require_tx(handle)?;
        self.detach_wire_stream().await?;

        match self.round_trip(Request::Commit).await {
            Ok(metadata) => {
                if let Some(bookmark) = metadata.get("bookmark").and_then(Value::as_str) {
                    self.bookmark = bookmark.to_string();
                }
                self.tx = None;
                // No stream read after commit: the transaction's streams die
                // with it.
                self.streams.retain(|s| !s.in_tx);
                self.state.transition(ConnectionState::Idle)?;
                tracing::debug!(id = self.id, bookmark = %self.bookmark, "transaction committed");
                Ok(())
            }
            Err(err) => {
                // Outcome unknown: the commit may have landed server-side.
                let reason = err.to_string();
                self.mark_defunct();
                Err(Error::CommitFailed(reason))
            }
        }
    }

    /// Roll back the open transaction.
    ///
    /// Best-effort: local state clears to idle even when the server
    /// acknowledgment fails, since the outcome is "not committed" either
    /// way. The bookmark is left untouched.
    pub async fn tx_rollback(&mut self, handle: TxHandle) -> Result<()> {
        self.require_tx(handle)?;

        // Drain any half-read stream so the rollback is the next message the
        // server sees; its records no longer matter.
        let draining = self
            .streams
            .iter()
            .any(|s| s.attached() && s.pulling);
        if draining {
            while let Ok(response) = self.exchange.recv().await {
                if matches!(response, Response::Success(_)) {
                    break;
                }
            }
        }
        self.tx = None;
        self.streams.retain(|s| !s.in_tx);

        let result = self.round_trip(Request::Rollback).await;
        if self.state == ConnectionState::TxOpen {
            self.state.transition(ConnectionState::Idle)?;
        }
        match result {
            Ok(_) => {
                tracing::debug!(id = self.id, "transaction rolled back");
                Ok(())
            }
            Err(WireError::Broken(reason)) => {
                self.mark_defunct();
                Err(Error::Transport(reason))
            }
            Err(WireError::Rejected { code, message }) => {
                Err(Error::ServerRejected { code, message })
            }
        }
    }

    /// Declared parameters of the open transaction, if `handle` matches it
    pub fn transaction_config(&self, handle: TxHandle) -> Option<&TxConfig> {
        self.tx
            .as_ref()
            .filter(|tx| tx.handle == handle)
            .map(|tx| &tx.config)
    }

    /// Run an auto-commit query: an implicit begin + run, committing when the
    /// stream completes.
    ///
    /// Valid only when idle. The declared `config` parameters are sent to the
    /// server exactly as for [`Self::tx_begin`]. The bookmark advances when
    /// the stream's terminal summary arrives.
    pub async fn run(&mut self, command: Command, config: TxConfig) -> Result<StreamHandle> {
        let span = tracing::debug_span!("run", id = self.id);
        async {
            self.require_open()?;
            if self.tx.is_some() {
                return Err(Error::invalid_state("idle", "transaction open"));
            }
            self.detach_wire_stream().await?;

            let request = Request::Run {
                command,
                config,
                database: self.database.clone(),
            };
            match self.round_trip(request).await {
                Ok(metadata) => Ok(self.open_stream(&metadata, false)),
                Err(err) => Err(self.fail_request(err)),
            }
        }
        .instrument(span)
        .await
    }

    /// Run a query inside the open transaction.
    ///
    /// May be called repeatedly before commit/rollback; an unfinished
    /// previous stream is buffered first, since the wire is sequential.
    pub async fn run_tx(&mut self, handle: TxHandle, command: Command) -> Result<StreamHandle> {
        self.require_tx(handle)?;
        self.detach_wire_stream().await?;

        match self.round_trip(Request::RunInTx { command }).await {
            Ok(metadata) => Ok(self.open_stream(&metadata, true)),
            Err(err) => Err(self.fail_request(err)),
        }
    }

    // -- Result streaming --

    /// Field names for the stream's records.
    ///
    /// Available as soon as the stream handle exists.
    pub fn keys(&self, handle: StreamHandle) -> Result<Vec<String>> {
        let idx = self.stream_index(handle)?;
        Ok(self.streams[idx].keys.clone())
    }

    /// Advance the stream by one element.
    ///
    /// Yields exactly one [`StreamItem`] per call; [`StreamItem::Summary`] is
    /// terminal and any later call on the handle is an error, never a new
    /// record. A transport break mid-stream is [`Error::Stream`]: the stream
    /// and its owning transaction are poisoned and the connection is dead.
    pub async fn next(&mut self, handle: StreamHandle) -> Result<StreamItem> {
        let idx = self.stream_index(handle)?;

        // Serve buffered data before touching the wire.
        let stream = &mut self.streams[idx];
        if let Some(record) = stream.buffered.pop_front() {
            return Ok(StreamItem::Record(record));
        }
        if let Some(summary) = stream.summary.take() {
            return Ok(StreamItem::Summary(self.finish_stream(idx, summary)));
        }

        self.ensure_pulling(idx).await?;
        match self.exchange.recv().await {
            Ok(Response::Record(values)) => Ok(StreamItem::Record(Record { values })),
            Ok(Response::Success(metadata)) => {
                let summary = Summary::from_metadata(metadata);
                if !self.streams[idx].in_tx {
                    self.complete_auto_commit(&summary);
                }
                Ok(StreamItem::Summary(self.finish_stream(idx, summary)))
            }
            Err(err) => Err(self.poison_stream(idx, err)),
        }
    }

    /// Eagerly drain the stream's remainder off the wire into local memory.
    ///
    /// Decouples the logical read position from transport timing: after
    /// buffering, the caller can issue another query while still iterating
    /// this stream's records through [`Self::next`].
    pub async fn buffer(&mut self, handle: StreamHandle) -> Result<()> {
        let idx = self.stream_index(handle)?;
        if !self.streams[idx].attached() {
            return Ok(());
        }

        self.ensure_pulling(idx).await?;
        loop {
            match self.exchange.recv().await {
                Ok(Response::Record(values)) => {
                    self.streams[idx].buffered.push_back(Record { values });
                }
                Ok(Response::Success(metadata)) => {
                    let summary = Summary::from_metadata(metadata);
                    let stream = &mut self.streams[idx];
                    let in_tx = stream.in_tx;
                    stream.summary = Some(summary.clone());
                    if !in_tx {
                        self.complete_auto_commit(&summary);
                    }
                    return Ok(());
                }
                Err(err) => return Err(self.poison_stream(idx, err)),
            }
        }
    }

    /// Discard remaining records and return the terminal summary.
    ///
    /// When nothing has been pulled yet the server is asked to skip result
    /// transmission entirely; otherwise the remainder is drained and dropped.
    pub async fn consume(&mut self, handle: StreamHandle) -> Result<Summary> {
        let idx = self.stream_index(handle)?;

        let stream = &mut self.streams[idx];
        if let Some(summary) = stream.summary.take() {
            return Ok(self.finish_stream(idx, summary));
        }

        if !stream.pulling {
            stream.pulling = true;
            if let Err(err) = self.exchange.send(Request::DiscardAll).await {
                return Err(self.poison_stream(idx, err));
            }
        }
        loop {
            match self.exchange.recv().await {
                Ok(Response::Record(_)) => continue,
                Ok(Response::Success(metadata)) => {
                    let summary = Summary::from_metadata(metadata);
                    if !self.streams[idx].in_tx {
                        self.complete_auto_commit(&summary);
                    }
                    return Ok(self.finish_stream(idx, summary));
                }
                Err(err) => return Err(self.poison_stream(idx, err)),
            }
        }
    }

    // -- Routing --

    /// Query cluster topology for `database` (empty = server default).
    ///
    /// The returned table's `database` field holds the server-resolved name
    /// even when the caller passed an alias or an empty string. A server that
    /// does not support routing yields [`Error::RoutingUnavailable`]; callers
    /// fall back to direct addressing.
    pub async fn get_routing_table(
        &mut self,
        context: HashMap<String, String>,
        bookmarks: Vec<String>,
        database: &str,
        impersonated_user: Option<&str>,
    ) -> Result<RoutingTable> {
        self.require_open()?;
        if self.tx.is_some() {
            return Err(Error::invalid_state("idle", "transaction open"));
        }
        self.detach_wire_stream().await?;

        let request = Request::Route {
            context,
            bookmarks,
            database: database.to_string(),
            impersonated_user: impersonated_user.map(str::to_string),
        };
        match self.round_trip(request).await {
            Ok(metadata) => Ok(RoutingTable::from_metadata(&metadata, database)),
            Err(WireError::Broken(reason)) => {
                self.mark_defunct();
                Err(Error::Transport(reason))
            }
            Err(WireError::Rejected { code, message }) => {
                Err(Error::RoutingUnavailable(format!("[{code}] {message}")))
            }
        }
    }

    // -- Internals --

    fn take_handle(&mut self) -> u64 {
        let n = self.next_handle;
        self.next_handle += 1;
        n
    }

    fn require_open(&self) -> Result<()> {
        if self.state.is_open() && self.alive {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    fn require_tx(&self, handle: TxHandle) -> Result<()> {
        self.require_open()?;
        match &self.tx {
            Some(tx) if tx.handle == handle => Ok(()),
            Some(_) => Err(Error::invalid_state(
                "matching transaction handle",
                "other transaction open",
            )),
            None => Err(Error::invalid_state(
                "open transaction",
                self.state.to_string(),
            )),
        }
    }

    fn stream_index(&self, handle: StreamHandle) -> Result<usize> {
        self.streams
            .iter()
            .position(|s| s.handle == handle)
            .ok_or_else(|| {
                Error::invalid_state("open stream", "stream consumed or never opened")
            })
    }

    /// One request, one reply. Maps a success reply to its metadata.
    async fn round_trip(
        &mut self,
        request: Request,
    ) -> std::result::Result<Metadata, WireError> {
        self.exchange.send(request).await?;
        match self.exchange.recv().await? {
            Response::Success(metadata) => Ok(metadata),
            Response::Record(_) => Err(WireError::Broken(
                "protocol violation: record outside an open stream".into(),
            )),
        }
    }

    /// Map a begin/run refusal, marking the connection dead on breakage.
    fn fail_request(&mut self, err: WireError) -> Error {
        match err {
            WireError::Broken(reason) => {
                self.mark_defunct();
                Error::Transport(reason)
            }
            WireError::Rejected { code, message } => Error::ServerRejected { code, message },
        }
    }

    fn mark_defunct(&mut self) {
        self.alive = false;
        self.tx = None;
        self.streams.clear();
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Defunct;
        }
    }

    fn open_stream(&mut self, metadata: &Metadata, in_tx: bool) -> StreamHandle {
        let keys = metadata
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let handle = StreamHandle(self.take_handle());
        self.streams.push(OpenStream {
            handle,
            keys,
            in_tx,
            pulling: false,
            buffered: VecDeque::new(),
            summary: None,
        });
        handle
    }

    /// Send PULL once per stream, before the first wire read.
    async fn ensure_pulling(&mut self, idx: usize) -> Result<()> {
        if self.streams[idx].pulling {
            return Ok(());
        }
        self.streams[idx].pulling = true;
        if let Err(err) = self.exchange.send(Request::PullAll).await {
            return Err(self.poison_stream(idx, err));
        }
        Ok(())
    }

    /// Deliver the terminal summary and invalidate the stream handle.
    fn finish_stream(&mut self, idx: usize, summary: Summary) -> Summary {
        self.streams.remove(idx);
        summary
    }

    /// An auto-commit query commits the moment its terminal summary leaves
    /// the wire; that is the point where the bookmark advances. Delivering a
    /// previously buffered summary must not touch the bookmark again, or a
    /// stale value would overwrite a later commit's.
    fn complete_auto_commit(&mut self, summary: &Summary) {
        if let Some(bookmark) = &summary.bookmark {
            self.bookmark = bookmark.clone();
        }
    }

    /// Map a mid-stream failure: the stream is gone either way, and the
    /// owning transaction (if any) is poisoned — the caller should roll back
    /// or reset.
    fn poison_stream(&mut self, idx: usize, err: WireError) -> Error {
        let reason = err.to_string();
        self.streams.remove(idx);
        if let WireError::Broken(_) = err {
            self.mark_defunct();
        }
        Error::Stream(reason)
    }

    /// Buffer the wire-attached stream, if any, so a new request can go out.
    /// The wire carries one conversation at a time; this is the implicit
    /// form of [`Self::buffer`].
    async fn detach_wire_stream(&mut self) -> Result<()> {
        let attached = self
            .streams
            .iter()
            .find(|s| s.attached())
            .map(|s| s.handle);
        if let Some(handle) = attached {
            self.buffer(handle).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("server_name", &self.server_name)
            .field("state", &self.state)
            .field("alive", &self.alive)
            .field("database", &self.database)
            .field("bookmark", &self.bookmark)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AccessMode;
    use crate::wire::ScriptedExchange;
    use serde_json::json;
    use std::time::Duration;

    fn conn(exchange: ScriptedExchange) -> Connection {
        Connection::new(Box::new(exchange), "server-1", "5.12.0", 7)
    }

    #[test]
    fn test_new_connection_is_alive_and_idle() {
        let c = conn(ScriptedExchange::new());
        assert!(c.is_alive());
        assert_eq!(c.state(), ConnectionState::Idle);
        assert_eq!(c.bookmark(), "");
        assert_eq!(c.server_name(), "server-1");
        assert_eq!(c.server_version(), "5.12.0");
        assert_eq!(c.id(), 7);
    }

    #[test]
    fn test_select_database_is_local() {
        let probe = ScriptedExchange::new();
        let mut c = conn(probe.clone());
        c.select_database("movies");
        assert_eq!(c.database(), "movies");
        assert!(probe.requests().is_empty());
    }

    #[tokio::test]
    async fn test_begin_records_declared_parameters_on_wire() {
        let probe = ScriptedExchange::new().reply(Response::success());
        let mut c = conn(probe.clone());
        c.select_database("neo4j");

        let config = TxConfig::new(AccessMode::Write)
            .with_bookmarks(vec!["b1".into()])
            .with_timeout(Duration::from_secs(5))
            .with_meta("k", json!("v"));
        let handle = c.tx_begin(config.clone()).await.unwrap();

        assert_eq!(
            probe.requests(),
            vec![Request::Begin {
                config: config.clone(),
                database: "neo4j".into(),
            }]
        );
        assert_eq!(c.transaction_config(handle), Some(&config));
    }

    #[tokio::test]
    async fn test_begin_rejected_leaves_idle() {
        let probe = ScriptedExchange::new().reply_err(WireError::Rejected {
            code: "Neo.ClientError.Transaction.InvalidBookmark".into(),
            message: "stale bookmark".into(),
        });
        let mut c = conn(probe);

        let err = c.tx_begin(TxConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::ServerRejected { .. }));
        assert_eq!(c.state(), ConnectionState::Idle);
        assert!(c.is_alive());
    }

    #[tokio::test]
    async fn test_commit_failure_is_ambiguous_and_kills_the_connection() {
        let probe = ScriptedExchange::new()
            .reply(Response::success())
            .reply_err(WireError::Broken("connection reset".into()));
        let mut c = conn(probe);

        let tx = c.tx_begin(TxConfig::default()).await.unwrap();
        let err = c.tx_commit(tx).await.unwrap_err();
        assert!(matches!(err, Error::CommitFailed(_)));
        assert!(!c.is_alive());
        assert_eq!(c.state(), ConnectionState::Defunct);
    }

    #[tokio::test]
    async fn test_run_maps_fields_to_keys() {
        let probe =
            ScriptedExchange::new().reply(Response::success_with(json!({ "fields": ["n", "m"] })));
        let mut c = conn(probe);

        let stream = c
            .run(Command::new("MATCH (n)-->(m) RETURN n, m"), TxConfig::default())
            .await
            .unwrap();
        assert_eq!(c.keys(stream).unwrap(), vec!["n", "m"]);
    }

    #[tokio::test]
    async fn test_stale_stream_handle_is_rejected() {
        let probe = ScriptedExchange::new()
            .reply(Response::success_with(json!({ "fields": ["x"] })))
            .reply(Response::success_with(json!({ "bookmark": "bm-1" })));
        let mut c = conn(probe);

        let stream = c
            .run(Command::new("RETURN 1"), TxConfig::default())
            .await
            .unwrap();
        let item = c.next(stream).await.unwrap();
        assert!(matches!(item, StreamItem::Summary(_)));

        // Terminal summary invalidates the handle.
        assert!(matches!(
            c.next(stream).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(c.keys(stream), Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_record_outside_stream_is_a_protocol_violation() {
        let probe = ScriptedExchange::new().reply(Response::Record(vec![json!(1)]));
        let mut c = conn(probe);

        let err = c.tx_begin(TxConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!c.is_alive());
    }

    #[tokio::test]
    async fn test_reset_is_noop_when_clean() {
        let probe = ScriptedExchange::new();
        let mut c = conn(probe.clone());
        c.reset().await;
        assert!(probe.requests().is_empty());
        assert!(c.is_alive());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let probe = ScriptedExchange::new();
        let mut c = conn(probe.clone());
        c.close().await;
        c.close().await;
        assert_eq!(probe.requests(), vec![Request::Goodbye]);
        assert!(!c.is_alive());
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let mut c = conn(ScriptedExchange::new());
        c.close().await;
        assert!(matches!(
            c.tx_begin(TxConfig::default()).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(c.force_reset().await, Err(Error::ConnectionClosed)));
    }
}
