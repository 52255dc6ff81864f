//! Routing discovery and connection health/reset contract tests

use bolt_conn::db::{Command, TxConfig};
use bolt_conn::protocol::{Request, Response};
use bolt_conn::wire::{ScriptedExchange, WireError};
use bolt_conn::{Connection, ConnectionState, Error};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

fn conn(exchange: ScriptedExchange) -> Connection {
    Connection::new(Box::new(exchange), "server-1", "5.12.0", 1)
}

#[tokio::test]
async fn routing_table_database_name_round_trips() {
    // The reply carries no resolved name; the requested one must come back.
    let probe = ScriptedExchange::new().reply(Response::success_with(json!({
        "rt": {
            "ttl": 300,
            "servers": [
                { "role": "ROUTE", "addresses": ["r1:7687"] },
                { "role": "READ", "addresses": ["read1:7687"] },
                { "role": "WRITE", "addresses": ["write1:7687"] }
            ]
        }
    })));
    let mut c = conn(probe.clone());

    let table = c
        .get_routing_table(HashMap::new(), vec!["b1".into()], "neo4j", None)
        .await
        .unwrap();

    assert_eq!(table.database, "neo4j");
    assert_eq!(table.ttl, Duration::from_secs(300));
    assert_eq!(table.writers, vec!["write1:7687"]);

    // The request carried the database and bookmarks through.
    match &probe.requests()[0] {
        Request::Route {
            database,
            bookmarks,
            ..
        } => {
            assert_eq!(database, "neo4j");
            assert_eq!(bookmarks, &vec!["b1".to_string()]);
        }
        other => panic!("expected Route on the wire, got {other:?}"),
    }
}

#[tokio::test]
async fn standalone_server_maps_to_routing_unavailable() {
    let probe = ScriptedExchange::new().reply_err(WireError::Rejected {
        code: "Neo.ClientError.Request.Invalid".into(),
        message: "routing not supported".into(),
    });
    let mut c = conn(probe);

    let err = c
        .get_routing_table(HashMap::new(), vec![], "", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RoutingUnavailable(_)));
    // Not fatal: the caller falls back to direct addressing.
    assert!(c.is_alive());
}

#[tokio::test]
async fn routing_inside_transaction_is_rejected() {
    let probe = ScriptedExchange::new().reply(Response::success());
    let mut c = conn(probe);

    let _tx = c.tx_begin(TxConfig::default()).await.unwrap();
    let err = c
        .get_routing_table(HashMap::new(), vec![], "neo4j", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn force_reset_on_broken_transport_reports_dead() {
    let probe = ScriptedExchange::new()
        .fail_sends(WireError::Broken("connection reset by peer".into()));
    let mut c = conn(probe);

    let err = c.force_reset().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(!c.is_alive());
    assert_eq!(c.state(), ConnectionState::Defunct);
}

#[tokio::test]
async fn force_reset_on_healthy_idle_connection_clears_state() {
    let probe = ScriptedExchange::new()
        .reply(Response::success())
        .reply(Response::success());
    let mut c = conn(probe.clone());

    let tx = c.tx_begin(TxConfig::default()).await.unwrap();
    c.force_reset().await.unwrap();

    assert!(c.is_alive());
    assert_eq!(c.state(), ConnectionState::Idle);
    assert!(c.transaction_config(tx).is_none());
    assert_eq!(probe.requests().last().unwrap(), &Request::Reset);
}

#[tokio::test]
async fn reset_round_trips_only_when_something_is_open() {
    let probe = ScriptedExchange::new()
        .reply(Response::success_with(json!({ "fields": ["x"] })))
        .reply(Response::success());
    let mut c = conn(probe.clone());

    // Clean connection: no round trip.
    c.reset().await;
    assert!(probe.requests().is_empty());

    // Open stream: reset goes to the server and clears it.
    let stream = c
        .run(Command::new("RETURN 1 AS x"), TxConfig::default())
        .await
        .unwrap();
    c.reset().await;
    assert_eq!(probe.requests().last().unwrap(), &Request::Reset);
    assert!(matches!(c.keys(stream), Err(Error::InvalidState { .. })));
    assert!(c.is_alive());
}

#[tokio::test]
async fn reset_rejection_returns_connection_to_idle() {
    let probe = ScriptedExchange::new()
        .reply(Response::success())
        .reply_err(WireError::Rejected {
            code: "Neo.ClientError.Request.Invalid".into(),
            message: "cannot reset".into(),
        })
        .reply(Response::success());
    let mut c = conn(probe.clone());

    let tx = c.tx_begin(TxConfig::default()).await.unwrap();
    c.reset().await;

    // The local transaction is gone, so the state must say idle too.
    assert_eq!(c.state(), ConnectionState::Idle);
    assert!(c.transaction_config(tx).is_none());

    // And a fresh transaction opens without tripping over stale state.
    let tx2 = c.tx_begin(TxConfig::default()).await.unwrap();
    assert!(c.transaction_config(tx2).is_some());
    assert_eq!(
        probe.requests(),
        vec![
            Request::Begin {
                config: TxConfig::default(),
                database: String::new(),
            },
            Request::Reset,
            Request::Begin {
                config: TxConfig::default(),
                database: String::new(),
            },
        ]
    );
}

#[tokio::test]
async fn force_reset_rejection_returns_connection_to_idle() {
    let probe = ScriptedExchange::new()
        .reply(Response::success())
        .reply_err(WireError::Rejected {
            code: "Neo.ClientError.Request.Invalid".into(),
            message: "cannot reset".into(),
        })
        .reply(Response::success());
    let mut c = conn(probe);

    let tx = c.tx_begin(TxConfig::default()).await.unwrap();
    let err = c.force_reset().await.unwrap_err();
    assert!(matches!(err, Error::ServerRejected { .. }));

    assert!(c.is_alive());
    assert_eq!(c.state(), ConnectionState::Idle);
    assert!(c.transaction_config(tx).is_none());
    assert!(c.tx_begin(TxConfig::default()).await.is_ok());
}

#[tokio::test]
async fn reset_transport_loss_marks_defunct_silently() {
    let probe = ScriptedExchange::new()
        .reply(Response::success())
        .reply_err(WireError::Broken("broken pipe".into()));
    let mut c = conn(probe);

    let _tx = c.tx_begin(TxConfig::default()).await.unwrap();
    c.reset().await;

    assert!(!c.is_alive());
    assert_eq!(c.state(), ConnectionState::Defunct);
}

#[tokio::test]
async fn birthdate_is_stable() {
    let c = conn(ScriptedExchange::new());
    let birth = c.birthdate();
    assert!(birth.elapsed() < Duration::from_secs(1));
    assert_eq!(c.birthdate(), birth);
}
