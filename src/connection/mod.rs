//! Connection management
//!
//! This module handles:
//! * The connection-level state machine (idle / transaction open / closed /
//!   defunct) and its enforcement
//! * Transaction lifecycle, query execution, and result streaming over one
//!   sequential wire conversation
//! * Connection health and reset

mod conn;
mod state;

pub use conn::{Connection, StreamItem};
pub use state::ConnectionState;
