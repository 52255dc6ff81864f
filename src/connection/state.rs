//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transaction open; ready for `tx_begin` or auto-commit `run`
    Idle,

    /// Explicit transaction open; ready for `run_tx`, `tx_commit`,
    /// `tx_rollback`
    TxOpen,

    /// Closed by the owner; terminal
    Closed,

    /// Transport broke or a commit outcome is unknown; not reusable, terminal
    Defunct,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Idle, TxOpen) | (TxOpen, Idle) | (Idle, Idle) | (_, Closed) | (_, Defunct)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether the connection can still carry traffic
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::TxOpen)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::TxOpen => write!(f, "tx_open"),
            Self::Closed => write!(f, "closed"),
            Self::Defunct => write!(f, "defunct"),
        }
    }
}
