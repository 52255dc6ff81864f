//! Protocol messages
//!
//! This module defines:
//! * Structured request types the connection sends
//! * Structured reply types the connection expects back

mod message;

pub use message::{Request, Response};
