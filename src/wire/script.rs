//! Scripted exchange for tests and offline use
//!
//! A [`ScriptedExchange`] replays a queue of canned replies and records every
//! request it is given. Cloning shares the underlying script, so a test can
//! hand one clone to a [`crate::Connection`] and keep the other to assert on
//! exactly what went over the wire — no field peeking into the connection
//! itself.

use super::{Exchange, WireError};
use crate::protocol::{Request, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    sent: Vec<Request>,
    replies: VecDeque<Result<Response, WireError>>,
    send_failure: Option<WireError>,
}

/// Exchange that records requests and replays scripted replies
#[derive(Debug, Clone, Default)]
pub struct ScriptedExchange {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedExchange {
    /// Create an exchange with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next unanswered `recv`
    pub fn reply(self, response: Response) -> Self {
        self.inner.lock().unwrap().replies.push_back(Ok(response));
        self
    }

    /// Queue a failure for the next unanswered `recv`
    pub fn reply_err(self, err: WireError) -> Self {
        self.inner.lock().unwrap().replies.push_back(Err(err));
        self
    }

    /// Queue a reply after the exchange is already in use
    pub fn push_reply(&self, response: Response) {
        self.inner.lock().unwrap().replies.push_back(Ok(response));
    }

    /// Make every subsequent `send` fail with the given error
    pub fn fail_sends(self, err: WireError) -> Self {
        self.inner.lock().unwrap().send_failure = Some(err);
        self
    }

    /// Requests recorded so far, in send order
    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Number of scripted replies not yet consumed
    pub fn remaining_replies(&self) -> usize {
        self.inner.lock().unwrap().replies.len()
    }
}

#[async_trait::async_trait]
impl Exchange for ScriptedExchange {
    async fn send(&mut self, request: Request) -> Result<(), WireError> {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.push(request);
        match &inner.send_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn recv(&mut self) -> Result<Response, WireError> {
        self.inner
            .lock()
            .unwrap()
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(WireError::Broken("script exhausted: unexpected recv".into())))
    }
}
