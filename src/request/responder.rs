use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DispatchError;

use super::Request;

/// Response sink attached to a request by whoever submitted it.
///
/// `respond` may be called several times, once per failing sub-attempt.
/// `finish` is called exactly once per processed request.
pub trait Responder: Send + Sync + fmt::Debug {
    fn respond(&self, error: DispatchError);
    fn finish(&self);
}

/// Event forwarded by [`ChannelResponder`]
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    Error(DispatchError),
    Finished,
}

/// Responder that forwards every event over an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelResponder {
    tx: mpsc::UnboundedSender<ResponseEvent>,
}

impl ChannelResponder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResponseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Responder for ChannelResponder {
    fn respond(&self, error: DispatchError) {
        // The submitter may have stopped listening; that is not our failure
        let _ = self.tx.send(ResponseEvent::Error(error));
    }

    fn finish(&self) {
        let _ = self.tx.send(ResponseEvent::Finished);
    }
}

/// Responder that only logs, for submitters that do not wait on results
#[derive(Debug, Clone)]
pub struct LoggingResponder {
    request_id: Uuid,
}

impl LoggingResponder {
    pub fn new(request_id: Uuid) -> Self {
        Self { request_id }
    }
}

impl Responder for LoggingResponder {
    fn respond(&self, error: DispatchError) {
        tracing::warn!(request_id = %self.request_id, error = %error, "Request reported an error");
    }

    fn finish(&self) {
        tracing::debug!(request_id = %self.request_id, "Request finished");
    }
}

/// Scoped completion: finishes the request when dropped.
///
/// Holding one guard per processed request guarantees a single `finish`
/// regardless of which dispatch path returns.
pub struct FinishGuard {
    request: Arc<Request>,
}

impl FinishGuard {
    pub fn new(request: &Arc<Request>) -> Self {
        Self {
            request: Arc::clone(request),
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.request.finish();
    }
}
