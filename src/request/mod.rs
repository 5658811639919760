//! Requests flowing through the relay and their response sinks.
//!
//! A [`Request`] comes in two shapes sharing one type:
//!
//! - fan-out: a list of subscribers, no pre-resolved pair
//! - direct: exactly one subscriber plus a resolved provider/target pair
//!   (unicast requests and retries)
//!
//! Requests are submitted on the handoff channel, which the relay drains.

mod responder;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::notification::{DeliveryChain, Notification};
use crate::storage::{DeliveryTarget, PushProvider};

pub use responder::{ChannelResponder, FinishGuard, LoggingResponder, Responder, ResponseEvent};

/// Sending half of the handoff queue
pub type HandoffSender = mpsc::Sender<Request>;

/// Receiving half of the handoff queue
pub type HandoffReceiver = mpsc::Receiver<Request>;

/// Create the handoff queue used for submitted work, retries and unsubscribes
pub fn handoff_channel(capacity: usize) -> (HandoffSender, HandoffReceiver) {
    mpsc::channel(capacity)
}

/// What a request asks the relay to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Push,
    Unsubscribe,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Push => write!(f, "push"),
            Action::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

/// A logical push (or unsubscribe) operation
pub struct Request {
    /// Request ID, shared by retries and unsubscribes derived from it
    pub id: Uuid,
    pub action: Action,
    /// Address of the original sender
    pub sender_addr: String,
    /// Target service name
    pub service: String,
    /// Subscribers, in submission order
    pub subscribers: Vec<String>,
    /// Pre-resolved provider (direct requests only)
    pub provider: Option<Arc<PushProvider>>,
    /// Pre-resolved delivery target (direct and unsubscribe requests)
    pub target: Option<Arc<DeliveryTarget>>,
    pub notification: Option<Arc<Notification>>,
    /// Number of retries that led to this request
    pub retry_count: u32,
    /// Backoff computed for the retry that produced this request
    pub backoff: Duration,
    /// When the request entered the system
    pub punched_at: DateTime<Utc>,
    previous_try: Option<Weak<Request>>,
    chain: Option<DeliveryChain>,
    responder: Option<Arc<dyn Responder>>,
}

impl Request {
    /// Create a fan-out push request
    pub fn push(
        service: impl Into<String>,
        subscribers: Vec<String>,
        notification: Notification,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: Action::Push,
            sender_addr: String::new(),
            service: service.into(),
            subscribers,
            provider: None,
            target: None,
            notification: Some(Arc::new(notification)),
            retry_count: 0,
            backoff: Duration::ZERO,
            punched_at: Utc::now(),
            previous_try: None,
            chain: None,
            responder: None,
        }
    }

    /// Create a direct push request to one resolved pair
    pub fn unicast(
        service: impl Into<String>,
        subscriber: impl Into<String>,
        provider: Arc<PushProvider>,
        target: Arc<DeliveryTarget>,
        notification: Notification,
    ) -> Self {
        Self::push(service, vec![subscriber.into()], notification).with_pair(provider, target)
    }

    /// Create an unsubscribe request for one target of one subscriber
    pub fn unsubscribe(
        service: impl Into<String>,
        subscriber: impl Into<String>,
        target: Arc<DeliveryTarget>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: Action::Unsubscribe,
            sender_addr: String::new(),
            service: service.into(),
            subscribers: vec![subscriber.into()],
            provider: None,
            target: Some(target),
            notification: None,
            retry_count: 0,
            backoff: Duration::ZERO,
            punched_at: Utc::now(),
            previous_try: None,
            chain: None,
            responder: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_sender_addr(mut self, addr: impl Into<String>) -> Self {
        self.sender_addr = addr.into();
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn with_pair(mut self, provider: Arc<PushProvider>, target: Arc<DeliveryTarget>) -> Self {
        self.provider = Some(provider);
        self.target = Some(target);
        self
    }

    /// Build the retry of a failed delivery.
    ///
    /// The retry is a new direct request; it carries no responder because the
    /// original caller has already been told about the transient failure.
    pub(crate) fn retry_of(
        previous: &Arc<Request>,
        subscriber: &str,
        provider: Arc<PushProvider>,
        target: Arc<DeliveryTarget>,
        chain: DeliveryChain,
        backoff: Duration,
    ) -> Self {
        Self {
            id: previous.id,
            action: Action::Push,
            sender_addr: previous.sender_addr.clone(),
            service: previous.service.clone(),
            subscribers: vec![subscriber.to_string()],
            provider: Some(provider),
            target: Some(target),
            notification: previous.notification.clone(),
            retry_count: previous.retry_count + 1,
            backoff,
            punched_at: Utc::now(),
            previous_try: Some(Arc::downgrade(previous)),
            chain: Some(chain),
            responder: None,
        }
    }

    /// Build the unsubscribe request emitted for an unregistered target
    pub(crate) fn unsubscribe_of(
        previous: &Request,
        subscriber: &str,
        target: Arc<DeliveryTarget>,
    ) -> Self {
        Self::unsubscribe(previous.service.clone(), subscriber, target)
            .with_id(previous.id)
            .with_sender_addr(previous.sender_addr.clone())
    }

    /// The single subscriber and resolved pair of a direct request
    pub fn direct_pair(&self) -> Option<(&str, &Arc<PushProvider>, &Arc<DeliveryTarget>)> {
        match (self.subscribers.as_slice(), &self.provider, &self.target) {
            ([subscriber], Some(provider), Some(target)) => {
                Some((subscriber.as_str(), provider, target))
            }
            _ => None,
        }
    }

    /// The request this one was retried from, if it is still alive
    pub fn previous_try(&self) -> Option<Arc<Request>> {
        self.previous_try.as_ref().and_then(Weak::upgrade)
    }

    /// Whether this request was produced by the retry scheduler
    pub fn is_retry(&self) -> bool {
        self.retry_count > 0
    }

    /// Delivery chain inherited from a previous try, or a fresh one
    pub(crate) fn delivery_chain(&self) -> DeliveryChain {
        self.chain.clone().unwrap_or_default()
    }

    /// Report an error to the caller
    pub fn respond(&self, error: DispatchError) {
        match &self.responder {
            Some(responder) => responder.respond(error),
            None => tracing::debug!(
                request_id = %self.id,
                error = %error,
                "No responder attached, dropping response"
            ),
        }
    }

    /// Finalize the request. Prefer [`FinishGuard`], which calls this once.
    pub fn finish(&self) {
        if let Some(responder) = &self.responder {
            responder.finish();
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("sender_addr", &self.sender_addr)
            .field("service", &self.service)
            .field("subscribers", &self.subscribers)
            .field("provider", &self.provider.as_ref().map(|p| &p.name))
            .field("target", &self.target.as_ref().map(|t| &t.name))
            .field("retry_count", &self.retry_count)
            .field("backoff", &self.backoff)
            .field("punched_at", &self.punched_at)
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Arc<PushProvider>, Arc<DeliveryTarget>) {
        (
            Arc::new(PushProvider::new("fcm-main", "fcm")),
            Arc::new(DeliveryTarget::new("pixel", "fcm")),
        )
    }

    #[test]
    fn test_fan_out_request_has_no_direct_pair() {
        let request = Request::push("news", vec!["alice".into()], Notification::message("hi"));
        assert!(request.direct_pair().is_none());
        assert_eq!(request.action, Action::Push);
        assert!(!request.is_retry());
    }

    #[test]
    fn test_unicast_request_exposes_direct_pair() {
        let (provider, target) = pair();
        let request = Request::unicast("news", "alice", provider, target, Notification::message("hi"));

        let (subscriber, provider, target) = request.direct_pair().unwrap();
        assert_eq!(subscriber, "alice");
        assert_eq!(provider.name, "fcm-main");
        assert_eq!(target.name, "pixel");
    }

    #[test]
    fn test_retry_keeps_identity_and_weak_back_reference() {
        let (provider, target) = pair();
        let original = Arc::new(
            Request::push("news", vec!["alice".into(), "bob".into()], Notification::message("hi"))
                .with_sender_addr("10.0.0.1:5000"),
        );
        let chain = DeliveryChain::new();

        let retry = Request::retry_of(
            &original,
            "bob",
            provider,
            target,
            chain,
            Duration::from_secs(3),
        );

        assert_eq!(retry.id, original.id);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.subscribers, vec!["bob".to_string()]);
        assert_eq!(retry.sender_addr, "10.0.0.1:5000");
        assert!(retry.direct_pair().is_some());
        assert!(Arc::ptr_eq(
            retry.notification.as_ref().unwrap(),
            original.notification.as_ref().unwrap()
        ));
        assert!(retry.previous_try().is_some());

        drop(original);
        assert!(retry.previous_try().is_none());
    }

    #[test]
    fn test_unsubscribe_of_targets_single_subscriber() {
        let (_, target) = pair();
        let original = Request::push("news", vec!["alice".into()], Notification::message("hi"));
        let unsubscribe = Request::unsubscribe_of(&original, "alice", target);

        assert_eq!(unsubscribe.id, original.id);
        assert_eq!(unsubscribe.action, Action::Unsubscribe);
        assert!(unsubscribe.notification.is_none());
        assert_eq!(unsubscribe.target.as_ref().map(|t| t.name.as_str()), Some("pixel"));
    }
}
