use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::storage::{DeliveryTarget, PushProvider};

/// Errors raised by a subscription store.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Inconsistent subscription data: {0}")]
    Inconsistent(String),
}

/// Refreshed credentials handed back by a push service.
///
/// Push gateways sometimes accept a message while telling the caller that the
/// provider credentials or the device address changed. Both halves are
/// optional and persisted independently. When `cause` is `None` the push
/// itself went through and `message_id` identifies it.
#[derive(Debug, Clone, Default)]
pub struct RefreshData {
    pub provider: Option<Arc<PushProvider>>,
    pub target: Option<Arc<DeliveryTarget>>,
    pub message_id: Option<String>,
    pub cause: Option<Box<PushError>>,
}

/// Failure reported by a push backend.
///
/// This is a closed set: every delivery attempt matches on it exhaustively,
/// so a new kind of failure is a compile-time visible change.
#[derive(Error, Debug, Clone)]
pub enum PushError {
    #[error("Push service returned refreshed credentials")]
    RefreshData(RefreshData),

    #[error("Push service asked to retry later")]
    Retry { retry_after: Option<u64> },

    #[error("Delivery target is no longer registered")]
    Unregistered,

    #[error("{0}")]
    Other(String),
}

impl PushError {
    /// Convenience constructor for opaque failures
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Errors delivered to a request's response sink.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("Subscriber={subscriber} DatabaseError: {source}")]
    Storage {
        subscriber: String,
        source: StorageError,
    },

    #[error("Subscriber={subscriber} NoDevice")]
    NoDevice { subscriber: String },

    #[error("PushServiceProvider={provider} Subscriber={subscriber} DeliveryPoint={target} Retry")]
    RetryPending {
        provider: String,
        subscriber: String,
        target: String,
    },

    #[error("PushServiceProvider={provider} Subscriber={subscriber} DeliveryPoint={target}: {source}")]
    Push {
        provider: String,
        subscriber: String,
        target: String,
        source: PushError,
    },

    #[error("Request {0} carries no notification")]
    MissingNotification(Uuid),

    #[error("Request {0} carries no delivery target")]
    MissingDeliveryTarget(Uuid),
}
