use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Push payload shared by every delivery attempt of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier for this notification
    pub id: Uuid,
    /// Key/value payload forwarded to the push service
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// When the notification was created
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(data: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            created_at: Utc::now(),
        }
    }

    /// Build a notification carrying a single "msg" field
    pub fn message(msg: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("msg".to_string(), msg.into());
        Self::new(data)
    }
}

/// Release hook for notification payloads.
///
/// Called once a delivery chain reaches a terminal outcome. Implementations
/// typically return pooled buffers.
pub trait NotificationRecycler: Send + Sync {
    fn recycle(&self, notification: &Notification);
}

/// Recycler that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecycler;

impl NotificationRecycler for NoopRecycler {
    fn recycle(&self, _notification: &Notification) {}
}

/// Release bookkeeping for one logical delivery chain.
///
/// A chain is the first attempt at a (subscriber, target) pair plus every
/// retry derived from it. Retries clone the chain, so the payload is handed
/// to the recycler at most once no matter which attempt ends the chain.
#[derive(Debug, Clone, Default)]
pub struct DeliveryChain {
    released: Arc<AtomicBool>,
}

impl DeliveryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the payload. Returns `true` only for the call that recycled it.
    pub fn release(&self, notification: &Notification, recycler: &dyn NotificationRecycler) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                notification_id = %notification.id,
                "Notification already released for this delivery chain"
            );
            return false;
        }
        recycler.recycle(notification);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
