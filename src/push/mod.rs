//! Push delivery backends.
//!
//! A [`PushBackend`] performs one provider-specific push and reports either a
//! message id or a [`PushError`]. The dispatch core only orchestrates calls to
//! it; how a push reaches a gateway is entirely the backend's business.
//!
//! - `PushServiceManager`: routes each push to the backend registered for the
//!   provider's push service type
//! - `DryRunPushService`: accepts everything, for local runs

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::PushError;
use crate::notification::Notification;
use crate::storage::{DeliveryTarget, PushProvider};

/// Backend trait for push delivery.
///
/// Implementations must be `Send + Sync`; they are called concurrently from
/// every push worker. No deadline is imposed by the caller, so backends that
/// need one must enforce it themselves.
#[async_trait]
pub trait PushBackend: Send + Sync {
    /// Push a notification to a target through a provider.
    ///
    /// Returns the message id assigned by the push service.
    async fn push(
        &self,
        provider: &PushProvider,
        target: &DeliveryTarget,
        notification: &Notification,
    ) -> Result<String, PushError>;
}

/// Routes pushes to the backend registered for each push service type
#[derive(Default)]
pub struct PushServiceManager {
    services: DashMap<String, Arc<dyn PushBackend>>,
}

impl PushServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the backend handling a push service type (e.g. "apns").
    ///
    /// Replaces any backend previously registered for that type.
    pub fn register(&self, push_service: impl Into<String>, backend: Arc<dyn PushBackend>) {
        let push_service = push_service.into();
        tracing::info!(push_service = %push_service, "Registered push service");
        self.services.insert(push_service, backend);
    }

    /// Whether a push service type has a registered backend
    pub fn is_registered(&self, push_service: &str) -> bool {
        self.services.contains_key(push_service)
    }

    fn backend(&self, push_service: &str) -> Option<Arc<dyn PushBackend>> {
        self.services.get(push_service).map(|b| b.clone())
    }
}

#[async_trait]
impl PushBackend for PushServiceManager {
    async fn push(
        &self,
        provider: &PushProvider,
        target: &DeliveryTarget,
        notification: &Notification,
    ) -> Result<String, PushError> {
        if provider.push_service != target.push_service {
            return Err(PushError::other(format!(
                "provider {} ({}) cannot deliver to {} ({})",
                provider.name, provider.push_service, target.name, target.push_service
            )));
        }

        // Clone the backend out so no map guard is held across the push
        let backend = self
            .backend(&provider.push_service)
            .ok_or_else(|| PushError::other(format!("unknown push service {}", provider.push_service)))?;

        backend.push(provider, target, notification).await
    }
}

/// Push service that delivers nowhere and always succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPushService;

#[async_trait]
impl PushBackend for DryRunPushService {
    async fn push(
        &self,
        provider: &PushProvider,
        target: &DeliveryTarget,
        notification: &Notification,
    ) -> Result<String, PushError> {
        let message_id = format!("dryrun:{}", Uuid::new_v4());
        tracing::debug!(
            provider = %provider,
            target = %target,
            notification_id = %notification.id,
            message_id = %message_id,
            "Dry-run push"
        );
        Ok(message_id)
    }
}
