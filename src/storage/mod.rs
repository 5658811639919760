//! Subscription storage.
//!
//! The dispatch core never owns the subscriber-to-device mapping. It asks a
//! [`SubscriptionStore`] to resolve a subscriber into provider/target pairs and
//! hands refreshed credentials back to it for persistence.
//!
//! - `MemorySubscriptionStore`: in-memory storage using DashMap

mod memory_backend;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use memory_backend::MemorySubscriptionStore;

/// A push delivery channel: credentials for one upstream push gateway account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushProvider {
    /// Unique provider name
    pub name: String,
    /// Push service type (e.g. "apns", "fcm")
    pub push_service: String,
    /// Service-specific credential data
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl PushProvider {
    pub fn new(name: impl Into<String>, push_service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            push_service: push_service.into(),
            data: BTreeMap::new(),
        }
    }

    /// Attach a credential field
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for PushProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A concrete device address registered under a push service.
///
/// The `name` is the identity used for deduplication: two pairs pointing at
/// targets with the same name reach the same physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub name: String,
    pub push_service: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl DeliveryTarget {
    pub fn new(name: impl Into<String>, push_service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            push_service: push_service.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A resolved (provider, target) pair. Both halves are shared with the store.
#[derive(Debug, Clone)]
pub struct ProviderTargetPair {
    pub provider: Arc<PushProvider>,
    pub target: Arc<DeliveryTarget>,
}

impl ProviderTargetPair {
    pub fn new(provider: Arc<PushProvider>, target: Arc<DeliveryTarget>) -> Self {
        Self { provider, target }
    }
}

/// Backend trait for subscription storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`): many push workers
/// query and update the store concurrently.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Resolve a subscriber of a service into its provider/target pairs.
    ///
    /// Pairs are returned in a stable order; an unknown subscriber resolves
    /// to an empty list rather than an error.
    async fn lookup(
        &self,
        service: &str,
        subscriber: &str,
    ) -> Result<Vec<ProviderTargetPair>, StorageError>;

    /// Persist an updated provider, replacing the one with the same name.
    async fn persist_provider(&self, provider: &PushProvider) -> Result<(), StorageError>;

    /// Persist an updated delivery target, replacing the one with the same name.
    async fn persist_target(&self, target: &DeliveryTarget) -> Result<(), StorageError>;

    /// Register a delivery target for a subscriber under a provider.
    async fn subscribe(
        &self,
        service: &str,
        subscriber: &str,
        provider: PushProvider,
        target: DeliveryTarget,
    ) -> Result<(), StorageError>;

    /// Remove a delivery target from a subscriber.
    ///
    /// Returns the number of pairs removed.
    async fn remove_target(
        &self,
        service: &str,
        subscriber: &str,
        target: &str,
    ) -> Result<usize, StorageError>;
}
