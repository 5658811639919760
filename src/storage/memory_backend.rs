//! In-memory subscription store using DashMap.
//!
//! Subscriptions are lost on restart. Providers and targets are kept in
//! registries keyed by name so that a persisted update is visible to every
//! subscriber that references it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageError;

use super::{DeliveryTarget, ProviderTargetPair, PushProvider, SubscriptionStore};

/// Subscription key: service and subscriber
type SubscriptionKey = (String, String);

/// Pair of names, resolved through the registries on lookup
#[derive(Debug, Clone, PartialEq, Eq)]
struct PairRef {
    provider: String,
    target: String,
}

/// In-memory subscription store.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    /// Per-subscriber pairs, in registration order
    subscriptions: DashMap<SubscriptionKey, Vec<PairRef>>,
    providers: DashMap<String, Arc<PushProvider>>,
    targets: DashMap<String, Arc<DeliveryTarget>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers with at least one delivery target
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Current stored version of a provider
    pub fn provider(&self, name: &str) -> Option<Arc<PushProvider>> {
        self.providers.get(name).map(|p| p.clone())
    }

    /// Current stored version of a delivery target
    pub fn target(&self, name: &str) -> Option<Arc<DeliveryTarget>> {
        self.targets.get(name).map(|t| t.clone())
    }

    fn key(service: &str, subscriber: &str) -> SubscriptionKey {
        (service.to_string(), subscriber.to_string())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn lookup(
        &self,
        service: &str,
        subscriber: &str,
    ) -> Result<Vec<ProviderTargetPair>, StorageError> {
        // Clone the refs so no shard lock is held while touching the registries
        let refs = match self.subscriptions.get(&Self::key(service, subscriber)) {
            Some(refs) => refs.clone(),
            None => return Ok(Vec::new()),
        };

        refs.into_iter()
            .map(|pair| {
                let provider = self.provider(&pair.provider).ok_or_else(|| {
                    StorageError::Inconsistent(format!("unknown provider {}", pair.provider))
                })?;
                let target = self.target(&pair.target).ok_or_else(|| {
                    StorageError::Inconsistent(format!("unknown delivery target {}", pair.target))
                })?;
                Ok(ProviderTargetPair::new(provider, target))
            })
            .collect()
    }

    async fn persist_provider(&self, provider: &PushProvider) -> Result<(), StorageError> {
        self.providers
            .insert(provider.name.clone(), Arc::new(provider.clone()));
        Ok(())
    }

    async fn persist_target(&self, target: &DeliveryTarget) -> Result<(), StorageError> {
        self.targets
            .insert(target.name.clone(), Arc::new(target.clone()));
        Ok(())
    }

    async fn subscribe(
        &self,
        service: &str,
        subscriber: &str,
        provider: PushProvider,
        target: DeliveryTarget,
    ) -> Result<(), StorageError> {
        let pair = PairRef {
            provider: provider.name.clone(),
            target: target.name.clone(),
        };

        self.providers
            .entry(provider.name.clone())
            .or_insert_with(|| Arc::new(provider));
        self.targets
            .entry(target.name.clone())
            .or_insert_with(|| Arc::new(target));

        let mut pairs = self
            .subscriptions
            .entry(Self::key(service, subscriber))
            .or_default();
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }

        tracing::debug!(
            service = %service,
            subscriber = %subscriber,
            pairs = pairs.len(),
            "Delivery target subscribed"
        );

        Ok(())
    }

    async fn remove_target(
        &self,
        service: &str,
        subscriber: &str,
        target: &str,
    ) -> Result<usize, StorageError> {
        let key = Self::key(service, subscriber);

        let removed = match self.subscriptions.get_mut(&key) {
            Some(mut pairs) => {
                let before = pairs.len();
                pairs.retain(|pair| pair.target != target);
                before - pairs.len()
            }
            None => 0,
        };

        // Drop the subscriber entirely once no target is left
        self.subscriptions.remove_if(&key, |_, pairs| pairs.is_empty());

        Ok(removed)
    }
}
