use std::sync::Arc;

use crate::error::DispatchError;
use crate::metrics::RecoveryMetrics;
use crate::request::{FinishGuard, Request};
use crate::storage::SubscriptionStore;

/// Applies unsubscribe requests to the subscription store
#[derive(Clone)]
pub struct UnsubscribeProcessor {
    storage: Arc<dyn SubscriptionStore>,
}

impl UnsubscribeProcessor {
    pub fn new(storage: Arc<dyn SubscriptionStore>) -> Self {
        Self { storage }
    }

    /// Remove the request's delivery target from each of its subscribers.
    ///
    /// Returns the number of subscriptions removed. Finishes the request
    /// exactly once.
    #[tracing::instrument(
        name = "unsubscribe.process",
        skip(self, request),
        fields(request_id = %request.id, service = %request.service)
    )]
    pub async fn process(&self, request: Request) -> usize {
        let request = Arc::new(request);
        let _finish = FinishGuard::new(&request);

        let Some(target) = request.target.as_ref() else {
            tracing::warn!(request_id = %request.id, "Unsubscribe request carries no delivery target");
            request.respond(DispatchError::MissingDeliveryTarget(request.id));
            return 0;
        };

        let mut removed = 0;
        for subscriber in &request.subscribers {
            match self
                .storage
                .remove_target(&request.service, subscriber, &target.name)
                .await
            {
                Ok(count) => {
                    removed += count;
                    if count > 0 {
                        RecoveryMetrics::record_unsubscribe_applied();
                    }
                    tracing::info!(
                        request_id = %request.id,
                        service = %request.service,
                        subscriber = %subscriber,
                        target = %target,
                        removed = count,
                        "Unsubscribed delivery target"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request.id,
                        service = %request.service,
                        subscriber = %subscriber,
                        target = %target,
                        error = %e,
                        "Failed to unsubscribe delivery target"
                    );
                    request.respond(DispatchError::Storage {
                        subscriber: subscriber.clone(),
                        source: e,
                    });
                }
            }
        }

        removed
    }
}
