use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, PushError};
use crate::metrics::PushMetrics;
use crate::notification::{DeliveryChain, Notification, NoopRecycler, NotificationRecycler};
use crate::push::PushBackend;
use crate::request::{FinishGuard, HandoffSender, Request};
use crate::storage::{DeliveryTarget, PushProvider, SubscriptionStore};

use super::outcome::ClassifiedOutcome;
use super::retry::{DelayedHandoff, RetryPolicy, RetryScheduler, TokioDelayedHandoff};
use super::{batch_ranges, DispatchPath, DispatchSummary};

/// Processes push requests: fans out over subscribers, resolves each one to
/// its delivery targets and drives every delivery attempt to an outcome.
///
/// Cloning is cheap; clones share collaborators and the worker permits.
#[derive(Clone)]
pub struct PushProcessor {
    pub(super) config: DispatchConfig,
    pub(super) storage: Arc<dyn SubscriptionStore>,
    pub(super) backend: Arc<dyn PushBackend>,
    pub(super) recycler: Arc<dyn NotificationRecycler>,
    pub(super) handoff: HandoffSender,
    pub(super) retries: RetryScheduler,
    /// Bounds running workers across all requests handled by this processor
    worker_permits: Arc<Semaphore>,
}

/// Everything identifying one delivery attempt
pub(super) struct Attempt<'a> {
    pub request: &'a Arc<Request>,
    pub subscriber: &'a str,
    pub provider: &'a Arc<PushProvider>,
    pub target: &'a Arc<DeliveryTarget>,
    pub notification: &'a Notification,
    pub chain: &'a DeliveryChain,
}

impl Attempt<'_> {
    pub fn error(&self, source: PushError) -> DispatchError {
        DispatchError::Push {
            provider: self.provider.name.clone(),
            subscriber: self.subscriber.to_string(),
            target: self.target.name.clone(),
            source,
        }
    }
}

impl PushProcessor {
    /// Create a processor that requeues retries through `handoff`
    pub fn new(
        config: DispatchConfig,
        storage: Arc<dyn SubscriptionStore>,
        backend: Arc<dyn PushBackend>,
        handoff: HandoffSender,
    ) -> Self {
        let retries = RetryScheduler::new(
            RetryPolicy::from(&config),
            Arc::new(TokioDelayedHandoff::new(handoff.clone())),
        );

        Self {
            config,
            storage,
            backend,
            recycler: Arc::new(NoopRecycler),
            handoff,
            retries,
            worker_permits: Arc::new(Semaphore::new(config.max_workers.max(1))),
        }
    }

    /// Set the notification recycler
    pub fn with_recycler(mut self, recycler: Arc<dyn NotificationRecycler>) -> Self {
        self.recycler = recycler;
        self
    }

    /// Replace the delayed handoff used for retries
    pub fn with_delayed_handoff(mut self, delayed: Arc<dyn DelayedHandoff>) -> Self {
        self.retries = RetryScheduler::new(self.retries.policy(), delayed);
        self
    }

    /// Process a push request.
    ///
    /// The request is finished exactly once before this returns, whichever
    /// path handles it. Retries scheduled along the way are not awaited.
    #[tracing::instrument(
        name = "processor.process",
        skip(self, request),
        fields(
            request_id = %request.id,
            service = %request.service,
            subscriber_count = request.subscribers.len()
        )
    )]
    pub async fn process(&self, request: Request) -> DispatchSummary {
        let request = Arc::new(request);
        let _finish = FinishGuard::new(&request);

        let summary = if let Some((subscriber, provider, target)) = request.direct_pair() {
            self.push_to_target(&request, subscriber, provider, target).await;
            DispatchSummary {
                path: DispatchPath::Direct,
                workers: 0,
                attempts: 1,
            }
        } else if request.subscribers.len() <= self.config.max_workers {
            // Common case: one worker per subscriber
            self.fan_out_per_subscriber(&request).await
        } else {
            self.fan_out_batched(&request).await
        };

        PushMetrics::record_request(summary.path.as_str());
        tracing::debug!(
            request_id = %request.id,
            path = %summary.path,
            workers = summary.workers,
            attempts = summary.attempts,
            retry_count = request.retry_count,
            "Push request processed"
        );

        summary
    }

    async fn fan_out_per_subscriber(&self, request: &Arc<Request>) -> DispatchSummary {
        let mut workers = JoinSet::new();

        for index in 0..request.subscribers.len() {
            let processor = self.clone();
            let request = Arc::clone(request);
            workers.spawn(async move {
                let _permit = processor.worker_permits.acquire().await.ok();
                processor.push(&request, &request.subscribers[index]).await
            });
        }

        let spawned = workers.len();
        let attempts = Self::join_workers(workers).await;

        DispatchSummary {
            path: DispatchPath::PerSubscriber,
            workers: spawned,
            attempts,
        }
    }

    async fn fan_out_batched(&self, request: &Arc<Request>) -> DispatchSummary {
        let mut workers = JoinSet::new();

        for range in batch_ranges(request.subscribers.len(), self.config.max_workers) {
            let processor = self.clone();
            let request = Arc::clone(request);
            workers.spawn(async move {
                let _permit = processor.worker_permits.acquire().await.ok();
                let mut attempts = 0;
                for subscriber in &request.subscribers[range] {
                    attempts += processor.push(&request, subscriber).await;
                }
                attempts
            });
        }

        let spawned = workers.len();
        let attempts = Self::join_workers(workers).await;

        DispatchSummary {
            path: DispatchPath::Batched,
            workers: spawned,
            attempts,
        }
    }

    /// Wait for every worker; returns the total number of delivery attempts
    async fn join_workers(mut workers: JoinSet<usize>) -> usize {
        let mut attempts = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(count) => attempts += count,
                Err(e) => tracing::error!(error = %e, "Push worker did not complete"),
            }
        }
        attempts
    }

    /// Resolve a subscriber and push once to each distinct delivery target.
    ///
    /// Returns the number of delivery attempts made.
    pub(super) async fn push(&self, request: &Arc<Request>, subscriber: &str) -> usize {
        let pairs = match self.storage.lookup(&request.service, subscriber).await {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::error!(
                    request_id = %request.id,
                    service = %request.service,
                    subscriber = %subscriber,
                    error = %e,
                    "Subscription lookup failed"
                );
                PushMetrics::record_failed("storage");
                request.respond(DispatchError::Storage {
                    subscriber: subscriber.to_string(),
                    source: e,
                });
                return 0;
            }
        };

        if pairs.is_empty() {
            tracing::warn!(
                request_id = %request.id,
                service = %request.service,
                subscriber = %subscriber,
                "Subscriber has no delivery target"
            );
            PushMetrics::record_failed("no_device");
            request.respond(DispatchError::NoDevice {
                subscriber: subscriber.to_string(),
            });
            return 0;
        }

        // The same device can be reachable through more than one provider
        let mut attempted = HashSet::with_capacity(pairs.len());
        let mut attempts = 0;

        for pair in &pairs {
            if !attempted.insert(pair.target.name.as_str()) {
                tracing::debug!(
                    request_id = %request.id,
                    subscriber = %subscriber,
                    provider = %pair.provider,
                    target = %pair.target,
                    "Skipping duplicate delivery target"
                );
                continue;
            }

            self.push_to_target(request, subscriber, &pair.provider, &pair.target)
                .await;
            attempts += 1;
        }

        attempts
    }

    /// Perform one delivery attempt and act on its classified outcome.
    ///
    /// Errors reach the response sink before any recovery action runs.
    /// Returns the outcome after credential refresh handling.
    pub async fn push_to_target(
        &self,
        request: &Arc<Request>,
        subscriber: &str,
        provider: &Arc<PushProvider>,
        target: &Arc<DeliveryTarget>,
    ) -> ClassifiedOutcome {
        let Some(notification) = request.notification.as_deref() else {
            tracing::error!(
                request_id = %request.id,
                subscriber = %subscriber,
                "Push request carries no notification"
            );
            let outcome = ClassifiedOutcome::OtherFailure(PushError::other("missing notification"));
            PushMetrics::record_failed(outcome.label());
            request.respond(DispatchError::MissingNotification(request.id));
            return outcome;
        };

        let chain = request.delivery_chain();
        let attempt = Attempt {
            request,
            subscriber,
            provider,
            target,
            notification,
            chain: &chain,
        };

        PushMetrics::record_attempt();
        let result = self.backend.push(provider, target, notification).await;

        let mut outcome = ClassifiedOutcome::classify(result);
        if let ClassifiedOutcome::CredentialRefresh(refresh) = outcome {
            outcome = self
                .refresh_credentials(request, &provider.push_service, refresh)
                .await;
        }

        if !outcome.is_success() {
            PushMetrics::record_failed(outcome.label());
        }

        match &outcome {
            ClassifiedOutcome::Success(message_id) => {
                self.push_succeeded(&attempt, message_id);
            }
            ClassifiedOutcome::Retryable { retry_after } => {
                request.respond(DispatchError::RetryPending {
                    provider: provider.name.clone(),
                    subscriber: subscriber.to_string(),
                    target: target.name.clone(),
                });
                self.push_retry(&attempt, *retry_after);
            }
            ClassifiedOutcome::PermanentlyUnregistered => {
                request.respond(attempt.error(PushError::Unregistered));
                self.unsubscribe(&attempt).await;
            }
            ClassifiedOutcome::OtherFailure(error) => {
                request.respond(attempt.error(error.clone()));
                self.push_failed(&attempt, error);
            }
            ClassifiedOutcome::CredentialRefresh(refresh) => {
                // A refresh whose cause is another refresh cannot be judged
                let error = PushError::RefreshData(refresh.clone());
                request.respond(attempt.error(error.clone()));
                self.push_failed(&attempt, &error);
            }
        }

        outcome
    }
}
