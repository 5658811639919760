//! Reactions to classified delivery outcomes.

use std::sync::Arc;

use crate::error::{PushError, RefreshData};
use crate::metrics::{PushMetrics, RecoveryMetrics};
use crate::request::Request;

use super::outcome::ClassifiedOutcome;
use super::processor::{Attempt, PushProcessor};

impl PushProcessor {
    /// Persist refreshed credentials and re-evaluate the wrapped cause.
    ///
    /// Provider and target are persisted independently; a failed write is
    /// logged and does not change the outcome. With no cause left the push
    /// counts as delivered.
    pub(super) async fn refresh_credentials(
        &self,
        request: &Request,
        push_service: &str,
        refresh: RefreshData,
    ) -> ClassifiedOutcome {
        if let Some(provider) = &refresh.provider {
            match self.storage.persist_provider(provider).await {
                Ok(()) => {
                    RecoveryMetrics::record_provider_refreshed();
                    tracing::info!(
                        push_service = %push_service,
                        request_id = %request.id,
                        service = %request.service,
                        provider = %provider,
                        "Updated push service provider"
                    );
                }
                Err(e) => tracing::warn!(
                    push_service = %push_service,
                    request_id = %request.id,
                    provider = %provider,
                    error = %e,
                    "Failed to persist refreshed provider"
                ),
            }
        }

        if let Some(target) = &refresh.target {
            match self.storage.persist_target(target).await {
                Ok(()) => {
                    RecoveryMetrics::record_target_refreshed();
                    tracing::info!(
                        push_service = %push_service,
                        request_id = %request.id,
                        target = %target,
                        "Updated delivery target"
                    );
                }
                Err(e) => tracing::warn!(
                    push_service = %push_service,
                    request_id = %request.id,
                    target = %target,
                    error = %e,
                    "Failed to persist refreshed delivery target"
                ),
            }
        }

        match refresh.cause {
            None => ClassifiedOutcome::Success(refresh.message_id.unwrap_or_default()),
            Some(cause) => ClassifiedOutcome::classify(Err(*cause)),
        }
    }

    pub(super) fn push_succeeded(&self, attempt: &Attempt<'_>, message_id: &str) {
        PushMetrics::record_success();
        tracing::info!(
            push_service = %attempt.provider.push_service,
            request_id = %attempt.request.id,
            service = %attempt.request.service,
            subscriber = %attempt.subscriber,
            provider = %attempt.provider,
            target = %attempt.target,
            message_id = %message_id,
            "Push succeeded"
        );
        self.release(attempt);
    }

    pub(super) fn push_failed(&self, attempt: &Attempt<'_>, error: &PushError) {
        tracing::error!(
            push_service = %attempt.provider.push_service,
            request_id = %attempt.request.id,
            service = %attempt.request.service,
            subscriber = %attempt.subscriber,
            provider = %attempt.provider,
            target = %attempt.target,
            error = %error,
            "Push failed"
        );
        tracing::debug!(
            push_service = %attempt.provider.push_service,
            request_id = %attempt.request.id,
            service = %attempt.request.service,
            subscriber = %attempt.subscriber,
            provider = ?attempt.provider,
            target = ?attempt.target,
            notification = ?attempt.notification,
            error = ?error,
            "Push failed (full context)"
        );
        self.release(attempt);
    }

    /// Hand a transient failure to the retry scheduler.
    ///
    /// The payload stays unreleased while a retry is pending.
    pub(super) fn push_retry(&self, attempt: &Attempt<'_>, retry_after: Option<u64>) {
        let plan = self.retries.schedule(
            attempt.request,
            attempt.subscriber,
            attempt.provider,
            attempt.target,
            attempt.chain,
            retry_after,
        );

        match plan {
            Some(plan) => {
                RecoveryMetrics::record_retry_scheduled();
                tracing::warn!(
                    push_service = %attempt.provider.push_service,
                    request_id = %attempt.request.id,
                    service = %attempt.request.service,
                    subscriber = %attempt.subscriber,
                    provider = %attempt.provider,
                    target = %attempt.target,
                    retry_count = plan.retry_count,
                    wait_secs = plan.wait.as_secs(),
                    "Push failed, retry scheduled"
                );
            }
            None => {
                RecoveryMetrics::record_retry_exhausted();
                tracing::error!(
                    push_service = %attempt.provider.push_service,
                    request_id = %attempt.request.id,
                    service = %attempt.request.service,
                    subscriber = %attempt.subscriber,
                    provider = %attempt.provider,
                    target = %attempt.target,
                    retry_count = attempt.request.retry_count,
                    "Push failed, retries exhausted"
                );
                self.release(attempt);
            }
        }
    }

    /// Emit an unsubscribe request for a target the push service rejected.
    ///
    /// Only the enqueue is awaited, never the unsubscription itself.
    pub(super) async fn unsubscribe(&self, attempt: &Attempt<'_>) {
        let request = Request::unsubscribe_of(
            attempt.request,
            attempt.subscriber,
            Arc::clone(attempt.target),
        );

        tracing::info!(
            push_service = %attempt.provider.push_service,
            request_id = %attempt.request.id,
            service = %attempt.request.service,
            subscriber = %attempt.subscriber,
            provider = %attempt.provider,
            target = %attempt.target,
            "Delivery target unregistered, requesting unsubscribe"
        );

        match self.handoff.send(request).await {
            Ok(()) => RecoveryMetrics::record_unsubscribe_emitted(),
            Err(_) => tracing::warn!(
                request_id = %attempt.request.id,
                subscriber = %attempt.subscriber,
                target = %attempt.target,
                "Handoff queue closed, dropping unsubscribe"
            ),
        }

        self.release(attempt);
    }

    fn release(&self, attempt: &Attempt<'_>) {
        attempt
            .chain
            .release(attempt.notification, self.recycler.as_ref());
    }
}
