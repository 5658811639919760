//! Retry policy and delayed requeueing.
//!
//! A retry is a brand-new direct request submitted back onto the handoff
//! queue after a delay. The delay runs on its own task; nothing waits on it.

use std::sync::Arc;
use std::time::Duration;

use crate::config::DispatchConfig;
use crate::notification::DeliveryChain;
use crate::request::{HandoffSender, Request};
use crate::storage::{DeliveryTarget, PushProvider};

/// Backoff and retry-budget policy.
///
/// Pure exponential: the first retry waits `initial_backoff`, each later one
/// doubles the previous backoff. No jitter and no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

/// A retry decided by [`RetryPolicy::plan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    /// Retry count carried by the new request
    pub retry_count: u32,
    /// Backoff recorded on the new request; the base for the next doubling
    pub backoff: Duration,
    /// How long to wait before submitting; a backend hint overrides `backoff`
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(config.initial_backoff_seconds),
        }
    }
}

impl RetryPolicy {
    /// Decide the retry following a transient failure.
    ///
    /// `retry_count` and `previous_backoff` come from the failed request.
    /// Returns `None` once the retry budget is spent.
    pub fn plan(
        &self,
        retry_count: u32,
        previous_backoff: Duration,
        retry_after: Option<u64>,
    ) -> Option<RetryPlan> {
        if retry_count >= self.max_retries {
            return None;
        }

        let backoff = if retry_count == 0 || previous_backoff.is_zero() {
            self.initial_backoff
        } else {
            previous_backoff.checked_mul(2).unwrap_or(Duration::MAX)
        };

        // The backend hint only changes this wait, never the tracked backoff
        let wait = match retry_after {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds),
            _ => backoff,
        };

        Some(RetryPlan {
            retry_count: retry_count + 1,
            backoff,
            wait,
        })
    }
}

/// Delivers a request onto the handoff queue after a delay.
///
/// Must not block the caller: the worker that detected the failure moves on
/// immediately.
pub trait DelayedHandoff: Send + Sync {
    fn schedule(&self, delay: Duration, request: Request);
}

/// Sleeps on a spawned tokio task, then submits to the handoff queue
#[derive(Debug, Clone)]
pub struct TokioDelayedHandoff {
    handoff: HandoffSender,
}

impl TokioDelayedHandoff {
    pub fn new(handoff: HandoffSender) -> Self {
        Self { handoff }
    }
}

impl DelayedHandoff for TokioDelayedHandoff {
    fn schedule(&self, delay: Duration, request: Request) {
        let handoff = self.handoff.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let request_id = request.id;
            let retry_count = request.retry_count;
            if handoff.send(request).await.is_err() {
                tracing::warn!(
                    request_id = %request_id,
                    retry_count = retry_count,
                    "Handoff queue closed, dropping retry"
                );
            }
        });
    }
}

/// Applies the retry policy and requeues retries through a [`DelayedHandoff`]
#[derive(Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    delayed: Arc<dyn DelayedHandoff>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, delayed: Arc<dyn DelayedHandoff>) -> Self {
        Self { policy, delayed }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Schedule the retry of a failed delivery.
    ///
    /// Returns the plan when a retry was scheduled, `None` when the budget
    /// was already spent and nothing was issued.
    pub fn schedule(
        &self,
        failed: &Arc<Request>,
        subscriber: &str,
        provider: &Arc<PushProvider>,
        target: &Arc<DeliveryTarget>,
        chain: &DeliveryChain,
        retry_after: Option<u64>,
    ) -> Option<RetryPlan> {
        let plan = self
            .policy
            .plan(failed.retry_count, failed.backoff, retry_after)?;

        let retry = Request::retry_of(
            failed,
            subscriber,
            Arc::clone(provider),
            Arc::clone(target),
            chain.clone(),
            plan.backoff,
        );
        self.delayed.schedule(plan.wait, retry);

        Some(plan)
    }
}
