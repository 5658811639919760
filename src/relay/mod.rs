//! Handoff queue consumer.
//!
//! The relay drains the handoff queue and routes each request to the
//! processor for its action. Every request runs on its own task so a slow
//! fan-out never holds up the queue, including the retries and unsubscribes
//! that processors feed back into it.

use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::dispatch::{PushProcessor, UnsubscribeProcessor};
use crate::request::{Action, HandoffReceiver, Request};

/// Counts of requests routed during one relay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub push_requests: u64,
    pub unsubscribe_requests: u64,
}

/// Background task consuming the handoff queue
pub struct Relay {
    push: PushProcessor,
    unsubscribe: UnsubscribeProcessor,
    inbox: HandoffReceiver,
    shutdown: broadcast::Receiver<()>,
    in_flight: JoinSet<()>,
    stats: RelayStats,
}

impl Relay {
    pub fn new(
        push: PushProcessor,
        unsubscribe: UnsubscribeProcessor,
        inbox: HandoffReceiver,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            push,
            unsubscribe,
            inbox,
            shutdown,
            in_flight: JoinSet::new(),
            stats: RelayStats::default(),
        }
    }

    /// Run until a shutdown signal arrives or the handoff queue closes.
    ///
    /// Requests already queued are routed and every in-flight request is
    /// awaited before returning. Retries still sleeping are not, and are
    /// dropped when they find the queue closed.
    pub async fn run(mut self) -> RelayStats {
        tracing::info!("Relay started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Relay received shutdown signal");
                    break;
                }
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Relay task did not complete");
                    }
                }
                received = self.inbox.recv() => match received {
                    Some(request) => self.route(request),
                    None => {
                        tracing::info!("Handoff queue closed");
                        break;
                    }
                },
            }
        }

        // Stop accepting work; requests already queued are still routed so
        // each of them is finished
        self.inbox.close();
        let mut drained = 0;
        while let Some(request) = self.inbox.recv().await {
            self.route(request);
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(drained = drained, "Routed requests queued before shutdown");
        }

        let pending = self.in_flight.len();
        if pending > 0 {
            tracing::info!(pending = pending, "Waiting for in-flight requests");
        }
        while let Some(result) = self.in_flight.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay task did not complete");
            }
        }

        tracing::info!(
            push_requests = self.stats.push_requests,
            unsubscribe_requests = self.stats.unsubscribe_requests,
            "Relay stopped"
        );
        self.stats
    }

    fn route(&mut self, request: Request) {
        tracing::debug!(
            request_id = %request.id,
            action = %request.action,
            retry_count = request.retry_count,
            "Routing request"
        );

        match request.action {
            Action::Push => {
                self.stats.push_requests += 1;
                let processor = self.push.clone();
                self.in_flight.spawn(async move {
                    processor.process(request).await;
                });
            }
            Action::Unsubscribe => {
                self.stats.unsubscribe_requests += 1;
                let processor = self.unsubscribe.clone();
                self.in_flight.spawn(async move {
                    processor.process(request).await;
                });
            }
        }
    }
}
