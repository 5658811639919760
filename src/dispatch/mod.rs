//! Push dispatching: fan-out, resolution, delivery, recovery and retries.
//!
//! Control flow for one push request:
//!
//! ```text
//! PushProcessor::process
//!   -> direct pair?          push_to_target (inline, no workers)
//!   -> subscribers <= cap?   one worker per subscriber
//!   -> otherwise             `cap` workers over contiguous batches
//! push (resolve + dedup) -> push_to_target -> recovery
//!   -> retry scheduler -> handoff queue -> back into process
//! ```

mod outcome;
mod processor;
mod recovery;
mod retry;
mod unsubscribe;

use std::fmt;
use std::ops::Range;

use serde::Serialize;

pub use outcome::ClassifiedOutcome;
pub use processor::PushProcessor;
pub use retry::{DelayedHandoff, RetryPlan, RetryPolicy, RetryScheduler, TokioDelayedHandoff};
pub use unsubscribe::UnsubscribeProcessor;

/// How a request was spread over workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPath {
    /// Single pre-resolved pair, handled inline
    Direct,
    /// One worker per subscriber
    PerSubscriber,
    /// One worker per contiguous batch of subscribers
    Batched,
}

impl DispatchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchPath::Direct => "direct",
            DispatchPath::PerSubscriber => "per_subscriber",
            DispatchPath::Batched => "batched",
        }
    }
}

impl fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub path: DispatchPath,
    /// Workers spawned (0 for the direct path)
    pub workers: usize,
    /// Delivery attempts performed, after deduplication
    pub attempts: usize,
}

/// Split `total` subscribers into `workers` contiguous batches.
///
/// Every batch but the last holds `total / workers` subscribers; the last one
/// absorbs the remainder. When `total <= workers` each subscriber gets its
/// own batch.
pub fn batch_ranges(total: usize, workers: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }

    let workers = workers.clamp(1, total);
    let per_batch = total / workers;

    (0..workers)
        .map(|i| {
            let start = i * per_batch;
            let end = if i + 1 == workers { total } else { start + per_batch };
            start..end
        })
        .collect()
}
