// Engine counters
//
// Retry and telemetry counts go to an injected collector instead of living
// on the entities they describe.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    StepAttempt,
    StepRetry,
    StepTimeout,
    StepFailed,
    ApprovalRequested,
    Delegation,
    PlanningFailure,
    AuditWriteFailure,
    BroadcastRecipientFailed,
}

pub trait MetricsCollector: Send + Sync {
    fn increment(&self, counter: Counter);

    fn snapshot(&self) -> BTreeMap<Counter, u64>;
}

#[derive(Default)]
pub struct InMemoryMetrics {
    counts: Mutex<BTreeMap<Counter, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.snapshot().get(&counter).copied().unwrap_or(0)
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn increment(&self, counter: Counter) {
        match self.counts.lock() {
            Ok(mut counts) => *counts.entry(counter).or_insert(0) += 1,
            Err(_) => tracing::warn!(?counter, "metrics lock poisoned, increment dropped"),
        }
    }

    fn snapshot(&self) -> BTreeMap<Counter, u64> {
        self.counts.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_counted_per_counter() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Counter::StepRetry);
        metrics.increment(Counter::StepRetry);
        metrics.increment(Counter::StepTimeout);

        assert_eq!(metrics.get(Counter::StepRetry), 2);
        assert_eq!(metrics.get(Counter::StepTimeout), 1);
        assert_eq!(metrics.get(Counter::Delegation), 0);
    }
}
