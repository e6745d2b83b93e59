// Waitpoints
//
// A waitpoint is a one-shot future keyed by `(execution_id, step_id)` that
// completes when the approval parked on it is resolved. The execution itself
// is never blocked on it: the engine parks the execution as `paused` in the
// datastore, and the waitpoint only lets in-process callers await the
// decision.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::approval::ApprovalStatus;

struct Slot {
    key: (Uuid, String),
    sender: watch::Sender<Option<ApprovalStatus>>,
}

#[derive(Default)]
struct Registry {
    by_token: HashMap<Uuid, Slot>,
    by_step: HashMap<(Uuid, String), Uuid>,
    /// Outcomes kept until the execution is released, for late waiters
    resolved: HashMap<Uuid, (Uuid, ApprovalStatus)>,
}

#[derive(Default)]
pub struct Waitpoints {
    registry: Mutex<Registry>,
}

impl Waitpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a waitpoint for a step; replaces any open one for the same step
    pub fn create(&self, execution_id: Uuid, step_id: &str) -> Uuid {
        let token = Uuid::new_v4();
        let key = (execution_id, step_id.to_string());
        let (sender, _) = watch::channel(None);

        if let Ok(mut registry) = self.registry.lock() {
            if let Some(previous) = registry.by_step.insert(key.clone(), token) {
                registry.by_token.remove(&previous);
            }
            registry.by_token.insert(token, Slot { key, sender });
        }
        token
    }

    pub fn token_for(&self, execution_id: Uuid, step_id: &str) -> Option<Uuid> {
        let registry = self.registry.lock().ok()?;
        registry.by_step.get(&(execution_id, step_id.to_string())).copied()
    }

    /// Waits for the waitpoint to be resolved
    ///
    /// Returns `None` for unknown tokens or waitpoints released without a
    /// decision (e.g. after a process restart the engine falls back to the
    /// persisted approval).
    pub async fn wait(&self, token: Uuid) -> Option<ApprovalStatus> {
        let mut receiver = {
            let registry = self.registry.lock().ok()?;
            if let Some((_, status)) = registry.resolved.get(&token) {
                return Some(*status);
            }
            registry.by_token.get(&token)?.sender.subscribe()
        };

        loop {
            if let Some(status) = *receiver.borrow_and_update() {
                return Some(status);
            }
            if receiver.changed().await.is_err() {
                return *receiver.borrow();
            }
        }
    }

    /// Completes the waitpoint; returns false if the token is not open
    pub fn resolve(&self, token: Uuid, status: ApprovalStatus) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        let Some(slot) = registry.by_token.remove(&token) else {
            return false;
        };
        registry.by_step.remove(&slot.key);
        registry.resolved.insert(token, (slot.key.0, status));
        slot.sender.send_replace(Some(status));
        true
    }

    /// Drops every waitpoint of an execution; open ones end without a decision
    pub fn release(&self, execution_id: Uuid) {
        if let Ok(mut registry) = self.registry.lock() {
            let tokens: Vec<Uuid> = registry
                .by_token
                .iter()
                .filter(|(_, slot)| slot.key.0 == execution_id)
                .map(|(token, _)| *token)
                .collect();
            for token in tokens {
                if let Some(slot) = registry.by_token.remove(&token) {
                    registry.by_step.remove(&slot.key);
                }
            }
            registry.resolved.retain(|_, (execution, _)| *execution != execution_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn waiter_receives_resolution() {
        let waitpoints = Arc::new(Waitpoints::new());
        let execution = Uuid::new_v4();
        let token = waitpoints.create(execution, "send");
        assert_eq!(waitpoints.token_for(execution, "send"), Some(token));

        let waiter = {
            let waitpoints = waitpoints.clone();
            tokio::spawn(async move { waitpoints.wait(token).await })
        };
        tokio::task::yield_now().await;

        assert!(waitpoints.resolve(token, ApprovalStatus::Approved));
        assert_eq!(waiter.await.unwrap(), Some(ApprovalStatus::Approved));
        assert_eq!(waitpoints.token_for(execution, "send"), None);
        assert_eq!(waitpoints.wait(token).await, Some(ApprovalStatus::Approved));
    }

    #[tokio::test]
    async fn resolving_twice_is_refused() {
        let waitpoints = Waitpoints::new();
        let token = waitpoints.create(Uuid::new_v4(), "a");

        assert!(waitpoints.resolve(token, ApprovalStatus::Rejected));
        assert!(!waitpoints.resolve(token, ApprovalStatus::Approved));
    }

    #[tokio::test]
    async fn released_waitpoint_yields_none() {
        let waitpoints = Arc::new(Waitpoints::new());
        let execution = Uuid::new_v4();
        let token = waitpoints.create(execution, "a");

        let waiter = {
            let waitpoints = waitpoints.clone();
            tokio::spawn(async move { waitpoints.wait(token).await })
        };
        tokio::task::yield_now().await;
        waitpoints.release(execution);

        assert_eq!(waiter.await.unwrap(), None);
        assert_eq!(waitpoints.wait(token).await, None);
    }
}
