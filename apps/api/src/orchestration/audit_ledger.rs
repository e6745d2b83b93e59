use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::errors::{EngineError, EngineResult};
use super::metrics::{Counter, MetricsCollector};
use crate::domain::audit::{AuditLogEntry, AuditQuery};
use crate::domain::repositories::AuditRepository;

const REDELIVERY_ATTEMPTS: u32 = 5;
const REDELIVERY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Append-only audit trail of automatic and human-gated decisions
///
/// Recording never fails the caller. A failed write is logged, counted and
/// handed to a background task that keeps retrying it.
pub struct AuditLedger {
    repo: Arc<dyn AuditRepository>,
    metrics: Arc<dyn MetricsCollector>,
    redelivery: Option<mpsc::UnboundedSender<AuditLogEntry>>,
}

impl AuditLedger {
    /// Must be called inside a tokio runtime for redelivery to run
    pub fn new(repo: Arc<dyn AuditRepository>, metrics: Arc<dyn MetricsCollector>) -> Self {
        let redelivery = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let (tx, rx) = mpsc::unbounded_channel();
            handle.spawn(redeliver(repo.clone(), rx));
            tx
        });
        if redelivery.is_none() {
            tracing::warn!("no runtime available, failed audit writes will not be retried");
        }

        Self {
            repo,
            metrics,
            redelivery,
        }
    }

    #[tracing::instrument(skip(self, entry), fields(action_type = %entry.action_type, execution_id = ?entry.execution_id))]
    pub async fn record(&self, entry: AuditLogEntry) {
        if let Err(e) = self.repo.append(&entry).await {
            self.metrics.increment(Counter::AuditWriteFailure);
            tracing::error!(error = %e, entry_id = %entry.id, "audit write failed, queued for redelivery");
            let queued = self
                .redelivery
                .as_ref()
                .map(|tx| tx.send(entry).is_ok())
                .unwrap_or(false);
            if !queued {
                tracing::error!("audit redelivery unavailable, entry dropped");
            }
        }
    }

    pub async fn query(&self, workspace_id: Uuid, query: &AuditQuery) -> EngineResult<Vec<AuditLogEntry>> {
        query.validate().map_err(EngineError::Validation)?;
        Ok(self.repo.query(workspace_id, query).await?)
    }
}

async fn redeliver(repo: Arc<dyn AuditRepository>, mut rx: mpsc::UnboundedReceiver<AuditLogEntry>) {
    while let Some(entry) = rx.recv().await {
        let mut delivered = false;
        for attempt in 1..=REDELIVERY_ATTEMPTS {
            tokio::time::sleep(REDELIVERY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
            match repo.append(&entry).await {
                Ok(()) => {
                    tracing::info!(entry_id = %entry.id, attempt, "audit entry redelivered");
                    delivered = true;
                    break;
                }
                Err(e) => tracing::warn!(entry_id = %entry.id, attempt, error = %e, "audit redelivery failed"),
            }
        }
        if !delivered {
            tracing::error!(entry_id = %entry.id, action_type = %entry.action_type, "audit entry dropped after retries");
        }
    }
}
