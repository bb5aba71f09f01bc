//! Counter Reconciler.
//!
//! Audit counters are recomputed from the child rows, never adjusted by
//! deltas, so concurrent transitions converge without coordination.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::types::AuditCounters;
use crate::clock::Clock;
use crate::error::Result;
use crate::ports::AuditStore;

#[derive(Clone)]
pub struct CounterReconciler {
    audits: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl CounterReconciler {
    pub fn new(audits: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { audits, clock }
    }

    /// Returns `(total_requests, open_requests)` after writing them.
    pub async fn reconcile_requests(&self, org_id: Uuid, audit_id: Uuid) -> Result<(i32, i32)> {
        let counts = self.audits.request_status_counts(org_id, audit_id).await?;
        let (total, open) = fold_counts(counts.iter().map(|(s, n)| (s.is_open(), *n)));
        self.audits
            .set_request_counters(org_id, audit_id, total, open, self.clock.now())
            .await?;
        Ok((total, open))
    }

    /// Returns `(total_findings, open_findings)` after writing them.
    pub async fn reconcile_findings(&self, org_id: Uuid, audit_id: Uuid) -> Result<(i32, i32)> {
        let counts = self.audits.finding_status_counts(org_id, audit_id).await?;
        let (total, open) = fold_counts(counts.iter().map(|(s, n)| (s.is_open(), *n)));
        self.audits
            .set_finding_counters(org_id, audit_id, total, open, self.clock.now())
            .await?;
        Ok((total, open))
    }

    pub async fn reconcile_all(&self, org_id: Uuid, audit_id: Uuid) -> Result<AuditCounters> {
        let (total_requests, open_requests) = self.reconcile_requests(org_id, audit_id).await?;
        let (total_findings, open_findings) = self.reconcile_findings(org_id, audit_id).await?;
        Ok(AuditCounters {
            total_requests,
            open_requests,
            total_findings,
            open_findings,
        })
    }

    /// Recomputes every audit of the org; returns how many were touched.
    pub async fn reconcile_org(&self, org_id: Uuid) -> Result<usize> {
        let ids = self.audits.list_audit_ids(org_id).await?;
        for audit_id in &ids {
            self.reconcile_all(org_id, *audit_id).await?;
        }
        tracing::info!(%org_id, audits = ids.len(), "counters reconciled");
        Ok(ids.len())
    }

    /// Post-mutation hook. The mutation is already committed, so a failed
    /// recompute is logged and left for the next one.
    pub async fn after_request_change(&self, org_id: Uuid, audit_id: Uuid) {
        if let Err(e) = self.reconcile_requests(org_id, audit_id).await {
            tracing::warn!(%audit_id, error = %e, "request counter recompute failed");
        }
    }

    pub async fn after_finding_change(&self, org_id: Uuid, audit_id: Uuid) {
        if let Err(e) = self.reconcile_findings(org_id, audit_id).await {
            tracing::warn!(%audit_id, error = %e, "finding counter recompute failed");
        }
    }
}

fn fold_counts(rows: impl Iterator<Item = (bool, u64)>) -> (i32, i32) {
    rows.fold((0i32, 0i32), |(total, open), (is_open, n)| {
        let n = i32::try_from(n).unwrap_or(i32::MAX);
        (
            total.saturating_add(n),
            if is_open { open.saturating_add(n) } else { open },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_separates_open_rows() {
        let rows = vec![(true, 3u64), (false, 2), (true, 1)];
        assert_eq!(fold_counts(rows.into_iter()), (6, 4));
        assert_eq!(fold_counts(std::iter::empty()), (0, 0));
    }
}
