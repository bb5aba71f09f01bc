use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::types::*;
use crate::error::{GrcError, Result};
use crate::pagination::PageRequest;
use crate::ports::AuditStore;

use super::{contains_ci, directed, replace_row, MemoryStore};

fn audit_matches(a: &Audit, f: &AuditFilter) -> bool {
    if f.status.is_some_and(|s| s != a.status)
        || f.audit_type.is_some_and(|t| t != a.audit_type)
        || f.framework_id.is_some_and(|id| Some(id) != a.framework_id)
        || f.auditor_id.is_some_and(|id| !a.auditor_ids.contains(&id))
    {
        return false;
    }
    match f.q.as_deref().map(str::to_lowercase) {
        Some(q) => {
            contains_ci(&a.title, &q)
                || a.description.as_deref().is_some_and(|d| contains_ci(d, &q))
                || a.audit_firm.as_deref().is_some_and(|d| contains_ci(d, &q))
        }
        None => true,
    }
}

fn compare_audits(a: &Audit, b: &Audit, field: AuditSortField) -> Ordering {
    match field {
        AuditSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        AuditSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        AuditSortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        AuditSortField::Status => a.status.as_str().cmp(b.status.as_str()),
        AuditSortField::PlannedStart => a.planned_start.cmp(&b.planned_start),
    }
}

fn request_matches(r: &AuditRequest, f: &RequestFilter) -> bool {
    if f.status.is_some_and(|s| s != r.status)
        || f.priority.is_some_and(|p| p != r.priority)
        || f.assigned_to.is_some_and(|u| Some(u) != r.assigned_to)
        || f.control_id.is_some_and(|c| Some(c) != r.control_id)
    {
        return false;
    }
    match f.q.as_deref().map(str::to_lowercase) {
        Some(q) => {
            contains_ci(&r.title, &q)
                || r.description.as_deref().is_some_and(|d| contains_ci(d, &q))
                || r.reference_number.as_deref().is_some_and(|n| contains_ci(n, &q))
        }
        None => true,
    }
}

fn finding_matches(x: &AuditFinding, f: &FindingFilter) -> bool {
    if f.status.is_some_and(|s| s != x.status)
        || f.severity.is_some_and(|s| s != x.severity)
        || f.remediation_owner_id.is_some_and(|u| Some(u) != x.remediation_owner_id)
        || f.control_id.is_some_and(|c| Some(c) != x.control_id)
    {
        return false;
    }
    match f.q.as_deref().map(str::to_lowercase) {
        Some(q) => contains_ci(&x.title, &q) || contains_ci(&x.description, &q),
        None => true,
    }
}

/// Group-by count preserving first-seen order.
fn histogram<K: Copy + Eq + Hash>(keys: impl Iterator<Item = K>) -> Vec<(K, u64)> {
    let mut order = Vec::new();
    let mut counts: HashMap<K, u64> = HashMap::new();
    for key in keys {
        let n = counts.entry(key).or_insert(0);
        if *n == 0 {
            order.push(key);
        }
        *n += 1;
    }
    order.into_iter().map(|k| (k, counts[&k])).collect()
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit(&self, audit: &Audit) -> Result<()> {
        self.state.write().await.audits.push(audit.clone());
        Ok(())
    }

    async fn get_audit(&self, org_id: Uuid, id: Uuid) -> Result<Option<Audit>> {
        let state = self.state.read().await;
        Ok(state
            .audits
            .iter()
            .find(|a| a.org_id == org_id && a.id == id)
            .cloned())
    }

    /// Counters belong to the reconciler; an engagement update keeps the
    /// stored values.
    async fn update_audit(&self, audit: &Audit) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .audits
            .iter_mut()
            .find(|a| a.org_id == audit.org_id && a.id == audit.id)
            .ok_or_else(|| GrcError::NotFound(format!("audit {}", audit.id)))?;
        let counters = (
            slot.total_requests,
            slot.open_requests,
            slot.total_findings,
            slot.open_findings,
        );
        *slot = audit.clone();
        (
            slot.total_requests,
            slot.open_requests,
            slot.total_findings,
            slot.open_findings,
        ) = counters;
        Ok(())
    }

    async fn list_audits(
        &self,
        org_id: Uuid,
        filter: &AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<(Vec<Audit>, u64)> {
        let state = self.state.read().await;
        let mut rows: Vec<Audit> = state
            .audits
            .iter()
            .filter(|a| a.org_id == org_id && audit_matches(a, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| directed(compare_audits(a, b, sort.field), sort.direction));
        let total = rows.len() as u64;
        Ok((page.slice(&rows), total))
    }

    async fn list_audit_ids(&self, org_id: Uuid) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .audits
            .iter()
            .filter(|a| a.org_id == org_id)
            .map(|a| a.id)
            .collect())
    }

    async fn dashboard(&self, org_id: Uuid, auditor_id: Option<Uuid>) -> Result<AuditDashboard> {
        let state = self.state.read().await;
        let visible: Vec<&Audit> = state
            .audits
            .iter()
            .filter(|a| a.org_id == org_id)
            .filter(|a| auditor_id.is_none_or(|id| a.auditor_ids.contains(&id)))
            .collect();
        Ok(AuditDashboard {
            by_status: AuditStatus::ALL
                .iter()
                .map(|s| (*s, visible.iter().filter(|a| a.status == *s).count() as u64))
                .collect(),
            open_requests: visible.iter().map(|a| i64::from(a.open_requests)).sum(),
            open_findings: visible.iter().map(|a| i64::from(a.open_findings)).sum(),
        })
    }

    async fn set_request_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let audit = state
            .audits
            .iter_mut()
            .find(|a| a.org_id == org_id && a.id == audit_id)
            .ok_or(GrcError::AuditNotFound)?;
        audit.total_requests = total;
        audit.open_requests = open;
        audit.updated_at = at;
        Ok(())
    }

    async fn set_finding_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let audit = state
            .audits
            .iter_mut()
            .find(|a| a.org_id == org_id && a.id == audit_id)
            .ok_or(GrcError::AuditNotFound)?;
        audit.total_findings = total;
        audit.open_findings = open;
        audit.updated_at = at;
        Ok(())
    }

    // requests

    async fn insert_request(&self, request: &AuditRequest) -> Result<()> {
        self.state.write().await.requests.push(request.clone());
        Ok(())
    }

    async fn insert_requests(&self, requests: &[AuditRequest]) -> Result<()> {
        self.state.write().await.requests.extend_from_slice(requests);
        Ok(())
    }

    async fn get_request(&self, org_id: Uuid, audit_id: Uuid, id: Uuid) -> Result<Option<AuditRequest>> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .find(|r| r.org_id == org_id && r.audit_id == audit_id && r.id == id)
            .cloned())
    }

    async fn update_request(&self, request: &AuditRequest) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.requests,
            |r| r.org_id == request.org_id && r.id == request.id,
            request.clone(),
            "audit request",
        )
    }

    async fn list_requests(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditRequest>, u64)> {
        let state = self.state.read().await;
        let rows: Vec<AuditRequest> = state
            .requests
            .iter()
            .filter(|r| r.org_id == org_id && r.audit_id == audit_id && request_matches(r, filter))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((page.slice(&rows), total))
    }

    async fn request_status_counts(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Vec<(AuditRequestStatus, u64)>> {
        let state = self.state.read().await;
        Ok(histogram(
            state
                .requests
                .iter()
                .filter(|r| r.org_id == org_id && r.audit_id == audit_id)
                .map(|r| r.status),
        ))
    }

    async fn list_reference_numbers(&self, org_id: Uuid, audit_id: Uuid, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let lead = format!("{prefix}-");
        Ok(state
            .requests
            .iter()
            .filter(|r| r.org_id == org_id && r.audit_id == audit_id)
            .filter_map(|r| r.reference_number.clone())
            .filter(|n| n.starts_with(&lead))
            .collect())
    }

    async fn get_templates(&self, org_id: Uuid, template_ids: &[Uuid]) -> Result<Vec<AuditRequestTemplate>> {
        let state = self.state.read().await;
        Ok(state
            .templates
            .iter()
            .filter(|t| t.org_id == org_id && template_ids.contains(&t.id))
            .cloned()
            .collect())
    }

    // evidence submissions

    async fn insert_submission(&self, link: &AuditEvidenceLink) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .submissions
            .iter()
            .any(|s| s.request_id == link.request_id && s.artifact_id == link.artifact_id)
        {
            return Err(GrcError::Conflict("artifact already submitted".into()));
        }
        state.submissions.push(link.clone());
        Ok(())
    }

    async fn get_submission(&self, org_id: Uuid, audit_id: Uuid, id: Uuid) -> Result<Option<AuditEvidenceLink>> {
        let state = self.state.read().await;
        Ok(state
            .submissions
            .iter()
            .find(|s| s.org_id == org_id && s.audit_id == audit_id && s.id == id)
            .cloned())
    }

    async fn update_submission(&self, link: &AuditEvidenceLink) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.submissions,
            |s| s.org_id == link.org_id && s.id == link.id,
            link.clone(),
            "evidence submission",
        )
    }

    async fn delete_submission(&self, org_id: Uuid, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.submissions.len();
        state.submissions.retain(|s| !(s.org_id == org_id && s.id == id));
        Ok(state.submissions.len() < before)
    }

    async fn list_submissions(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<AuditEvidenceLink>> {
        let state = self.state.read().await;
        Ok(state
            .submissions
            .iter()
            .filter(|s| s.org_id == org_id && s.audit_id == audit_id && s.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn count_submissions(&self, org_id: Uuid, request_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .submissions
            .iter()
            .filter(|s| s.org_id == org_id && s.request_id == request_id)
            .count() as u64)
    }

    // findings

    async fn insert_finding(&self, finding: &AuditFinding) -> Result<()> {
        self.state.write().await.findings.push(finding.clone());
        Ok(())
    }

    async fn get_finding(&self, org_id: Uuid, audit_id: Uuid, id: Uuid) -> Result<Option<AuditFinding>> {
        let state = self.state.read().await;
        Ok(state
            .findings
            .iter()
            .find(|f| f.org_id == org_id && f.audit_id == audit_id && f.id == id)
            .cloned())
    }

    async fn update_finding(&self, finding: &AuditFinding) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.findings,
            |f| f.org_id == finding.org_id && f.id == finding.id,
            finding.clone(),
            "audit finding",
        )
    }

    async fn list_findings(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &FindingFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditFinding>, u64)> {
        let state = self.state.read().await;
        let rows: Vec<AuditFinding> = state
            .findings
            .iter()
            .filter(|f| f.org_id == org_id && f.audit_id == audit_id && finding_matches(f, filter))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((page.slice(&rows), total))
    }

    async fn finding_status_counts(&self, org_id: Uuid, audit_id: Uuid) -> Result<Vec<(FindingStatus, u64)>> {
        let state = self.state.read().await;
        Ok(histogram(
            state
                .findings
                .iter()
                .filter(|f| f.org_id == org_id && f.audit_id == audit_id)
                .map(|f| f.status),
        ))
    }

    // comments

    async fn insert_comment(&self, comment: &AuditComment) -> Result<()> {
        self.state.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn get_comment(&self, org_id: Uuid, audit_id: Uuid, id: Uuid) -> Result<Option<AuditComment>> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .find(|c| c.org_id == org_id && c.audit_id == audit_id && c.id == id)
            .cloned())
    }

    async fn update_comment(&self, comment: &AuditComment) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.comments,
            |c| c.org_id == comment.org_id && c.id == comment.id,
            comment.clone(),
            "audit comment",
        )
    }

    async fn delete_comment(&self, org_id: Uuid, id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.comments.len();
        state
            .comments
            .retain(|c| !(c.org_id == org_id && (c.id == id || c.parent_comment_id == Some(id))));
        Ok((before - state.comments.len()) as u64)
    }

    async fn list_comments(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        query: &CommentQuery,
    ) -> Result<(Vec<AuditComment>, u64)> {
        let state = self.state.read().await;
        let rows: Vec<AuditComment> = state
            .comments
            .iter()
            .filter(|c| c.org_id == org_id && c.audit_id == audit_id)
            .filter(|c| query.include_internal || !c.is_internal)
            .filter(|c| query.filter.target_type.is_none_or(|t| t == c.target_type))
            .filter(|c| query.filter.target_id.is_none_or(|t| t == c.target_id))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((query.page.slice(&rows), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_in_first_seen_order() {
        use AuditRequestStatus::*;
        let counts = histogram([Open, Closed, Open, InProgress, Open].into_iter());
        assert_eq!(counts, vec![(Open, 3), (Closed, 1), (InProgress, 1)]);
    }
}
