//! AuditService: engagement state and the loaders every child operation
//! goes through. Operations are split by child resource across the sibling
//! modules.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit_log::AuditLogEmitter;
use crate::clock::Clock;
use crate::counters::CounterReconciler;
use crate::directory::UserRecord;
use crate::error::{GrcError, Result};
use crate::ports::{AuditStore, DirectoryStore, EvidenceStore};
use crate::principal::Principal;

use super::types::*;

#[derive(Clone)]
pub struct AuditService {
    pub(super) store: Arc<dyn AuditStore>,
    pub(super) evidence: Arc<dyn EvidenceStore>,
    pub(super) directory: Arc<dyn DirectoryStore>,
    pub(super) counters: CounterReconciler,
    pub(super) log: AuditLogEmitter,
    pub(super) clock: Arc<dyn Clock>,
}

impl AuditService {
    pub fn new(
        store: Arc<dyn AuditStore>,
        evidence: Arc<dyn EvidenceStore>,
        directory: Arc<dyn DirectoryStore>,
        counters: CounterReconciler,
        log: AuditLogEmitter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evidence,
            directory,
            counters,
            log,
            clock,
        }
    }

    // ── Loaders ───────────────────────────────────────────────

    /// Missing, foreign and unassigned audits all read as `AUDIT_NOT_FOUND`.
    pub(super) async fn load_audit(&self, principal: &Principal, id: Uuid) -> Result<Audit> {
        let audit = self
            .store
            .get_audit(principal.org_id, id)
            .await?
            .ok_or(GrcError::AuditNotFound)?;
        if !principal.can_view_audit(audit.org_id, &audit.auditor_ids) {
            return Err(GrcError::AuditNotFound);
        }
        Ok(audit)
    }

    /// Loads the audit and rejects terminal ones.
    pub(super) async fn load_active_audit(&self, principal: &Principal, id: Uuid) -> Result<Audit> {
        let audit = self.load_audit(principal, id).await?;
        ensure_active(&audit)?;
        Ok(audit)
    }

    pub(super) async fn load_request(
        &self,
        principal: &Principal,
        audit: &Audit,
        id: Uuid,
    ) -> Result<AuditRequest> {
        self.store
            .get_request(principal.org_id, audit.id, id)
            .await?
            .filter(|r| r.org_id == principal.org_id && r.audit_id == audit.id)
            .ok_or(GrcError::AuditRequestNotFound)
    }

    pub(super) async fn load_finding(
        &self,
        principal: &Principal,
        audit: &Audit,
        id: Uuid,
    ) -> Result<AuditFinding> {
        self.store
            .get_finding(principal.org_id, audit.id, id)
            .await?
            .filter(|f| f.org_id == principal.org_id && f.audit_id == audit.id)
            .ok_or(GrcError::AuditFindingNotFound)
    }

    /// Internal comments do not exist as far as auditors can tell.
    pub(super) async fn load_comment(
        &self,
        principal: &Principal,
        audit: &Audit,
        id: Uuid,
    ) -> Result<AuditComment> {
        self.store
            .get_comment(principal.org_id, audit.id, id)
            .await?
            .filter(|c| c.org_id == principal.org_id && c.audit_id == audit.id)
            .filter(|c| !(c.is_internal && principal.is_auditor()))
            .ok_or(GrcError::AuditCommentNotFound)
    }

    pub(super) async fn active_user(
        &self,
        principal: &Principal,
        user_id: Uuid,
        field: &str,
    ) -> Result<UserRecord> {
        match self.directory.get_user(principal.org_id, user_id).await? {
            Some(user) if user.is_active && user.org_id == principal.org_id => Ok(user),
            _ => Err(GrcError::validation(format!(
                "{field} must be an active user of this organization"
            ))),
        }
    }

    pub(super) async fn ensure_control(&self, principal: &Principal, control_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = control_id {
            self.directory
                .get_control(principal.org_id, id)
                .await?
                .ok_or_else(|| GrcError::NotFound(format!("control {id}")))?;
        }
        Ok(())
    }

    pub(super) async fn ensure_requirement(
        &self,
        principal: &Principal,
        requirement_id: Option<Uuid>,
    ) -> Result<()> {
        if let Some(id) = requirement_id {
            self.directory
                .get_requirement(principal.org_id, id)
                .await?
                .ok_or_else(|| GrcError::NotFound(format!("requirement {id}")))?;
        }
        Ok(())
    }
}

/// Completed and cancelled audits are frozen for child mutations.
pub(super) fn ensure_active(audit: &Audit) -> Result<()> {
    match audit.status {
        AuditStatus::Completed => Err(GrcError::AuditCompleted),
        AuditStatus::Cancelled => Err(GrcError::AuditCancelled),
        _ => Ok(()),
    }
}

/// Required notes: present and non-blank after trimming.
pub(super) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
