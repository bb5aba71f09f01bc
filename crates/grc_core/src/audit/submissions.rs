use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::content::{self, NOTES_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::principal::{Principal, AUDIT_CREATE_ROLES, AUDIT_FIELDWORK_ROLES, CONTRIBUTOR_ROLES};
use crate::state_machine::StateMachine;

use super::service::{non_blank, AuditService};
use super::types::*;

impl AuditService {
    async fn load_submission(
        &self,
        principal: &Principal,
        audit: &Audit,
        id: Uuid,
    ) -> Result<AuditEvidenceLink> {
        self.store
            .get_submission(principal.org_id, audit.id, id)
            .await?
            .filter(|s| s.org_id == principal.org_id && s.audit_id == audit.id)
            .ok_or_else(|| GrcError::NotFound(format!("evidence submission {id}")))
    }

    /// Attaches a library artifact to a request. An `open` request moves to
    /// `in_progress` on its first submission.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, request_id = %request_id))]
    pub async fn submit_evidence(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
        input: SubmitEvidence,
    ) -> Result<AuditEvidenceLink> {
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut request = self.load_request(principal, &audit, request_id).await?;
        if request.assigned_to != Some(principal.user_id) {
            principal.require_any(CONTRIBUTOR_ROLES, "submit audit evidence")?;
        }
        if matches!(
            request.status,
            AuditRequestStatus::Accepted | AuditRequestStatus::Closed
        ) {
            return Err(GrcError::Conflict(format!(
                "request is {} and no longer accepts evidence",
                request.status
            )));
        }
        let notes = content::optional_text("notes", input.notes.as_deref(), NOTES_MAX_CHARS)?;
        let artifact = self
            .evidence
            .get_artifact(principal.org_id, input.artifact_id)
            .await?
            .filter(|a| a.org_id == principal.org_id)
            .ok_or_else(|| GrcError::NotFound(format!("evidence artifact {}", input.artifact_id)))?;

        let existing = self
            .store
            .list_submissions(principal.org_id, audit.id, request.id)
            .await?;
        if existing.iter().any(|s| s.artifact_id == artifact.id) {
            return Err(GrcError::AuditDuplicateEvidence);
        }

        let now = self.clock.now();
        let link = AuditEvidenceLink {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            audit_id: audit.id,
            request_id: request.id,
            artifact_id: artifact.id,
            submitted_by: principal.user_id,
            submitted_at: now,
            submission_notes: notes,
            status: SubmissionStatus::PendingReview,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_submission(&link).await {
            Err(GrcError::Conflict(_)) => return Err(GrcError::AuditDuplicateEvidence),
            other => other?,
        }
        self.log
            .emit(
                principal,
                AuditAction::SubmissionCreated,
                ResourceType::AuditEvidence,
                link.id,
                json!({ "request_id": request.id, "artifact_id": artifact.id }),
            )
            .await;

        if request.status == AuditRequestStatus::Open {
            AuditRequestStatus::validate(request.status, AuditRequestStatus::InProgress)?;
            request.status = AuditRequestStatus::InProgress;
            request.updated_at = now;
            self.store.update_request(&request).await?;
            self.counters.after_request_change(principal.org_id, audit.id).await;
            self.log
                .emit_transition(
                    principal,
                    AuditAction::RequestStatusChanged,
                    ResourceType::AuditRequest,
                    request.id,
                    AuditRequestStatus::Open.as_str(),
                    AuditRequestStatus::InProgress.as_str(),
                )
                .await;
        }
        Ok(link)
    }

    pub async fn list_submissions(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<AuditEvidenceLink>> {
        let audit = self.load_audit(principal, audit_id).await?;
        let request = self.load_request(principal, &audit, request_id).await?;
        self.store
            .list_submissions(principal.org_id, audit.id, request.id)
            .await
    }

    /// `rejected` and `needs_clarification` require notes.
    pub async fn review_submission(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        submission_id: Uuid,
        input: ReviewSubmission,
    ) -> Result<AuditEvidenceLink> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "review audit evidence")?;
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut link = self.load_submission(principal, &audit, submission_id).await?;
        if input.status == SubmissionStatus::PendingReview {
            return Err(GrcError::validation(
                "review status must be accepted, rejected or needs_clarification",
            ));
        }
        let notes = non_blank(input.notes.as_deref());
        if matches!(
            input.status,
            SubmissionStatus::Rejected | SubmissionStatus::NeedsClarification
        ) && notes.is_none()
        {
            return Err(GrcError::AuditRejectionRequiresNotes);
        }

        let from = link.status;
        let now = self.clock.now();
        link.status = input.status;
        link.reviewed_by = Some(principal.user_id);
        link.reviewed_at = Some(now);
        link.review_notes = content::optional_text("notes", notes, NOTES_MAX_CHARS)?;
        link.updated_at = now;
        self.store.update_submission(&link).await?;

        self.log
            .emit(
                principal,
                AuditAction::SubmissionReviewed,
                ResourceType::AuditEvidence,
                link.id,
                json!({ "from": from, "to": link.status, "request_id": link.request_id }),
            )
            .await;
        Ok(link)
    }

    pub async fn remove_submission(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        submission_id: Uuid,
    ) -> Result<()> {
        let audit = self.load_active_audit(principal, audit_id).await?;
        let link = self.load_submission(principal, &audit, submission_id).await?;
        principal.require_self_or_any(
            link.submitted_by,
            AUDIT_CREATE_ROLES,
            "remove evidence submitted by others",
        )?;
        if !self.store.delete_submission(principal.org_id, link.id).await? {
            return Err(GrcError::NotFound(format!("evidence submission {}", link.id)));
        }
        self.log
            .emit(
                principal,
                AuditAction::SubmissionRemoved,
                ResourceType::AuditEvidence,
                link.id,
                json!({ "request_id": link.request_id, "artifact_id": link.artifact_id }),
            )
            .await;
        Ok(())
    }
}
