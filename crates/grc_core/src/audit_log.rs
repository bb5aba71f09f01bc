//! Audit-Log Emitter.
//!
//! Every state-changing operation emits exactly one entry after its
//! mutation has been persisted. Emission is fire-and-forget: a sink failure
//! is logged and never fails the operation that triggered it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::ports::AuditLogSink;
use crate::principal::Principal;
use crate::types::Metadata;
use crate::wire_enum;

wire_enum! {
    /// Stable action vocabulary consumed by downstream log readers.
    pub enum AuditAction {
        AuditCreated => "audit.created",
        AuditUpdated => "audit.updated",
        AuditStatusChanged => "audit.status_changed",
        AuditAuditorAdded => "audit.auditor_added",
        AuditAuditorRemoved => "audit.auditor_removed",
        RequestCreated => "audit_request.created",
        RequestUpdated => "audit_request.updated",
        RequestStatusChanged => "audit_request.status_changed",
        RequestReviewed => "audit_request.reviewed",
        SubmissionCreated => "audit_evidence.submitted",
        SubmissionReviewed => "audit_evidence.reviewed",
        SubmissionRemoved => "audit_evidence.removed",
        FindingCreated => "audit_finding.created",
        FindingUpdated => "audit_finding.updated",
        FindingStatusChanged => "audit_finding.status_changed",
        FindingRiskAccepted => "audit_finding.risk_accepted",
        CommentCreated => "audit_comment.created",
        CommentUpdated => "audit_comment.updated",
        CommentDeleted => "audit_comment.deleted",
        EvidenceCreated => "evidence.created",
        EvidenceUploadConfirmed => "evidence.upload_confirmed",
        EvidenceUpdated => "evidence.updated",
        EvidenceVersionCreated => "evidence.version_created",
        EvidenceStatusChanged => "evidence.status_changed",
        EvidenceDeleted => "evidence.deleted",
        EvidenceDownloaded => "evidence.downloaded",
        EvidenceLinked => "evidence.linked",
        EvidenceUnlinked => "evidence.unlinked",
        EvidenceEvaluated => "evidence.evaluated",
        PolicyCreated => "policy.created",
        PolicyUpdated => "policy.updated",
        PolicyOwnerChanged => "policy.owner_changed",
        PolicyVersionCreated => "policy.version_created",
        PolicySubmittedForReview => "policy.submitted_for_review",
        PolicyApproved => "policy.approved",
        PolicyPublished => "policy.published",
        PolicyArchived => "policy.archived",
        PolicyClonedFromTemplate => "policy.cloned_from_template",
        PolicyControlLinked => "policy.control_linked",
        PolicyControlUnlinked => "policy.control_unlinked",
        SignoffApproved => "policy_signoff.approved",
        SignoffRejected => "policy_signoff.rejected",
        SignoffWithdrawn => "policy_signoff.withdrawn",
        SignoffReminderSent => "policy_signoff.reminder_sent",
    }
}

wire_enum! {
    pub enum ResourceType {
        Audit => "audit",
        AuditRequest => "audit_request",
        AuditEvidence => "audit_evidence",
        AuditFinding => "audit_finding",
        AuditComment => "audit_comment",
        EvidenceArtifact => "evidence_artifact",
        EvidenceLink => "evidence_link",
        Policy => "policy",
        PolicySignoff => "policy_signoff",
        PolicyControl => "policy_control",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub metadata: Metadata,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditLogEmitter {
    sink: Arc<dyn AuditLogSink>,
    clock: Arc<dyn Clock>,
}

impl AuditLogEmitter {
    pub fn new(sink: Arc<dyn AuditLogSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    pub async fn emit(
        &self,
        principal: &Principal,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Uuid,
        metadata: Metadata,
    ) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            actor_id: principal.user_id,
            action,
            resource_type,
            resource_id,
            metadata,
            at: self.clock.now(),
        };
        if let Err(e) = self.sink.record(&entry).await {
            tracing::warn!(
                action = %entry.action,
                resource_id = %entry.resource_id,
                error = %e,
                "audit log write failed"
            );
        }
    }

    /// Shorthand for a status change carrying `from` and `to`.
    pub async fn emit_transition(
        &self,
        principal: &Principal,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Uuid,
        from: &str,
        to: &str,
    ) {
        self.emit(
            principal,
            action,
            resource_type,
            resource_id,
            json!({ "from": from, "to": to }),
        )
        .await;
    }
}
