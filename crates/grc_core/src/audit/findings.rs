use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::content::{self, DESCRIPTION_MAX_CHARS, MAX_TAGS, NOTES_MAX_CHARS, TAG_MAX_CHARS, TITLE_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, LIST_LIMITS};
use crate::principal::{Principal, Role, AUDIT_FIELDWORK_ROLES, CONTRIBUTOR_ROLES};
use crate::state_machine::StateMachine;

use super::service::{non_blank, AuditService};
use super::types::*;

const REFERENCE_MAX_CHARS: usize = 50;
const CATEGORY_MAX_CHARS: usize = 100;

/// Auditee-side work may also be done by the finding's remediation owner.
fn require_remediation_actor(principal: &Principal, finding: &AuditFinding) -> Result<()> {
    if finding.remediation_owner_id == Some(principal.user_id) {
        return Ok(());
    }
    principal.require_any(CONTRIBUTOR_ROLES, "work on finding remediation")
}

impl AuditService {
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, audit_id = %audit_id))]
    pub async fn create_finding(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        input: CreateFinding,
    ) -> Result<AuditFinding> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "record findings")?;
        let audit = self.load_active_audit(principal, audit_id).await?;

        let title = content::require_text("title", &input.title, TITLE_MAX_CHARS)?;
        let description = content::require_text("description", &input.description, DESCRIPTION_MAX_CHARS)?;
        let category = content::optional_text("category", input.category.as_deref(), CATEGORY_MAX_CHARS)?;
        let reference_number =
            content::optional_text("reference_number", input.reference_number.as_deref(), REFERENCE_MAX_CHARS)?;
        let recommendation =
            content::optional_text("recommendation", input.recommendation.as_deref(), DESCRIPTION_MAX_CHARS)?;
        let management_response = content::optional_text(
            "management_response",
            input.management_response.as_deref(),
            DESCRIPTION_MAX_CHARS,
        )?;
        let tags = content::validate_tags(&input.tags, MAX_TAGS, TAG_MAX_CHARS)?;
        self.ensure_control(principal, input.control_id).await?;
        self.ensure_requirement(principal, input.requirement_id).await?;
        if let Some(owner) = input.remediation_owner_id {
            self.active_user(principal, owner, "remediation_owner_id").await?;
        }

        let now = self.clock.now();
        let finding = AuditFinding {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            audit_id: audit.id,
            title,
            description,
            severity: input.severity,
            category,
            status: FindingStatus::Identified,
            control_id: input.control_id,
            requirement_id: input.requirement_id,
            found_by: principal.user_id,
            remediation_owner_id: input.remediation_owner_id,
            remediation_plan: None,
            remediation_due_date: input.remediation_due_date,
            remediation_started_at: None,
            remediation_completed_at: None,
            verified_at: None,
            verified_by: None,
            verification_notes: None,
            risk_accepted: false,
            risk_acceptance_reason: None,
            risk_accepted_by: None,
            risk_accepted_at: None,
            reference_number,
            recommendation,
            management_response,
            tags,
            metadata: input.metadata.unwrap_or_else(|| json!({})),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_finding(&finding).await?;
        self.counters.after_finding_change(principal.org_id, audit.id).await;

        self.log
            .emit(
                principal,
                AuditAction::FindingCreated,
                ResourceType::AuditFinding,
                finding.id,
                json!({ "audit_id": audit.id, "severity": finding.severity }),
            )
            .await;
        Ok(finding)
    }

    pub async fn get_finding(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        finding_id: Uuid,
    ) -> Result<AuditFinding> {
        let audit = self.load_audit(principal, audit_id).await?;
        self.load_finding(principal, &audit, finding_id).await
    }

    pub async fn list_findings(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        filter: FindingFilter,
        page: PageRequest,
    ) -> Result<Page<AuditFinding>> {
        let page = page.within(LIST_LIMITS);
        let audit = self.load_audit(principal, audit_id).await?;
        let (rows, total) = self
            .store
            .list_findings(principal.org_id, audit.id, &filter, page)
            .await?;
        Ok(Page::new(rows, page, total))
    }

    /// Descriptive fields only. Auditors edit the finding itself; the
    /// auditee side may answer with a management response.
    pub async fn update_finding(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        finding_id: Uuid,
        input: UpdateFinding,
    ) -> Result<AuditFinding> {
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut finding = self.load_finding(principal, &audit, finding_id).await?;
        let fieldwork = principal.has_any_role(AUDIT_FIELDWORK_ROLES);
        let touches_finding = input.title.is_some()
            || input.description.is_some()
            || input.severity.is_some()
            || input.category.is_some()
            || input.recommendation.is_some()
            || input.metadata.is_some();
        if touches_finding && !fieldwork {
            return Err(GrcError::Forbidden(format!(
                "role '{}' may not edit finding details",
                principal.role
            )));
        }
        if !fieldwork {
            require_remediation_actor(principal, &finding)?;
        }

        let mut changed: Vec<&str> = Vec::new();
        if let Some(title) = input.title.as_deref() {
            finding.title = content::require_text("title", title, TITLE_MAX_CHARS)?;
            changed.push("title");
        }
        if let Some(description) = input.description.as_deref() {
            finding.description = content::require_text("description", description, DESCRIPTION_MAX_CHARS)?;
            changed.push("description");
        }
        if let Some(severity) = input.severity {
            finding.severity = severity;
            changed.push("severity");
        }
        if let Some(category) = input.category.as_deref() {
            finding.category = content::optional_text("category", Some(category), CATEGORY_MAX_CHARS)?;
            changed.push("category");
        }
        if let Some(owner) = input.remediation_owner_id {
            self.active_user(principal, owner, "remediation_owner_id").await?;
            finding.remediation_owner_id = Some(owner);
            changed.push("remediation_owner_id");
        }
        if let Some(due) = input.remediation_due_date {
            finding.remediation_due_date = Some(due);
            changed.push("remediation_due_date");
        }
        if let Some(text) = input.recommendation.as_deref() {
            finding.recommendation = content::optional_text("recommendation", Some(text), DESCRIPTION_MAX_CHARS)?;
            changed.push("recommendation");
        }
        if let Some(text) = input.management_response.as_deref() {
            finding.management_response =
                content::optional_text("management_response", Some(text), DESCRIPTION_MAX_CHARS)?;
            changed.push("management_response");
        }
        if let Some(tags) = &input.tags {
            finding.tags = content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?;
            changed.push("tags");
        }
        if let Some(metadata) = input.metadata {
            finding.metadata = metadata;
            changed.push("metadata");
        }
        if changed.is_empty() {
            return Ok(finding);
        }
        finding.updated_at = self.clock.now();
        self.store.update_finding(&finding).await?;
        self.log
            .emit(
                principal,
                AuditAction::FindingUpdated,
                ResourceType::AuditFinding,
                finding.id,
                json!({ "audit_id": audit.id, "fields": changed }),
            )
            .await;
        Ok(finding)
    }

    /// Remediation lifecycle. Each target status carries its own guard and
    /// stamps; risk acceptance is reserved to the CISO and needs a reason.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, finding_id = %finding_id, to = %input.to))]
    pub async fn transition_finding(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        finding_id: Uuid,
        input: FindingTransition,
    ) -> Result<AuditFinding> {
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut finding = self.load_finding(principal, &audit, finding_id).await?;
        let from = finding.status;
        let to = input.to;
        FindingStatus::validate(from, to)?;

        let now = self.clock.now();
        let mut metadata = json!({ "from": from, "to": to, "audit_id": audit.id });
        match to {
            FindingStatus::RemediationPlanned => {
                require_remediation_actor(principal, &finding)?;
                let plan = non_blank(input.remediation_plan.as_deref()).ok_or_else(|| {
                    GrcError::validation("remediation_plan is required")
                })?;
                finding.remediation_plan = Some(content::require_text(
                    "remediation_plan",
                    plan,
                    DESCRIPTION_MAX_CHARS,
                )?);
                if let Some(due) = input.remediation_due_date {
                    finding.remediation_due_date = Some(due);
                }
            }
            FindingStatus::RemediationInProgress => {
                require_remediation_actor(principal, &finding)?;
                if from == FindingStatus::RemediationComplete {
                    let notes = non_blank(input.notes.as_deref()).ok_or_else(|| {
                        GrcError::validation("notes are required to reopen remediation")
                    })?;
                    metadata["notes"] = json!(content::require_text("notes", notes, NOTES_MAX_CHARS)?);
                    finding.remediation_completed_at = None;
                } else {
                    finding.remediation_started_at = Some(now);
                }
            }
            FindingStatus::RemediationComplete => {
                require_remediation_actor(principal, &finding)?;
                finding.remediation_completed_at = Some(now);
            }
            FindingStatus::Verified => {
                principal.require_any(AUDIT_FIELDWORK_ROLES, "verify findings")?;
                finding.verified_at = Some(now);
                finding.verified_by = Some(principal.user_id);
                finding.verification_notes =
                    content::optional_text("notes", input.notes.as_deref(), NOTES_MAX_CHARS)?;
            }
            FindingStatus::Closed => {
                principal.require_any(AUDIT_FIELDWORK_ROLES, "close findings")?;
            }
            FindingStatus::RiskAccepted => {
                principal.require_any(&[Role::Ciso], "accept risk")?;
                let reason = non_blank(input.reason.as_deref())
                    .ok_or(GrcError::AuditRiskAcceptRequiresReason)?;
                finding.risk_accepted = true;
                finding.risk_acceptance_reason =
                    Some(content::require_text("reason", reason, NOTES_MAX_CHARS)?);
                finding.risk_accepted_by = Some(principal.user_id);
                finding.risk_accepted_at = Some(now);
            }
            FindingStatus::Identified => {}
        }
        finding.status = to;
        finding.updated_at = now;
        self.store.update_finding(&finding).await?;
        self.counters.after_finding_change(principal.org_id, audit.id).await;

        let action = if to == FindingStatus::RiskAccepted {
            AuditAction::FindingRiskAccepted
        } else {
            AuditAction::FindingStatusChanged
        };
        self.log
            .emit(principal, action, ResourceType::AuditFinding, finding.id, metadata)
            .await;
        info!(%from, %to, "finding status changed");
        Ok(finding)
    }
}
