use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::content::{self, DESCRIPTION_MAX_CHARS, MAX_TAGS, TAG_MAX_CHARS, TITLE_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, LIST_LIMITS};
use crate::principal::{Principal, Role, AUDIT_CREATE_ROLES};
use crate::state_machine::StateMachine;

use super::service::{ensure_active, AuditService};
use super::types::*;

fn validate_period(start: Option<chrono::NaiveDate>, end: Option<chrono::NaiveDate>, what: &str) -> Result<()> {
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(GrcError::validation(format!("{what} end precedes its start")));
        }
    }
    Ok(())
}

impl AuditService {
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn create_audit(&self, principal: &Principal, input: CreateAudit) -> Result<AuditCreated> {
        principal.require_any(AUDIT_CREATE_ROLES, "create audits")?;
        let title = content::require_text("title", &input.title, TITLE_MAX_CHARS)?;
        let description =
            content::optional_text("description", input.description.as_deref(), DESCRIPTION_MAX_CHARS)?;
        let tags = content::validate_tags(&input.tags, MAX_TAGS, TAG_MAX_CHARS)?;
        validate_period(input.period_start, input.period_end, "audit period")?;
        validate_period(input.planned_start, input.planned_end, "planned window")?;
        if let Some(framework_id) = input.framework_id {
            if !self.directory.framework_exists(principal.org_id, framework_id).await? {
                return Err(GrcError::NotFound(format!("framework {framework_id}")));
            }
        }
        if let Some(lead) = input.internal_lead_id {
            self.active_user(principal, lead, "internal_lead_id").await?;
        }
        let mut auditor_ids: Vec<Uuid> = Vec::with_capacity(input.auditor_ids.len());
        for id in input.auditor_ids {
            if auditor_ids.contains(&id) {
                continue;
            }
            let user = self.active_user(principal, id, "auditor_ids").await?;
            if user.role != Role::Auditor {
                return Err(GrcError::validation(format!("user {id} is not an auditor")));
            }
            auditor_ids.push(id);
        }

        let now = self.clock.now();
        let audit = Audit {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            title,
            description,
            audit_type: input.audit_type,
            status: AuditStatus::Planning,
            framework_id: input.framework_id,
            period_start: input.period_start,
            period_end: input.period_end,
            planned_start: input.planned_start,
            planned_end: input.planned_end,
            actual_start: None,
            actual_end: None,
            audit_firm: input.audit_firm,
            lead_auditor: input.lead_auditor,
            internal_lead_id: input.internal_lead_id,
            auditor_ids,
            milestones: input.milestones.unwrap_or_else(|| json!([])),
            report_metadata: input.report_metadata.unwrap_or_else(|| json!({})),
            total_requests: 0,
            open_requests: 0,
            total_findings: 0,
            open_findings: 0,
            tags,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_audit(&audit).await?;

        self.log
            .emit(
                principal,
                AuditAction::AuditCreated,
                ResourceType::Audit,
                audit.id,
                json!({ "title": audit.title, "audit_type": audit.audit_type }),
            )
            .await;
        info!(audit_id = %audit.id, "audit created");
        Ok(AuditCreated::from(&audit))
    }

    pub async fn get_audit(&self, principal: &Principal, id: Uuid) -> Result<Audit> {
        self.load_audit(principal, id).await
    }

    /// Auditors only ever see the audits they are assigned to.
    pub async fn list_audits(
        &self,
        principal: &Principal,
        mut filter: AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<Page<Audit>> {
        let page = page.within(LIST_LIMITS);
        if principal.is_auditor() {
            filter.auditor_id = Some(principal.user_id);
        }
        let (rows, total) = self
            .store
            .list_audits(principal.org_id, &filter, sort, page)
            .await?;
        Ok(Page::new(rows, page, total))
    }

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, audit_id = %id))]
    pub async fn update_audit(&self, principal: &Principal, id: Uuid, input: UpdateAudit) -> Result<Audit> {
        principal.require_any(AUDIT_CREATE_ROLES, "edit audits")?;
        let mut audit = self.load_active_audit(principal, id).await?;
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = input.title.as_deref() {
            audit.title = content::require_text("title", title, TITLE_MAX_CHARS)?;
            changed.push("title");
        }
        if let Some(description) = input.description.as_deref() {
            audit.description =
                content::optional_text("description", Some(description), DESCRIPTION_MAX_CHARS)?;
            changed.push("description");
        }
        if let Some(framework_id) = input.framework_id {
            if !self.directory.framework_exists(principal.org_id, framework_id).await? {
                return Err(GrcError::NotFound(format!("framework {framework_id}")));
            }
            audit.framework_id = Some(framework_id);
            changed.push("framework_id");
        }
        if input.period_start.is_some() || input.period_end.is_some() {
            audit.period_start = input.period_start.or(audit.period_start);
            audit.period_end = input.period_end.or(audit.period_end);
            validate_period(audit.period_start, audit.period_end, "audit period")?;
            changed.push("period");
        }
        if input.planned_start.is_some() || input.planned_end.is_some() {
            audit.planned_start = input.planned_start.or(audit.planned_start);
            audit.planned_end = input.planned_end.or(audit.planned_end);
            validate_period(audit.planned_start, audit.planned_end, "planned window")?;
            changed.push("planned");
        }
        if let Some(firm) = input.audit_firm {
            audit.audit_firm = Some(firm);
            changed.push("audit_firm");
        }
        if let Some(lead) = input.lead_auditor {
            audit.lead_auditor = Some(lead);
            changed.push("lead_auditor");
        }
        if let Some(lead) = input.internal_lead_id {
            self.active_user(principal, lead, "internal_lead_id").await?;
            audit.internal_lead_id = Some(lead);
            changed.push("internal_lead_id");
        }
        if let Some(milestones) = input.milestones {
            audit.milestones = milestones;
            changed.push("milestones");
        }
        if let Some(report_metadata) = input.report_metadata {
            audit.report_metadata = report_metadata;
            changed.push("report_metadata");
        }
        if let Some(tags) = &input.tags {
            audit.tags = content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?;
            changed.push("tags");
        }
        if changed.is_empty() {
            return Ok(audit);
        }

        audit.updated_at = self.clock.now();
        self.store.update_audit(&audit).await?;
        self.log
            .emit(
                principal,
                AuditAction::AuditUpdated,
                ResourceType::Audit,
                audit.id,
                json!({ "fields": changed }),
            )
            .await;
        Ok(audit)
    }

    /// Moves the engagement through its lifecycle, stamping the realized
    /// start and end as it leaves planning and reaches completion.
    #[instrument(skip(self, principal), fields(org_id = %principal.org_id, audit_id = %id))]
    pub async fn transition_audit(&self, principal: &Principal, id: Uuid, to: AuditStatus) -> Result<Audit> {
        principal.require_any(AUDIT_CREATE_ROLES, "change audit status")?;
        let mut audit = self.load_audit(principal, id).await?;
        let from = audit.status;
        ensure_active(&audit)?;
        AuditStatus::validate(from, to)?;

        let now = self.clock.now();
        if from == AuditStatus::Planning && audit.actual_start.is_none() {
            audit.actual_start = Some(now);
        }
        if to == AuditStatus::Completed {
            audit.actual_end = Some(now);
        }
        audit.status = to;
        audit.updated_at = now;
        self.store.update_audit(&audit).await?;

        self.log
            .emit_transition(
                principal,
                AuditAction::AuditStatusChanged,
                ResourceType::Audit,
                audit.id,
                from.as_str(),
                to.as_str(),
            )
            .await;
        info!(%from, %to, "audit status changed");
        Ok(audit)
    }

    pub async fn add_auditor(&self, principal: &Principal, id: Uuid, user_id: Uuid) -> Result<Audit> {
        principal.require_any(AUDIT_CREATE_ROLES, "assign auditors")?;
        let mut audit = self.load_active_audit(principal, id).await?;
        let user = self.active_user(principal, user_id, "user_id").await?;
        if user.role != Role::Auditor {
            return Err(GrcError::validation(format!("user {user_id} is not an auditor")));
        }
        if audit.auditor_ids.contains(&user_id) {
            return Err(GrcError::Conflict(format!(
                "user {user_id} is already assigned to this audit"
            )));
        }
        audit.auditor_ids.push(user_id);
        audit.updated_at = self.clock.now();
        self.store.update_audit(&audit).await?;
        self.log
            .emit(
                principal,
                AuditAction::AuditAuditorAdded,
                ResourceType::Audit,
                audit.id,
                json!({ "auditor_id": user_id }),
            )
            .await;
        Ok(audit)
    }

    pub async fn remove_auditor(&self, principal: &Principal, id: Uuid, user_id: Uuid) -> Result<Audit> {
        principal.require_any(AUDIT_CREATE_ROLES, "assign auditors")?;
        let mut audit = self.load_active_audit(principal, id).await?;
        let before = audit.auditor_ids.len();
        audit.auditor_ids.retain(|a| *a != user_id);
        if audit.auditor_ids.len() == before {
            return Err(GrcError::NotFound(format!(
                "user {user_id} is not assigned to this audit"
            )));
        }
        audit.updated_at = self.clock.now();
        self.store.update_audit(&audit).await?;
        self.log
            .emit(
                principal,
                AuditAction::AuditAuditorRemoved,
                ResourceType::Audit,
                audit.id,
                json!({ "auditor_id": user_id }),
            )
            .await;
        Ok(audit)
    }

    /// Status histogram plus open work summed over the caller's visible audits.
    pub async fn dashboard(&self, principal: &Principal) -> Result<AuditDashboard> {
        let auditor = principal.is_auditor().then_some(principal.user_id);
        self.store.dashboard(principal.org_id, auditor).await
    }
}
