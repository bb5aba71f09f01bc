use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::config::MAX_BULK_REQUESTS;
use crate::content::{self, DESCRIPTION_MAX_CHARS, MAX_TAGS, NOTES_MAX_CHARS, TAG_MAX_CHARS, TITLE_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, LIST_LIMITS};
use crate::principal::{Principal, AUDIT_FIELDWORK_ROLES, CONTRIBUTOR_ROLES};
use crate::state_machine::StateMachine;
use crate::types::BulkOutcome;

use super::service::{non_blank, AuditService};
use super::types::*;

pub const DEFAULT_REFERENCE_PREFIX: &str = "PBC";
const REFERENCE_MAX_CHARS: usize = 50;
const PREFIX_MAX_CHARS: usize = 20;

/// Highest `NNN` among references shaped `<prefix>-NNN`.
fn max_sequence(prefix: &str, references: &[String]) -> u32 {
    references
        .iter()
        .filter_map(|r| r.strip_prefix(prefix)?.strip_prefix('-'))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

fn validate_prefix(raw: Option<&str>) -> Result<String> {
    let prefix = match raw.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => p.to_string(),
        None => return Ok(DEFAULT_REFERENCE_PREFIX.to_string()),
    };
    if prefix.chars().count() > PREFIX_MAX_CHARS
        || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(GrcError::validation(
            "prefix may only contain letters, digits and '_' (max 20)",
        ));
    }
    Ok(prefix)
}

impl AuditService {
    /// Validates the input and builds the row; nothing is written.
    async fn build_request(
        &self,
        principal: &Principal,
        audit: &Audit,
        input: CreateRequest,
    ) -> Result<AuditRequest> {
        let title = content::require_text("title", &input.title, TITLE_MAX_CHARS)?;
        let description =
            content::optional_text("description", input.description.as_deref(), DESCRIPTION_MAX_CHARS)?;
        let reference_number =
            content::optional_text("reference_number", input.reference_number.as_deref(), REFERENCE_MAX_CHARS)?;
        let tags = content::validate_tags(&input.tags, MAX_TAGS, TAG_MAX_CHARS)?;
        self.ensure_control(principal, input.control_id).await?;
        self.ensure_requirement(principal, input.requirement_id).await?;
        if let Some(assignee) = input.assigned_to {
            self.active_user(principal, assignee, "assigned_to").await?;
        }

        let now = self.clock.now();
        Ok(AuditRequest {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            audit_id: audit.id,
            title,
            description,
            priority: input.priority.unwrap_or(Priority::Medium),
            status: if input.assigned_to.is_some() {
                AuditRequestStatus::InProgress
            } else {
                AuditRequestStatus::Open
            },
            control_id: input.control_id,
            requirement_id: input.requirement_id,
            requested_by: principal.user_id,
            assigned_to: input.assigned_to,
            due_date: input.due_date,
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
            reviewer_notes: None,
            reference_number,
            tags,
            created_at: now,
            updated_at: now,
        })
    }

    async fn log_request_created(&self, principal: &Principal, request: &AuditRequest) {
        self.log
            .emit(
                principal,
                AuditAction::RequestCreated,
                ResourceType::AuditRequest,
                request.id,
                json!({
                    "audit_id": request.audit_id,
                    "reference_number": request.reference_number,
                    "status": request.status,
                }),
            )
            .await;
    }

    /// Builds and inserts one request without touching the counters.
    async fn insert_request_row(
        &self,
        principal: &Principal,
        audit: &Audit,
        input: CreateRequest,
    ) -> Result<AuditRequest> {
        let request = self.build_request(principal, audit, input).await?;
        self.store.insert_request(&request).await?;
        self.log_request_created(principal, &request).await;
        Ok(request)
    }

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, audit_id = %audit_id))]
    pub async fn create_request(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        input: CreateRequest,
    ) -> Result<AuditRequest> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "create audit requests")?;
        let audit = self.load_active_audit(principal, audit_id).await?;
        let request = self.insert_request_row(principal, &audit, input).await?;
        self.counters.after_request_change(principal.org_id, audit.id).await;
        Ok(request)
    }

    /// Best-effort bulk creation; each row succeeds or fails on its own.
    pub async fn create_requests(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        inputs: Vec<CreateRequest>,
    ) -> Result<BulkOutcome<AuditRequest>> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "create audit requests")?;
        if inputs.is_empty() || inputs.len() > MAX_BULK_REQUESTS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_BULK_REQUESTS} requests per call"
            )));
        }
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut outcome = BulkOutcome::default();
        for (index, input) in inputs.into_iter().enumerate() {
            match self.insert_request_row(principal, &audit, input).await {
                Ok(request) => outcome.created.push(request),
                Err(e) => outcome.record_failure(index, &e),
            }
        }
        if !outcome.created.is_empty() {
            self.counters.after_request_change(principal.org_id, audit.id).await;
        }
        Ok(outcome)
    }

    /// One request per template, numbered `<prefix>-NNN` after the highest
    /// existing number for that prefix in the audit. All or nothing.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, audit_id = %audit_id))]
    pub async fn instantiate_templates(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        input: InstantiateTemplates,
    ) -> Result<Vec<AuditRequest>> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "create audit requests")?;
        if input.template_ids.is_empty() || input.template_ids.len() > MAX_BULK_REQUESTS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_BULK_REQUESTS} templates per call"
            )));
        }
        let prefix = validate_prefix(input.prefix.as_deref())?;
        let audit = self.load_active_audit(principal, audit_id).await?;

        let templates = self
            .store
            .get_templates(principal.org_id, &input.template_ids)
            .await?;
        let mut ordered = Vec::with_capacity(input.template_ids.len());
        for id in &input.template_ids {
            let template = templates
                .iter()
                .find(|t| t.id == *id && t.org_id == principal.org_id)
                .ok_or_else(|| GrcError::NotFound(format!("request template {id}")))?;
            ordered.push(template.clone());
        }

        let existing = self
            .store
            .list_reference_numbers(principal.org_id, audit.id, &prefix)
            .await?;
        let mut next = max_sequence(&prefix, &existing);
        debug!(%prefix, start = next + 1, "numbering templated requests");

        // Every row is validated before any is written.
        let mut created = Vec::with_capacity(ordered.len());
        for template in ordered {
            next += 1;
            let request = self
                .build_request(
                    principal,
                    &audit,
                    CreateRequest {
                        title: template.title,
                        description: template.description,
                        priority: Some(template.priority),
                        control_id: template.control_id,
                        requirement_id: template.requirement_id,
                        assigned_to: input.assigned_to,
                        due_date: input.due_date,
                        reference_number: Some(format!("{prefix}-{next:03}")),
                        tags: template.tags,
                    },
                )
                .await?;
            created.push(request);
        }
        self.store.insert_requests(&created).await?;
        for request in &created {
            self.log_request_created(principal, request).await;
        }
        self.counters.after_request_change(principal.org_id, audit.id).await;
        Ok(created)
    }

    pub async fn get_request(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
    ) -> Result<AuditRequest> {
        let audit = self.load_audit(principal, audit_id).await?;
        self.load_request(principal, &audit, request_id).await
    }

    pub async fn list_requests(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        filter: RequestFilter,
        page: PageRequest,
    ) -> Result<Page<AuditRequest>> {
        let page = page.within(LIST_LIMITS);
        let audit = self.load_audit(principal, audit_id).await?;
        let (rows, total) = self
            .store
            .list_requests(principal.org_id, audit.id, &filter, page)
            .await?;
        Ok(Page::new(rows, page, total))
    }

    pub async fn update_request(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
        input: UpdateRequest,
    ) -> Result<AuditRequest> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "edit audit requests")?;
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut request = self.load_request(principal, &audit, request_id).await?;
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = input.title.as_deref() {
            request.title = content::require_text("title", title, TITLE_MAX_CHARS)?;
            changed.push("title");
        }
        if let Some(description) = input.description.as_deref() {
            request.description =
                content::optional_text("description", Some(description), DESCRIPTION_MAX_CHARS)?;
            changed.push("description");
        }
        if let Some(priority) = input.priority {
            request.priority = priority;
            changed.push("priority");
        }
        if let Some(assignee) = input.assigned_to {
            self.active_user(principal, assignee, "assigned_to").await?;
            request.assigned_to = Some(assignee);
            changed.push("assigned_to");
        }
        if let Some(due) = input.due_date {
            request.due_date = Some(due);
            changed.push("due_date");
        }
        if let Some(tags) = &input.tags {
            request.tags = content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?;
            changed.push("tags");
        }
        if changed.is_empty() {
            return Ok(request);
        }
        request.updated_at = self.clock.now();
        self.store.update_request(&request).await?;
        self.log
            .emit(
                principal,
                AuditAction::RequestUpdated,
                ResourceType::AuditRequest,
                request.id,
                json!({ "audit_id": audit.id, "fields": changed }),
            )
            .await;
        Ok(request)
    }

    /// Auditee-side moves (`in_progress`, `submitted`) and closing. Accept
    /// and reject go through [`AuditService::review_request`].
    #[instrument(skip(self, principal), fields(org_id = %principal.org_id, request_id = %request_id))]
    pub async fn transition_request(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
        to: AuditRequestStatus,
    ) -> Result<AuditRequest> {
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut request = self.load_request(principal, &audit, request_id).await?;
        let from = request.status;

        match to {
            AuditRequestStatus::InProgress | AuditRequestStatus::Submitted => {
                if request.assigned_to != Some(principal.user_id) {
                    principal.require_any(CONTRIBUTOR_ROLES, "work on audit requests")?;
                }
            }
            AuditRequestStatus::Closed => {
                principal.require_any(AUDIT_FIELDWORK_ROLES, "close audit requests")?;
            }
            AuditRequestStatus::Accepted | AuditRequestStatus::Rejected => {
                return Err(GrcError::validation(
                    "accepted and rejected are set by reviewing the request",
                ));
            }
            AuditRequestStatus::Open => {}
        }
        if to == AuditRequestStatus::Submitted
            && self.store.count_submissions(principal.org_id, request.id).await? == 0
        {
            return Err(GrcError::AuditNoEvidence);
        }
        AuditRequestStatus::validate(from, to)?;

        let now = self.clock.now();
        if to == AuditRequestStatus::Submitted {
            request.submitted_at = Some(now);
        }
        request.status = to;
        request.updated_at = now;
        self.store.update_request(&request).await?;
        self.counters.after_request_change(principal.org_id, audit.id).await;

        self.log
            .emit_transition(
                principal,
                AuditAction::RequestStatusChanged,
                ResourceType::AuditRequest,
                request.id,
                from.as_str(),
                to.as_str(),
            )
            .await;
        Ok(request)
    }

    /// Auditor decision on a submitted request. Rejection needs notes.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, request_id = %request_id))]
    pub async fn review_request(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        request_id: Uuid,
        input: ReviewRequest,
    ) -> Result<AuditRequest> {
        principal.require_any(AUDIT_FIELDWORK_ROLES, "review audit requests")?;
        let audit = self.load_active_audit(principal, audit_id).await?;
        let mut request = self.load_request(principal, &audit, request_id).await?;
        let to = match input.decision {
            ReviewDecision::Accepted => AuditRequestStatus::Accepted,
            ReviewDecision::Rejected => AuditRequestStatus::Rejected,
        };
        let notes = non_blank(input.notes.as_deref());
        if to == AuditRequestStatus::Rejected && notes.is_none() {
            return Err(GrcError::AuditRejectionRequiresNotes);
        }
        let from = request.status;
        AuditRequestStatus::validate(from, to)?;

        let now = self.clock.now();
        request.status = to;
        request.reviewed_at = Some(now);
        request.reviewed_by = Some(principal.user_id);
        request.reviewer_notes = content::optional_text("notes", notes, NOTES_MAX_CHARS)?;
        request.updated_at = now;
        self.store.update_request(&request).await?;
        self.counters.after_request_change(principal.org_id, audit.id).await;

        self.log
            .emit(
                principal,
                AuditAction::RequestReviewed,
                ResourceType::AuditRequest,
                request.id,
                json!({ "from": from, "to": to, "audit_id": audit.id }),
            )
            .await;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_continues_from_maximum() {
        let refs = vec![
            "PBC-001".to_string(),
            "PBC-017".to_string(),
            "PBC-abc".to_string(),
            "SOC-099".to_string(),
            "PBCX-500".to_string(),
        ];
        assert_eq!(max_sequence("PBC", &refs), 17);
        assert_eq!(max_sequence("SOC", &refs), 99);
        assert_eq!(max_sequence("ISO", &refs), 0);
    }

    #[test]
    fn prefix_defaults_and_validates() {
        assert_eq!(validate_prefix(None).unwrap(), "PBC");
        assert_eq!(validate_prefix(Some("  ")).unwrap(), "PBC");
        assert_eq!(validate_prefix(Some("SOC2")).unwrap(), "SOC2");
        assert!(validate_prefix(Some("SOC-2")).is_err());
    }
}
