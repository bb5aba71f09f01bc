//! PolicyService: policies, their immutable version chain, publication,
//! template cloning and control linkage. Sign-off workflow lives in
//! `signoff.rs`.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit_log::{AuditAction, AuditLogEmitter, ResourceType};
use crate::clock::Clock;
use crate::config::{CoreConfig, MAX_BULK_LINKS, MAX_FRESHNESS_DAYS};
use crate::content::{
    self, DESCRIPTION_MAX_CHARS, MAX_TAGS, NOTES_MAX_CHARS, SUMMARY_MAX_CHARS, TAG_MAX_CHARS,
    TITLE_MAX_CHARS,
};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, LIST_LIMITS};
use crate::ports::{DirectoryStore, PolicyStore};
use crate::principal::{
    Principal, POLICY_ARCHIVE_ROLES, POLICY_CREATE_ROLES, POLICY_PUBLISH_ROLES,
};
use crate::state_machine::StateMachine;
use crate::types::BulkOutcome;

use super::gap::{self, GapQuery, GapReport};
use super::review;
use super::types::*;

pub const IDENTIFIER_MAX_CHARS: usize = 50;

#[derive(Clone)]
pub struct PolicyService {
    pub(super) store: Arc<dyn PolicyStore>,
    pub(super) directory: Arc<dyn DirectoryStore>,
    pub(super) log: AuditLogEmitter,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: Arc<CoreConfig>,
}

/// Identifiers are short codes such as `ISP-001` or `sec.access-2`.
fn validate_identifier(raw: &str) -> Result<String> {
    let identifier = content::require_text("identifier", raw, IDENTIFIER_MAX_CHARS)?;
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(GrcError::validation(
            "identifier may only contain letters, digits, '-', '_' and '.'",
        ));
    }
    Ok(identifier)
}

fn validate_review_frequency(days: Option<i32>) -> Result<Option<i32>> {
    match days {
        Some(d) if !(1..=MAX_FRESHNESS_DAYS).contains(&d) => Err(GrcError::validation(format!(
            "review_frequency_days must be between 1 and {MAX_FRESHNESS_DAYS}"
        ))),
        other => Ok(other),
    }
}

impl PolicyService {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        directory: Arc<dyn DirectoryStore>,
        log: AuditLogEmitter,
        clock: Arc<dyn Clock>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            log,
            clock,
            config,
        }
    }

    // ── Helpers ───────────────────────────────────────────────

    pub(super) async fn load(&self, principal: &Principal, id: Uuid) -> Result<Policy> {
        let policy = self
            .store
            .get_policy(principal.org_id, id)
            .await?
            .ok_or_else(|| GrcError::NotFound(format!("policy {id}")))?;
        principal.ensure_same_org(policy.org_id, "policy")?;
        Ok(policy)
    }

    pub(super) fn is_owner(principal: &Principal, policy: &Policy) -> bool {
        policy.owner_id == principal.user_id
            || policy.secondary_owner_id == Some(principal.user_id)
    }

    /// Owners edit their own policies; editors edit any.
    pub(super) fn require_editor(principal: &Principal, policy: &Policy, action: &str) -> Result<()> {
        if Self::is_owner(principal, policy) {
            return Ok(());
        }
        principal.require_any(POLICY_CREATE_ROLES, action)
    }

    pub(super) fn ensure_not_archived(policy: &Policy) -> Result<()> {
        if policy.status == PolicyStatus::Archived {
            return Err(GrcError::PolicyArchived);
        }
        Ok(())
    }

    async fn ensure_active_user(&self, principal: &Principal, user_id: Uuid, field: &str) -> Result<()> {
        match self.directory.get_user(principal.org_id, user_id).await? {
            Some(user) if user.is_active && user.org_id == principal.org_id => Ok(()),
            _ => Err(GrcError::validation(format!(
                "{field} must be an active user of this organization"
            ))),
        }
    }

    fn review_status_of(&self, policy: &Policy) -> ReviewStatus {
        review::review_status(
            policy.next_review_at,
            self.clock.today(),
            self.config.expiring_soon_days,
        )
    }

    pub(super) async fn detail(&self, principal: &Principal, policy: Policy) -> Result<PolicyDetail> {
        let current_version = match policy.current_version_id {
            Some(version_id) => self.store.get_version(principal.org_id, version_id).await?,
            None => None,
        };
        let review_status = self.review_status_of(&policy);
        Ok(PolicyDetail {
            policy,
            current_version,
            review_status,
        })
    }

    /// Sanitizes and measures content for a new version.
    #[allow(clippy::too_many_arguments)]
    fn build_version(
        &self,
        principal: &Principal,
        policy_id: Uuid,
        version_number: i32,
        raw_content: &str,
        content_format: ContentFormat,
        change_type: ChangeType,
        change_summary: Option<&str>,
        content_summary: Option<&str>,
    ) -> Result<PolicyVersion> {
        if raw_content.len() > self.config.max_policy_content_bytes {
            return Err(GrcError::ContentTooLarge {
                size: raw_content.len(),
                limit: self.config.max_policy_content_bytes,
            });
        }
        let body = match content_format {
            ContentFormat::Html => content::sanitize_html(raw_content),
            ContentFormat::Markdown => raw_content.to_string(),
        };
        if body.trim().is_empty() {
            return Err(GrcError::validation("content is required"));
        }
        let summary = match content::optional_text(
            "content_summary",
            content_summary,
            SUMMARY_MAX_CHARS,
        )? {
            Some(s) => s,
            None => content::summarize(&body, SUMMARY_MAX_CHARS),
        };
        let change_summary =
            content::optional_text("change_summary", change_summary, DESCRIPTION_MAX_CHARS)?;
        let now = self.clock.now();
        Ok(PolicyVersion {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            policy_id,
            version_number,
            is_current: true,
            word_count: i32::try_from(content::word_count(&body)).unwrap_or(i32::MAX),
            character_count: i32::try_from(content::character_count(&body)).unwrap_or(i32::MAX),
            content: body,
            content_format,
            content_summary: Some(summary),
            change_summary,
            change_type,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Inserts policy + version 1 atomically, re-typing a unique-constraint
    /// race on the identifier.
    async fn insert_new_policy(&self, policy: &Policy, version: &PolicyVersion) -> Result<()> {
        if self
            .store
            .find_by_identifier(policy.org_id, &policy.identifier)
            .await?
            .is_some()
        {
            return Err(GrcError::DuplicateIdentifier(policy.identifier.clone()));
        }
        match self.store.create_policy(policy, version).await {
            Err(GrcError::Conflict(_)) => {
                Err(GrcError::DuplicateIdentifier(policy.identifier.clone()))
            }
            other => other,
        }
    }

    // ── Create / read / update ────────────────────────────────

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, user_id = %principal.user_id))]
    pub async fn create_policy(
        &self,
        principal: &Principal,
        input: CreatePolicy,
    ) -> Result<PolicyDetail> {
        principal.require_any(POLICY_CREATE_ROLES, "create policies")?;

        let identifier = validate_identifier(&input.identifier)?;
        let title = content::require_text("title", &input.title, TITLE_MAX_CHARS)?;
        let description =
            content::optional_text("description", input.description.as_deref(), DESCRIPTION_MAX_CHARS)?;
        let tags = content::validate_tags(&input.tags, MAX_TAGS, TAG_MAX_CHARS)?;
        let review_frequency_days = validate_review_frequency(input.review_frequency_days)?;
        let owner_id = input.owner_id.unwrap_or(principal.user_id);
        if owner_id != principal.user_id {
            self.ensure_active_user(principal, owner_id, "owner_id").await?;
        }
        if let Some(secondary) = input.secondary_owner_id {
            self.ensure_active_user(principal, secondary, "secondary_owner_id")
                .await?;
        }
        if let Some(framework_id) = input.template_framework_id {
            if !self
                .directory
                .framework_exists(principal.org_id, framework_id)
                .await?
            {
                return Err(GrcError::NotFound(format!("framework {framework_id}")));
            }
        }

        let id = Uuid::new_v4();
        let version = self.build_version(
            principal,
            id,
            1,
            &input.content,
            input.content_format,
            ChangeType::Initial,
            None,
            input.content_summary.as_deref(),
        )?;
        let now = self.clock.now();
        let policy = Policy {
            id,
            org_id: principal.org_id,
            identifier,
            title,
            description,
            category: input.category,
            status: PolicyStatus::Draft,
            owner_id,
            secondary_owner_id: input.secondary_owner_id,
            current_version_id: Some(version.id),
            review_frequency_days,
            next_review_at: None,
            last_reviewed_at: None,
            approved_at: None,
            approved_version: None,
            published_at: None,
            is_template: input.is_template,
            template_framework_id: input.template_framework_id,
            cloned_from_policy_id: None,
            tags,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.insert_new_policy(&policy, &version).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyCreated,
                ResourceType::Policy,
                policy.id,
                json!({ "identifier": policy.identifier, "is_template": policy.is_template }),
            )
            .await;
        info!(policy_id = %policy.id, identifier = %policy.identifier, "policy created");
        Ok(PolicyDetail {
            review_status: self.review_status_of(&policy),
            policy,
            current_version: Some(version),
        })
    }

    pub async fn get_policy(&self, principal: &Principal, id: Uuid) -> Result<PolicyDetail> {
        let policy = self.load(principal, id).await?;
        self.detail(principal, policy).await
    }

    pub async fn list_policies(
        &self,
        principal: &Principal,
        filter: PolicyFilter,
        sort: PolicySort,
        page: PageRequest,
    ) -> Result<Page<PolicySummary>> {
        let page = page.within(LIST_LIMITS);
        let query = PolicyQuery {
            filter,
            sort,
            page,
            today: self.clock.today(),
            due_soon_days: self.config.expiring_soon_days,
        };
        tracing::debug!(?query.filter, "listing policies");
        let (rows, total) = self.store.list_policies(principal.org_id, &query).await?;
        Ok(Page::new(rows, page, total).map(|policy| PolicySummary {
            review_status: self.review_status_of(&policy),
            policy,
        }))
    }

    /// Identifier, title, description, tags and current content.
    pub async fn search_policies(
        &self,
        principal: &Principal,
        query: &str,
        page: PageRequest,
    ) -> Result<Page<PolicySummary>> {
        let query = content::require_text("query", query, TITLE_MAX_CHARS)?;
        let filter = PolicyFilter {
            search: Some(query),
            ..Default::default()
        };
        self.list_policies(principal, filter, PolicySort::default(), page)
            .await
    }

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn update_policy(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdatePolicy,
    ) -> Result<PolicyDetail> {
        let mut policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "edit policies")?;
        Self::ensure_not_archived(&policy)?;

        let mut changed: Vec<&str> = Vec::new();
        let previous_owner = policy.owner_id;

        if let Some(title) = input.title.as_deref() {
            policy.title = content::require_text("title", title, TITLE_MAX_CHARS)?;
            changed.push("title");
        }
        if let Some(description) = input.description.as_deref() {
            policy.description =
                content::optional_text("description", Some(description), DESCRIPTION_MAX_CHARS)?;
            changed.push("description");
        }
        if let Some(category) = input.category {
            policy.category = category;
            changed.push("category");
        }
        if let Some(owner_id) = input.owner_id {
            if owner_id != policy.owner_id {
                self.ensure_active_user(principal, owner_id, "owner_id").await?;
                policy.owner_id = owner_id;
                changed.push("owner_id");
            }
        }
        if let Some(secondary) = input.secondary_owner_id {
            self.ensure_active_user(principal, secondary, "secondary_owner_id")
                .await?;
            policy.secondary_owner_id = Some(secondary);
            changed.push("secondary_owner_id");
        }
        if let Some(days) = input.review_frequency_days {
            policy.review_frequency_days = validate_review_frequency(Some(days))?;
            changed.push("review_frequency_days");
        }
        if let Some(next) = input.next_review_at {
            policy.next_review_at = Some(next);
            changed.push("next_review_at");
        }
        if let Some(tags) = &input.tags {
            policy.tags = content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?;
            changed.push("tags");
        }
        if changed.is_empty() {
            return self.detail(principal, policy).await;
        }

        policy.updated_at = self.clock.now();
        self.store.update_policy(&policy).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyUpdated,
                ResourceType::Policy,
                policy.id,
                json!({ "fields": changed }),
            )
            .await;
        if policy.owner_id != previous_owner {
            self.log
                .emit(
                    principal,
                    AuditAction::PolicyOwnerChanged,
                    ResourceType::Policy,
                    policy.id,
                    json!({ "from": previous_owner, "to": policy.owner_id }),
                )
                .await;
        }
        self.detail(principal, policy).await
    }

    // ── Versions ──────────────────────────────────────────────

    /// Appends a version. Approval is invalidated: an approved, published or
    /// in-review policy drops back to draft and its pending sign-offs are
    /// withdrawn in the same transaction.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn create_version(
        &self,
        principal: &Principal,
        id: Uuid,
        input: CreatePolicyVersion,
    ) -> Result<PolicyVersion> {
        let mut policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "version policies")?;
        Self::ensure_not_archived(&policy)?;
        if input.change_type == ChangeType::Initial {
            return Err(GrcError::validation(
                "change_type 'initial' is reserved for version 1",
            ));
        }

        let versions = self.store.list_versions(principal.org_id, policy.id).await?;
        let next_number = versions.iter().map(|v| v.version_number).max().unwrap_or(0) + 1;
        let version = self.build_version(
            principal,
            policy.id,
            next_number,
            &input.content,
            input.content_format,
            input.change_type,
            input.change_summary.as_deref(),
            input.content_summary.as_deref(),
        )?;

        let from = policy.status;
        if matches!(
            from,
            PolicyStatus::Approved | PolicyStatus::Published | PolicyStatus::InReview
        ) {
            PolicyStatus::validate(from, PolicyStatus::Draft)?;
            policy.status = PolicyStatus::Draft;
        }
        let now = self.clock.now();
        policy.current_version_id = Some(version.id);
        policy.updated_at = now;

        let withdrawn = self.store.create_version(&policy, &version, now).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyVersionCreated,
                ResourceType::Policy,
                policy.id,
                json!({
                    "version_number": version.version_number,
                    "change_type": version.change_type,
                    "status_from": from,
                    "status_to": policy.status,
                    "signoffs_withdrawn": withdrawn,
                }),
            )
            .await;
        info!(policy_id = %policy.id, version = version.version_number, "policy version created");
        Ok(version)
    }

    pub async fn list_versions(&self, principal: &Principal, id: Uuid) -> Result<Vec<PolicyVersion>> {
        let policy = self.load(principal, id).await?;
        self.store.list_versions(principal.org_id, policy.id).await
    }

    pub async fn get_version(
        &self,
        principal: &Principal,
        id: Uuid,
        version_number: i32,
    ) -> Result<PolicyVersion> {
        let policy = self.load(principal, id).await?;
        self.store
            .get_version_by_number(principal.org_id, policy.id, version_number)
            .await?
            .ok_or_else(|| {
                GrcError::NotFound(format!("version {version_number} of policy {id}"))
            })
    }

    // ── Publish / archive ─────────────────────────────────────

    pub async fn publish(&self, principal: &Principal, id: Uuid) -> Result<Policy> {
        principal.require_any(POLICY_PUBLISH_ROLES, "publish policies")?;
        let mut policy = self.load(principal, id).await?;
        Self::ensure_not_archived(&policy)?;
        PolicyStatus::validate(policy.status, PolicyStatus::Published)?;

        let now = self.clock.now();
        let today = self.clock.today();
        policy.status = PolicyStatus::Published;
        policy.published_at = Some(now);
        policy.last_reviewed_at = Some(today);
        if policy.review_frequency_days.is_some() {
            policy.next_review_at = review::next_review(today, policy.review_frequency_days);
        }
        policy.updated_at = now;
        self.store.update_policy(&policy).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyPublished,
                ResourceType::Policy,
                policy.id,
                json!({
                    "approved_version": policy.approved_version,
                    "next_review_at": policy.next_review_at,
                }),
            )
            .await;
        info!(policy_id = %policy.id, "policy published");
        Ok(policy)
    }

    /// Archives the policy and withdraws every pending sign-off.
    pub async fn archive(&self, principal: &Principal, id: Uuid) -> Result<Policy> {
        principal.require_any(POLICY_ARCHIVE_ROLES, "archive policies")?;
        let mut policy = self.load(principal, id).await?;
        Self::ensure_not_archived(&policy)?;
        let from = policy.status;
        PolicyStatus::validate(from, PolicyStatus::Archived)?;

        let now = self.clock.now();
        policy.status = PolicyStatus::Archived;
        policy.updated_at = now;
        let withdrawn = self.store.archive_policy(&policy, now).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyArchived,
                ResourceType::Policy,
                policy.id,
                json!({ "from": from, "signoffs_withdrawn": withdrawn }),
            )
            .await;
        Ok(policy)
    }

    // ── Templates ─────────────────────────────────────────────

    /// New draft policy from a template's version-1 content.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, template_id = %input.template_id))]
    pub async fn clone_template(
        &self,
        principal: &Principal,
        input: CloneTemplate,
    ) -> Result<PolicyDetail> {
        principal.require_any(POLICY_CREATE_ROLES, "clone templates")?;
        let template = self.load(principal, input.template_id).await?;
        if !template.is_template {
            return Err(GrcError::validation(format!(
                "policy {} is not a template",
                template.identifier
            )));
        }
        let identifier = validate_identifier(&input.identifier)?;
        let title = match input.title.as_deref() {
            Some(t) => content::require_text("title", t, TITLE_MAX_CHARS)?,
            None => template.title.clone(),
        };
        let owner_id = input.owner_id.unwrap_or(principal.user_id);
        if owner_id != principal.user_id {
            self.ensure_active_user(principal, owner_id, "owner_id").await?;
        }
        let source = self
            .store
            .get_version_by_number(principal.org_id, template.id, 1)
            .await?
            .ok_or_else(|| GrcError::NotFound(format!("version 1 of template {}", template.id)))?;

        let id = Uuid::new_v4();
        let change_summary = format!("Cloned from template {}", template.identifier);
        let version = self.build_version(
            principal,
            id,
            1,
            &source.content,
            source.content_format,
            ChangeType::Initial,
            Some(change_summary.as_str()),
            source.content_summary.as_deref(),
        )?;
        let now = self.clock.now();
        let policy = Policy {
            id,
            org_id: principal.org_id,
            identifier,
            title,
            description: template.description.clone(),
            category: template.category,
            status: PolicyStatus::Draft,
            owner_id,
            secondary_owner_id: None,
            current_version_id: Some(version.id),
            review_frequency_days: template.review_frequency_days,
            next_review_at: None,
            last_reviewed_at: None,
            approved_at: None,
            approved_version: None,
            published_at: None,
            is_template: false,
            template_framework_id: template.template_framework_id,
            cloned_from_policy_id: Some(template.id),
            tags: template.tags.clone(),
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.insert_new_policy(&policy, &version).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicyClonedFromTemplate,
                ResourceType::Policy,
                policy.id,
                json!({
                    "template_id": template.id,
                    "template_identifier": template.identifier,
                    "identifier": policy.identifier,
                }),
            )
            .await;
        Ok(PolicyDetail {
            review_status: self.review_status_of(&policy),
            policy,
            current_version: Some(version),
        })
    }

    pub async fn clone_templates(
        &self,
        principal: &Principal,
        inputs: Vec<CloneTemplate>,
    ) -> Result<BulkOutcome<PolicyDetail>> {
        principal.require_any(POLICY_CREATE_ROLES, "clone templates")?;
        if inputs.is_empty() || inputs.len() > MAX_BULK_LINKS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_BULK_LINKS} templates per call"
            )));
        }
        let mut outcome = BulkOutcome::default();
        for (index, input) in inputs.into_iter().enumerate() {
            match self.clone_template(principal, input).await {
                Ok(detail) => outcome.created.push(detail),
                Err(e) => outcome.record_failure(index, &e),
            }
        }
        Ok(outcome)
    }

    // ── Control linkage ───────────────────────────────────────

    pub async fn link_control(
        &self,
        principal: &Principal,
        id: Uuid,
        input: LinkControl,
    ) -> Result<PolicyControl> {
        let policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "link controls")?;
        Self::ensure_not_archived(&policy)?;
        self.link_one(principal, &policy, input).await
    }

    async fn link_one(
        &self,
        principal: &Principal,
        policy: &Policy,
        input: LinkControl,
    ) -> Result<PolicyControl> {
        let notes = content::optional_text("notes", input.notes.as_deref(), NOTES_MAX_CHARS)?;
        self.directory
            .get_control(principal.org_id, input.control_id)
            .await?
            .ok_or_else(|| GrcError::NotFound(format!("control {}", input.control_id)))?;

        let now = self.clock.now();
        let link = PolicyControl {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            policy_id: policy.id,
            control_id: input.control_id,
            coverage: input.coverage,
            notes,
            linked_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_control_link(&link).await?;
        self.log
            .emit(
                principal,
                AuditAction::PolicyControlLinked,
                ResourceType::PolicyControl,
                link.id,
                json!({
                    "policy_id": policy.id,
                    "control_id": link.control_id,
                    "coverage": link.coverage,
                }),
            )
            .await;
        Ok(link)
    }

    /// Best-effort; duplicates are reported as skipped.
    pub async fn link_controls(
        &self,
        principal: &Principal,
        id: Uuid,
        inputs: Vec<LinkControl>,
    ) -> Result<BulkOutcome<PolicyControl>> {
        if inputs.is_empty() || inputs.len() > MAX_BULK_LINKS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_BULK_LINKS} controls per call"
            )));
        }
        let policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "link controls")?;
        Self::ensure_not_archived(&policy)?;

        let mut outcome = BulkOutcome::default();
        for (index, input) in inputs.into_iter().enumerate() {
            match self.link_one(principal, &policy, input).await {
                Ok(link) => outcome.created.push(link),
                Err(e) => outcome.record_failure(index, &e),
            }
        }
        Ok(outcome)
    }

    pub async fn list_controls(&self, principal: &Principal, id: Uuid) -> Result<Vec<PolicyControl>> {
        let policy = self.load(principal, id).await?;
        self.store
            .list_control_links(principal.org_id, policy.id)
            .await
    }

    pub async fn unlink_control(
        &self,
        principal: &Principal,
        id: Uuid,
        control_id: Uuid,
    ) -> Result<()> {
        let policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "unlink controls")?;
        Self::ensure_not_archived(&policy)?;
        if !self
            .store
            .delete_control_link(principal.org_id, policy.id, control_id)
            .await?
        {
            return Err(GrcError::NotFound(format!(
                "control {control_id} is not linked to policy {id}"
            )));
        }
        self.log
            .emit(
                principal,
                AuditAction::PolicyControlUnlinked,
                ResourceType::Policy,
                policy.id,
                json!({ "control_id": control_id }),
            )
            .await;
        Ok(())
    }

    // ── Analysis ──────────────────────────────────────────────

    pub async fn gap_analysis(&self, principal: &Principal, query: GapQuery) -> Result<GapReport> {
        let controls = self.directory.list_active_controls(principal.org_id).await?;
        let links = self.store.list_coverage_links(principal.org_id).await?;
        let report = gap::analyze(&controls, &links, query);
        tracing::debug!(
            total = report.total_controls,
            gaps = report.gaps.len(),
            "gap analysis computed"
        );
        Ok(report)
    }

    pub fn review_status(&self, policy: &Policy) -> ReviewStatus {
        self.review_status_of(policy)
    }
}
