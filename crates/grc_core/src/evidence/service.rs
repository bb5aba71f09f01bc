//! EvidenceService: artifacts, their version chains, links and evaluations.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit_log::{AuditAction, AuditLogEmitter, ResourceType};
use crate::clock::Clock;
use crate::config::{CoreConfig, MAX_BULK_LINKS};
use crate::content::{self, DESCRIPTION_MAX_CHARS, MAX_TAGS, NOTES_MAX_CHARS, TAG_MAX_CHARS, TITLE_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, EVALUATION_LIMITS, LIST_LIMITS};
use crate::ports::{DirectoryStore, EvidenceStore, ObjectStorage, PresignedUrl};
use crate::principal::{Principal, CONTRIBUTOR_ROLES, EVIDENCE_EVALUATE_ROLES, EVIDENCE_REVIEW_ROLES};
use crate::state_machine::StateMachine;
use crate::types::BulkOutcome;

use super::freshness;
use super::types::*;

#[derive(Clone)]
pub struct EvidenceService {
    store: Arc<dyn EvidenceStore>,
    directory: Arc<dyn DirectoryStore>,
    storage: Option<Arc<dyn ObjectStorage>>,
    log: AuditLogEmitter,
    clock: Arc<dyn Clock>,
    config: Arc<CoreConfig>,
}

/// `<org_id>/<root_artifact_id>/<version>/<file_name>`
pub fn object_key(org_id: Uuid, root_id: Uuid, version: i32, file_name: &str) -> String {
    format!("{org_id}/{root_id}/{version}/{file_name}")
}

impl EvidenceService {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        directory: Arc<dyn DirectoryStore>,
        storage: Option<Arc<dyn ObjectStorage>>,
        log: AuditLogEmitter,
        clock: Arc<dyn Clock>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            storage,
            log,
            clock,
            config,
        }
    }

    // ── Access helpers ────────────────────────────────────────

    /// Auditors reach artifacts only through audit submissions.
    fn ensure_library_access(principal: &Principal) -> Result<()> {
        if principal.is_auditor() {
            return Err(GrcError::Forbidden(
                "auditors cannot browse the evidence library".into(),
            ));
        }
        Ok(())
    }

    fn storage(&self) -> Result<&Arc<dyn ObjectStorage>> {
        self.storage
            .as_ref()
            .ok_or_else(|| GrcError::ServiceUnavailable("object storage is not configured".into()))
    }

    async fn load(&self, principal: &Principal, id: Uuid) -> Result<EvidenceArtifact> {
        let artifact = self
            .store
            .get_artifact(principal.org_id, id)
            .await?
            .ok_or_else(|| GrcError::NotFound(format!("evidence artifact {id}")))?;
        principal.ensure_same_org(artifact.org_id, "evidence artifact")?;
        Ok(artifact)
    }

    async fn load_current(&self, principal: &Principal, id: Uuid) -> Result<EvidenceArtifact> {
        let artifact = self.load(principal, id).await?;
        if !artifact.is_current {
            return Err(GrcError::Conflict(format!(
                "artifact {id} is version {} and no longer current",
                artifact.version
            )));
        }
        Ok(artifact)
    }

    fn view(&self, artifact: EvidenceArtifact) -> ArtifactView {
        let freshness_status = freshness::classify(
            artifact.expires_at,
            self.clock.now(),
            self.config.expiring_soon_days,
        );
        ArtifactView {
            artifact,
            freshness_status,
        }
    }

    fn validate_file(&self, file_name: &str, file_size: i64, mime_type: &str) -> Result<(String, String)> {
        let file_name = content::sanitize_file_name(file_name)?;
        if file_size <= 0 {
            return Err(GrcError::validation("file_size must be positive"));
        }
        if file_size > self.config.max_file_size_bytes {
            return Err(GrcError::validation(format!(
                "file_size exceeds {} bytes",
                self.config.max_file_size_bytes
            )));
        }
        let mime_type = content::validate_mime_type(mime_type)?;
        Ok((file_name, mime_type))
    }

    async fn upload_url(&self, key: &str, mime_type: &str) -> Result<Option<PresignedUrl>> {
        match &self.storage {
            Some(storage) => Ok(Some(storage.generate_upload_url(key, mime_type).await?)),
            None => Ok(None),
        }
    }

    // ── Create / confirm ──────────────────────────────────────

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, user_id = %principal.user_id))]
    pub async fn create_artifact(
        &self,
        principal: &Principal,
        input: CreateArtifact,
    ) -> Result<CreatedArtifact> {
        principal.require_any(CONTRIBUTOR_ROLES, "upload evidence")?;

        let title = content::require_text("title", &input.title, TITLE_MAX_CHARS)?;
        let description =
            content::optional_text("description", input.description.as_deref(), DESCRIPTION_MAX_CHARS)?;
        let (file_name, mime_type) =
            self.validate_file(&input.file_name, input.file_size, &input.mime_type)?;
        let today = self.clock.today();
        let collection_date =
            freshness::validate_collection_date(input.collection_date.unwrap_or(today), today)?;
        let freshness_period_days = freshness::validate_freshness_days(input.freshness_period_days)?;
        let source_system =
            content::optional_text("source_system", input.source_system.as_deref(), TITLE_MAX_CHARS)?;
        let tags = content::validate_tags(&input.tags, MAX_TAGS, TAG_MAX_CHARS)?;

        let now = self.clock.now();
        let id = Uuid::new_v4();
        let object_key = object_key(principal.org_id, id, 1, &file_name);
        let upload = self.upload_url(&object_key, &mime_type).await?;

        let artifact = EvidenceArtifact {
            id,
            org_id: principal.org_id,
            title,
            description,
            evidence_type: input.evidence_type,
            status: EvidenceStatus::Draft,
            collection_method: input.collection_method,
            file_name,
            file_size: input.file_size,
            mime_type,
            object_key,
            checksum_sha256: None,
            parent_artifact_id: None,
            version: 1,
            is_current: true,
            collection_date,
            expires_at: freshness::expires_at(collection_date, freshness_period_days),
            freshness_period_days,
            source_system,
            uploaded_by: principal.user_id,
            upload_confirmed_at: None,
            tags,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_artifact(&artifact).await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceCreated,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "title": artifact.title, "file_name": artifact.file_name }),
            )
            .await;
        info!(artifact_id = %artifact.id, "evidence artifact created");
        Ok(CreatedArtifact { artifact, upload })
    }

    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn confirm_upload(
        &self,
        principal: &Principal,
        id: Uuid,
        input: ConfirmUpload,
    ) -> Result<EvidenceArtifact> {
        principal.require_any(CONTRIBUTOR_ROLES, "confirm uploads")?;
        let mut artifact = self.load_current(principal, id).await?;
        if artifact.upload_confirmed_at.is_some() {
            return Err(GrcError::Conflict("upload already confirmed".into()));
        }
        if artifact.status != EvidenceStatus::Draft {
            return Err(GrcError::Conflict(format!(
                "upload can only be confirmed in draft, artifact is {}",
                artifact.status
            )));
        }
        let checksum = input
            .checksum_sha256
            .as_deref()
            .map(content::validate_checksum)
            .transpose()?;

        let size = self
            .storage()?
            .verify_object_exists(&artifact.object_key)
            .await?
            .ok_or_else(|| GrcError::Unprocessable("file has not been uploaded".into()))?;
        if i64::try_from(size).ok() != Some(artifact.file_size) {
            return Err(GrcError::Unprocessable(format!(
                "uploaded size {size} does not match declared size {}",
                artifact.file_size
            )));
        }

        let now = self.clock.now();
        artifact.upload_confirmed_at = Some(now);
        if checksum.is_some() {
            artifact.checksum_sha256 = checksum;
        }
        artifact.updated_at = now;
        self.store.update_artifact(&artifact).await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceUploadConfirmed,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "size": size, "checksum_sha256": artifact.checksum_sha256 }),
            )
            .await;
        Ok(artifact)
    }

    // ── Reads ─────────────────────────────────────────────────

    pub async fn get_artifact(&self, principal: &Principal, id: Uuid) -> Result<ArtifactDetail> {
        Self::ensure_library_access(principal)?;
        let artifact = self.load(principal, id).await?;
        let links = self.store.list_links(principal.org_id, artifact.id).await?;
        let view = self.view(artifact);
        Ok(ArtifactDetail {
            artifact: view.artifact,
            freshness_status: view.freshness_status,
            links,
        })
    }

    pub async fn list_artifacts(
        &self,
        principal: &Principal,
        filter: EvidenceFilter,
        sort: EvidenceSort,
        page: PageRequest,
    ) -> Result<Page<ArtifactView>> {
        let page = page.within(LIST_LIMITS);
        Self::ensure_library_access(principal)?;
        if !filter.tags.is_empty() {
            content::validate_tags(&filter.tags, MAX_TAGS, TAG_MAX_CHARS)?;
        }
        let query = EvidenceQuery {
            filter,
            sort,
            page,
            now: self.clock.now(),
            expiring_soon_days: self.config.expiring_soon_days,
        };
        tracing::debug!(?query.filter, "listing evidence");
        let (rows, total) = self.store.list_artifacts(principal.org_id, &query).await?;
        Ok(Page::new(rows, page, total).map(|a| self.view(a)))
    }

    /// Free-text search over title, description, source system and tags.
    pub async fn search_artifacts(
        &self,
        principal: &Principal,
        query: &str,
        page: PageRequest,
    ) -> Result<Page<ArtifactView>> {
        let query = content::require_text("query", query, TITLE_MAX_CHARS)?;
        let filter = EvidenceFilter {
            search: Some(query),
            ..Default::default()
        };
        self.list_artifacts(principal, filter, EvidenceSort::default(), page)
            .await
    }

    /// Whole chain, ascending by version.
    pub async fn list_versions(&self, principal: &Principal, id: Uuid) -> Result<Vec<EvidenceArtifact>> {
        Self::ensure_library_access(principal)?;
        let artifact = self.load(principal, id).await?;
        self.store
            .list_chain(principal.org_id, artifact.root_id())
            .await
    }

    // ── Versioning ────────────────────────────────────────────

    /// Appends a version to the chain of `id` (any member of the chain).
    /// The current version is superseded and its links copied forward in
    /// one transaction. A chain without a current version is revived from
    /// its latest version.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn create_version(
        &self,
        principal: &Principal,
        id: Uuid,
        input: CreateVersion,
    ) -> Result<CreatedArtifact> {
        principal.require_any(CONTRIBUTOR_ROLES, "version evidence")?;
        let anchor = self.load(principal, id).await?;
        let root_id = anchor.root_id();
        let chain = self.store.list_chain(principal.org_id, root_id).await?;
        let latest = chain
            .last()
            .cloned()
            .ok_or_else(|| GrcError::NotFound(format!("evidence artifact {id}")))?;
        let current = chain.iter().find(|a| a.is_current).cloned();
        let base = current.clone().unwrap_or_else(|| latest.clone());

        let (file_name, mime_type) =
            self.validate_file(&input.file_name, input.file_size, &input.mime_type)?;
        let title = match input.title.as_deref() {
            Some(t) => content::require_text("title", t, TITLE_MAX_CHARS)?,
            None => base.title.clone(),
        };
        let description = match input.description.as_deref() {
            Some(d) => content::optional_text("description", Some(d), DESCRIPTION_MAX_CHARS)?,
            None => base.description.clone(),
        };
        let today = self.clock.today();
        let collection_date =
            freshness::validate_collection_date(input.collection_date.unwrap_or(today), today)?;
        let freshness_period_days = match input.freshness_period_days {
            Some(d) => freshness::validate_freshness_days(Some(d))?,
            None => base.freshness_period_days,
        };
        let source_system = match input.source_system.as_deref() {
            Some(s) => content::optional_text("source_system", Some(s), TITLE_MAX_CHARS)?,
            None => base.source_system.clone(),
        };
        let tags = match &input.tags {
            Some(tags) => content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?,
            None => base.tags.clone(),
        };

        let now = self.clock.now();
        let version = latest.version + 1;
        let object_key = object_key(principal.org_id, root_id, version, &file_name);
        let upload = self.upload_url(&object_key, &mime_type).await?;

        let next = EvidenceArtifact {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            title,
            description,
            evidence_type: base.evidence_type,
            status: EvidenceStatus::Draft,
            collection_method: base.collection_method,
            file_name,
            file_size: input.file_size,
            mime_type,
            object_key,
            checksum_sha256: None,
            parent_artifact_id: Some(root_id),
            version,
            is_current: true,
            collection_date,
            expires_at: freshness::expires_at(collection_date, freshness_period_days),
            freshness_period_days,
            source_system,
            uploaded_by: principal.user_id,
            upload_confirmed_at: None,
            tags,
            created_at: now,
            updated_at: now,
        };
        let superseded = current.map(|mut prev| {
            prev.is_current = false;
            prev.status = EvidenceStatus::Superseded;
            prev.updated_at = now;
            prev
        });

        let copied = self
            .store
            .create_version(superseded.as_ref(), &next, Some(base.id))
            .await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceVersionCreated,
                ResourceType::EvidenceArtifact,
                next.id,
                json!({
                    "root_id": root_id,
                    "version": version,
                    "previous_id": base.id,
                    "links_copied": copied.len(),
                }),
            )
            .await;
        info!(artifact_id = %next.id, version, "evidence version created");
        Ok(CreatedArtifact {
            artifact: next,
            upload,
        })
    }

    // ── Metadata / status / delete ────────────────────────────

    pub async fn update_artifact(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateArtifact,
    ) -> Result<EvidenceArtifact> {
        principal.require_any(CONTRIBUTOR_ROLES, "edit evidence")?;
        let mut artifact = self.load_current(principal, id).await?;
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = input.title.as_deref() {
            artifact.title = content::require_text("title", title, TITLE_MAX_CHARS)?;
            changed.push("title");
        }
        if let Some(description) = input.description.as_deref() {
            artifact.description =
                content::optional_text("description", Some(description), DESCRIPTION_MAX_CHARS)?;
            changed.push("description");
        }
        if let Some(evidence_type) = input.evidence_type {
            artifact.evidence_type = evidence_type;
            changed.push("evidence_type");
        }
        if let Some(method) = input.collection_method {
            artifact.collection_method = method;
            changed.push("collection_method");
        }
        if let Some(days) = input.freshness_period_days {
            artifact.freshness_period_days = freshness::validate_freshness_days(Some(days))?;
            artifact.expires_at =
                freshness::expires_at(artifact.collection_date, artifact.freshness_period_days);
            changed.push("freshness_period_days");
        }
        if let Some(source) = input.source_system.as_deref() {
            artifact.source_system =
                content::optional_text("source_system", Some(source), TITLE_MAX_CHARS)?;
            changed.push("source_system");
        }
        if let Some(tags) = &input.tags {
            artifact.tags = content::validate_tags(tags, MAX_TAGS, TAG_MAX_CHARS)?;
            changed.push("tags");
        }
        if changed.is_empty() {
            return Ok(artifact);
        }

        artifact.updated_at = self.clock.now();
        self.store.update_artifact(&artifact).await?;
        self.log
            .emit(
                principal,
                AuditAction::EvidenceUpdated,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "fields": changed }),
            )
            .await;
        Ok(artifact)
    }

    #[instrument(skip(self, principal, notes), fields(org_id = %principal.org_id))]
    pub async fn transition_status(
        &self,
        principal: &Principal,
        id: Uuid,
        to: EvidenceStatus,
        notes: Option<String>,
    ) -> Result<EvidenceArtifact> {
        match to {
            EvidenceStatus::Approved | EvidenceStatus::Rejected | EvidenceStatus::Expired => {
                principal.require_any(EVIDENCE_REVIEW_ROLES, "review evidence")?
            }
            _ => principal.require_any(CONTRIBUTOR_ROLES, "submit evidence for review")?,
        }
        let notes = content::optional_text("notes", notes.as_deref(), NOTES_MAX_CHARS)?;
        let mut artifact = self.load_current(principal, id).await?;
        let from = artifact.status;
        EvidenceStatus::validate(from, to)?;

        artifact.status = to;
        artifact.updated_at = self.clock.now();
        self.store.update_artifact(&artifact).await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceStatusChanged,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "from": from, "to": to, "notes": notes }),
            )
            .await;
        info!(artifact_id = %artifact.id, %from, %to, "evidence status changed");
        Ok(artifact)
    }

    /// Soft delete: the version is superseded and leaves the chain's current
    /// slot empty. The stored file is retained.
    pub async fn delete_artifact(&self, principal: &Principal, id: Uuid) -> Result<()> {
        principal.require_any(CONTRIBUTOR_ROLES, "delete evidence")?;
        let mut artifact = self.load_current(principal, id).await?;
        principal.require_self_or_any(artifact.uploaded_by, EVIDENCE_REVIEW_ROLES, "delete others' evidence")?;

        artifact.status = EvidenceStatus::Superseded;
        artifact.is_current = false;
        artifact.updated_at = self.clock.now();
        self.store.update_artifact(&artifact).await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceDeleted,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "version": artifact.version }),
            )
            .await;
        Ok(())
    }

    /// Presigned download for any version. Drafts are checked against the
    /// store first since their upload may never have happened.
    pub async fn download_url(&self, principal: &Principal, id: Uuid) -> Result<PresignedUrl> {
        Self::ensure_library_access(principal)?;
        let artifact = self.load(principal, id).await?;
        let storage = self.storage()?;
        if artifact.status == EvidenceStatus::Draft
            && storage
                .verify_object_exists(&artifact.object_key)
                .await?
                .is_none()
        {
            return Err(GrcError::Unprocessable("file has not been uploaded".into()));
        }
        let url = storage
            .generate_download_url(&artifact.object_key, &artifact.file_name)
            .await?;

        self.log
            .emit(
                principal,
                AuditAction::EvidenceDownloaded,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({ "version": artifact.version }),
            )
            .await;
        Ok(url)
    }

    // ── Links ─────────────────────────────────────────────────

    async fn target_exists(&self, principal: &Principal, target: &LinkTarget) -> Result<()> {
        let found = match target.target_type {
            LinkTargetType::Control => self
                .directory
                .get_control(principal.org_id, target.target_id)
                .await?
                .is_some(),
            LinkTargetType::Requirement => self
                .directory
                .get_requirement(principal.org_id, target.target_id)
                .await?
                .is_some(),
        };
        if found {
            Ok(())
        } else {
            Err(GrcError::NotFound(format!(
                "{} {}",
                target.target_type, target.target_id
            )))
        }
    }

    /// Best-effort bulk link. Duplicate pairs are skipped with `CONFLICT`;
    /// when every item was a duplicate the call itself conflicts.
    #[instrument(skip(self, principal, targets), fields(org_id = %principal.org_id, count = targets.len()))]
    pub async fn link_targets(
        &self,
        principal: &Principal,
        id: Uuid,
        targets: Vec<LinkTarget>,
    ) -> Result<BulkOutcome<EvidenceLink>> {
        principal.require_any(CONTRIBUTOR_ROLES, "link evidence")?;
        if targets.is_empty() || targets.len() > MAX_BULK_LINKS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_BULK_LINKS} links per call"
            )));
        }
        let artifact = self.load_current(principal, id).await?;

        let mut outcome = BulkOutcome::default();
        for (index, target) in targets.into_iter().enumerate() {
            match self.link_one(principal, &artifact, target).await {
                Ok(link) => outcome.created.push(link),
                Err(e) => outcome.record_failure(index, &e),
            }
        }
        if outcome.created.is_empty() && outcome.errors.is_empty() && !outcome.skipped.is_empty() {
            return Err(GrcError::Conflict("every link already exists".into()));
        }
        Ok(outcome)
    }

    async fn link_one(
        &self,
        principal: &Principal,
        artifact: &EvidenceArtifact,
        target: LinkTarget,
    ) -> Result<EvidenceLink> {
        let notes = content::optional_text("notes", target.notes.as_deref(), NOTES_MAX_CHARS)?;
        self.target_exists(principal, &target).await?;
        let now = self.clock.now();
        let (control_id, requirement_id) = match target.target_type {
            LinkTargetType::Control => (Some(target.target_id), None),
            LinkTargetType::Requirement => (None, Some(target.target_id)),
        };
        let link = EvidenceLink {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            artifact_id: artifact.id,
            target_type: target.target_type,
            control_id,
            requirement_id,
            strength: target.strength.unwrap_or(LinkStrength::Primary),
            notes,
            linked_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_link(&link).await?;
        self.log
            .emit(
                principal,
                AuditAction::EvidenceLinked,
                ResourceType::EvidenceLink,
                link.id,
                json!({
                    "artifact_id": artifact.id,
                    "target_type": link.target_type,
                    "target_id": link.target_id(),
                }),
            )
            .await;
        Ok(link)
    }

    pub async fn list_links(&self, principal: &Principal, id: Uuid) -> Result<Vec<EvidenceLink>> {
        Self::ensure_library_access(principal)?;
        let artifact = self.load(principal, id).await?;
        self.store.list_links(principal.org_id, artifact.id).await
    }

    pub async fn unlink(&self, principal: &Principal, id: Uuid, link_id: Uuid) -> Result<()> {
        principal.require_any(CONTRIBUTOR_ROLES, "unlink evidence")?;
        let artifact = self.load_current(principal, id).await?;
        let link = self
            .store
            .get_link(principal.org_id, link_id)
            .await?
            .filter(|l| l.artifact_id == artifact.id)
            .ok_or_else(|| GrcError::NotFound(format!("evidence link {link_id}")))?;
        self.store.delete_link(principal.org_id, link.id).await?;
        self.log
            .emit(
                principal,
                AuditAction::EvidenceUnlinked,
                ResourceType::EvidenceLink,
                link.id,
                json!({ "artifact_id": artifact.id, "target_id": link.target_id() }),
            )
            .await;
        Ok(())
    }

    // ── Evaluations ───────────────────────────────────────────

    /// Records a verdict. On an artifact awaiting review a `sufficient`
    /// verdict approves it and `insufficient` rejects it.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id))]
    pub async fn evaluate(
        &self,
        principal: &Principal,
        id: Uuid,
        input: CreateEvaluation,
    ) -> Result<EvaluationOutcome> {
        principal.require_any(EVIDENCE_EVALUATE_ROLES, "evaluate evidence")?;
        let mut artifact = self.load_current(principal, id).await?;

        if let Some(link_id) = input.evidence_link_id {
            let belongs = self
                .store
                .get_link(principal.org_id, link_id)
                .await?
                .is_some_and(|l| l.artifact_id == artifact.id);
            if !belongs {
                return Err(GrcError::validation(
                    "evidence_link_id does not belong to this artifact",
                ));
            }
        }
        let comments = content::optional_text(
            "comments",
            input.comments.as_deref(),
            content::EVALUATION_COMMENTS_MAX_CHARS,
        )?;
        if input.missing_elements.len() > content::MISSING_ELEMENTS_MAX {
            return Err(GrcError::validation(format!(
                "at most {} missing elements",
                content::MISSING_ELEMENTS_MAX
            )));
        }
        let missing_elements = input
            .missing_elements
            .iter()
            .map(|m| content::require_text("missing_elements", m, content::MISSING_ELEMENT_MAX_CHARS))
            .collect::<Result<Vec<_>>>()?;
        let remediation_notes = content::optional_text(
            "remediation_notes",
            input.remediation_notes.as_deref(),
            NOTES_MAX_CHARS,
        )?;

        let now = self.clock.now();
        let evaluation = EvidenceEvaluation {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            artifact_id: artifact.id,
            evidence_link_id: input.evidence_link_id,
            verdict: input.verdict,
            confidence: input.confidence,
            comments,
            missing_elements,
            remediation_notes,
            evaluated_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_evaluation(&evaluation).await?;

        let auto_status = match (artifact.status, evaluation.verdict) {
            (EvidenceStatus::PendingReview, Verdict::Sufficient) => Some(EvidenceStatus::Approved),
            (EvidenceStatus::PendingReview, Verdict::Insufficient) => Some(EvidenceStatus::Rejected),
            _ => None,
        };
        if let Some(to) = auto_status {
            EvidenceStatus::validate(artifact.status, to)?;
            let from = artifact.status;
            artifact.status = to;
            artifact.updated_at = now;
            self.store.update_artifact(&artifact).await?;
            self.log
                .emit_transition(
                    principal,
                    AuditAction::EvidenceStatusChanged,
                    ResourceType::EvidenceArtifact,
                    artifact.id,
                    from.as_str(),
                    to.as_str(),
                )
                .await;
        }

        self.log
            .emit(
                principal,
                AuditAction::EvidenceEvaluated,
                ResourceType::EvidenceArtifact,
                artifact.id,
                json!({
                    "evaluation_id": evaluation.id,
                    "verdict": evaluation.verdict,
                    "confidence": evaluation.confidence,
                }),
            )
            .await;
        Ok(EvaluationOutcome {
            evaluation,
            status_changed_to: auto_status,
        })
    }

    pub async fn list_evaluations(
        &self,
        principal: &Principal,
        id: Uuid,
        page: PageRequest,
    ) -> Result<Page<EvidenceEvaluation>> {
        let page = page.within(EVALUATION_LIMITS);
        Self::ensure_library_access(principal)?;
        let artifact = self.load(principal, id).await?;
        let (rows, total) = self
            .store
            .list_evaluations(principal.org_id, artifact.id, page)
            .await?;
        Ok(Page::new(rows, page, total))
    }

    pub async fn freshness_summary(&self, principal: &Principal) -> Result<FreshnessSummary> {
        Self::ensure_library_access(principal)?;
        self.store
            .freshness_summary(
                principal.org_id,
                self.clock.now(),
                self.config.expiring_soon_days,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_layout() {
        let org = Uuid::nil();
        let root = Uuid::from_u128(1);
        assert_eq!(
            object_key(org, root, 3, "report.pdf"),
            format!("{org}/{root}/3/report.pdf")
        );
    }
}
