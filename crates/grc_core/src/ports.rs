//! Port traits for every external collaborator.
//!
//! Implemented by `grc_postgres` (relational store, audit-log sink) and by
//! `crate::memory` (tests). Core logic depends only on these traits.
//!
//! Every store method that reads rows takes the caller's `org_id` and must
//! include it in its predicate. Composite methods documented as atomic must
//! run in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::types::*;
use crate::audit_log::AuditLogEntry;
use crate::directory::{ControlRecord, RequirementRecord, UserRecord};
use crate::error::GrcError;
use crate::evidence::types::*;
use crate::pagination::PageRequest;
use crate::policy::types::*;

pub type Result<T> = std::result::Result<T, GrcError>;

// ── Object storage ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for GrcError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                GrcError::Unprocessable(format!("object '{key}' has not been uploaded"))
            }
            StorageError::Storage(msg) => GrcError::ServiceUnavailable(msg),
        }
    }
}

/// Object storage for evidence files. Keys follow
/// `<org_id>/<root_artifact_id>/<version>/<file_name>`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn generate_upload_url(
        &self,
        key: &str,
        mime_type: &str,
    ) -> std::result::Result<PresignedUrl, StorageError>;

    async fn generate_download_url(
        &self,
        key: &str,
        file_name: &str,
    ) -> std::result::Result<PresignedUrl, StorageError>;

    /// Size in bytes of the stored object, or `None` when absent.
    async fn verify_object_exists(&self, key: &str)
        -> std::result::Result<Option<u64>, StorageError>;
}

// ── Audit log ─────────────────────────────────────────────────

#[async_trait]
pub trait AuditLogSink: Send + Sync {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()>;
}

// ── Directory (users, controls, requirements, frameworks) ─────

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_user(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRecord>>;

    async fn get_control(&self, org_id: Uuid, control_id: Uuid) -> Result<Option<ControlRecord>>;

    async fn list_active_controls(&self, org_id: Uuid) -> Result<Vec<ControlRecord>>;

    /// Requirements are visible to an org through the frameworks it adopted.
    async fn get_requirement(
        &self,
        org_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<RequirementRecord>>;

    async fn framework_exists(&self, org_id: Uuid, framework_id: Uuid) -> Result<bool>;
}

// ── Evidence ──────────────────────────────────────────────────

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn insert_artifact(&self, artifact: &EvidenceArtifact) -> Result<()>;

    async fn get_artifact(&self, org_id: Uuid, id: Uuid) -> Result<Option<EvidenceArtifact>>;

    async fn update_artifact(&self, artifact: &EvidenceArtifact) -> Result<()>;

    async fn list_artifacts(
        &self,
        org_id: Uuid,
        query: &EvidenceQuery,
    ) -> Result<(Vec<EvidenceArtifact>, u64)>;

    /// Every version rooted at `root_id`, ascending by version.
    async fn list_chain(&self, org_id: Uuid, root_id: Uuid) -> Result<Vec<EvidenceArtifact>>;

    /// Atomic: writes `superseded` (the previous current version, already
    /// flipped to `is_current = false, status = superseded`) guarded on it
    /// still being current, inserts `next`, and copies every link of
    /// `copy_links_from` onto `next`. Returns the copied links.
    async fn create_version(
        &self,
        superseded: Option<&EvidenceArtifact>,
        next: &EvidenceArtifact,
        copy_links_from: Option<Uuid>,
    ) -> Result<Vec<EvidenceLink>>;

    /// `GrcError::Conflict` when the (artifact, target) pair already exists.
    async fn insert_link(&self, link: &EvidenceLink) -> Result<()>;

    async fn get_link(&self, org_id: Uuid, link_id: Uuid) -> Result<Option<EvidenceLink>>;

    async fn list_links(&self, org_id: Uuid, artifact_id: Uuid) -> Result<Vec<EvidenceLink>>;

    async fn delete_link(&self, org_id: Uuid, link_id: Uuid) -> Result<bool>;

    async fn insert_evaluation(&self, evaluation: &EvidenceEvaluation) -> Result<()>;

    async fn list_evaluations(
        &self,
        org_id: Uuid,
        artifact_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<EvidenceEvaluation>, u64)>;

    /// Bucket counts over current versions.
    async fn freshness_summary(
        &self,
        org_id: Uuid,
        now: DateTime<Utc>,
        expiring_soon_days: i64,
    ) -> Result<FreshnessSummary>;
}

// ── Policies ──────────────────────────────────────────────────

/// A policy-control link joined with the owning policy, for gap analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageLink {
    pub policy_id: Uuid,
    pub policy_identifier: String,
    pub policy_title: String,
    pub policy_status: PolicyStatus,
    pub control_id: Uuid,
    pub coverage: Coverage,
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Atomic: inserts the policy and its first version.
    /// `GrcError::Conflict` when the identifier is taken.
    async fn create_policy(&self, policy: &Policy, version: &PolicyVersion) -> Result<()>;

    async fn get_policy(&self, org_id: Uuid, id: Uuid) -> Result<Option<Policy>>;

    async fn find_by_identifier(&self, org_id: Uuid, identifier: &str) -> Result<Option<Policy>>;

    async fn update_policy(&self, policy: &Policy) -> Result<()>;

    async fn list_policies(&self, org_id: Uuid, query: &PolicyQuery)
        -> Result<(Vec<Policy>, u64)>;

    async fn get_version(&self, org_id: Uuid, version_id: Uuid) -> Result<Option<PolicyVersion>>;

    async fn get_version_by_number(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
        version_number: i32,
    ) -> Result<Option<PolicyVersion>>;

    /// Newest first.
    async fn list_versions(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicyVersion>>;

    /// Atomic: clears `is_current` on the policy's versions, inserts
    /// `version`, writes `policy` (new `current_version_id` and status) and
    /// withdraws every pending sign-off of the policy. Returns the number of
    /// sign-offs withdrawn.
    async fn create_version(
        &self,
        policy: &Policy,
        version: &PolicyVersion,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Atomic: writes `policy` (now `in_review`) and inserts the sign-offs.
    async fn submit_for_review(&self, policy: &Policy, signoffs: &[PolicySignoff]) -> Result<()>;

    async fn get_signoff(&self, org_id: Uuid, signoff_id: Uuid) -> Result<Option<PolicySignoff>>;

    async fn list_signoffs(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicySignoff>>;

    async fn list_pending_for_signer(
        &self,
        org_id: Uuid,
        signer_id: Uuid,
    ) -> Result<Vec<PolicySignoff>>;

    async fn update_signoff(&self, signoff: &PolicySignoff) -> Result<()>;

    async fn count_pending_signoffs(&self, org_id: Uuid, version_id: Uuid) -> Result<u64>;

    /// Atomic: writes `policy` (now `archived`) and withdraws every pending
    /// sign-off. Returns the number withdrawn.
    async fn archive_policy(&self, policy: &Policy, at: DateTime<Utc>) -> Result<u64>;

    /// `GrcError::Conflict` when the (policy, control) pair already exists.
    async fn insert_control_link(&self, link: &PolicyControl) -> Result<()>;

    async fn list_control_links(&self, org_id: Uuid, policy_id: Uuid)
        -> Result<Vec<PolicyControl>>;

    async fn delete_control_link(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
        control_id: Uuid,
    ) -> Result<bool>;

    /// Links of every non-archived policy in the org.
    async fn list_coverage_links(&self, org_id: Uuid) -> Result<Vec<CoverageLink>>;
}

// ── Audits ────────────────────────────────────────────────────

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, audit: &Audit) -> Result<()>;

    async fn get_audit(&self, org_id: Uuid, id: Uuid) -> Result<Option<Audit>>;

    async fn update_audit(&self, audit: &Audit) -> Result<()>;

    async fn list_audits(
        &self,
        org_id: Uuid,
        filter: &AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<(Vec<Audit>, u64)>;

    async fn list_audit_ids(&self, org_id: Uuid) -> Result<Vec<Uuid>>;

    async fn dashboard(&self, org_id: Uuid, auditor_id: Option<Uuid>) -> Result<AuditDashboard>;

    /// Overwrites `total_requests` and `open_requests`.
    async fn set_request_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Overwrites `total_findings` and `open_findings`.
    async fn set_finding_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // requests

    async fn insert_request(&self, request: &AuditRequest) -> Result<()>;

    /// Atomic: either every row is stored or none is.
    async fn insert_requests(&self, requests: &[AuditRequest]) -> Result<()>;

    async fn get_request(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditRequest>>;

    async fn update_request(&self, request: &AuditRequest) -> Result<()>;

    async fn list_requests(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditRequest>, u64)>;

    async fn request_status_counts(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Vec<(AuditRequestStatus, u64)>>;

    /// Reference numbers of the audit's requests starting with `<prefix>-`.
    async fn list_reference_numbers(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        prefix: &str,
    ) -> Result<Vec<String>>;

    async fn get_templates(
        &self,
        org_id: Uuid,
        template_ids: &[Uuid],
    ) -> Result<Vec<AuditRequestTemplate>>;

    // evidence submissions

    /// `GrcError::Conflict` when the (request, artifact) pair already exists.
    async fn insert_submission(&self, link: &AuditEvidenceLink) -> Result<()>;

    async fn get_submission(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditEvidenceLink>>;

    async fn update_submission(&self, link: &AuditEvidenceLink) -> Result<()>;

    async fn delete_submission(&self, org_id: Uuid, id: Uuid) -> Result<bool>;

    async fn list_submissions(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<AuditEvidenceLink>>;

    async fn count_submissions(&self, org_id: Uuid, request_id: Uuid) -> Result<u64>;

    // findings

    async fn insert_finding(&self, finding: &AuditFinding) -> Result<()>;

    async fn get_finding(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditFinding>>;

    async fn update_finding(&self, finding: &AuditFinding) -> Result<()>;

    async fn list_findings(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &FindingFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditFinding>, u64)>;

    async fn finding_status_counts(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Vec<(FindingStatus, u64)>>;

    // comments

    async fn insert_comment(&self, comment: &AuditComment) -> Result<()>;

    async fn get_comment(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditComment>>;

    async fn update_comment(&self, comment: &AuditComment) -> Result<()>;

    /// Deletes the comment and its replies; returns rows removed.
    async fn delete_comment(&self, org_id: Uuid, id: Uuid) -> Result<u64>;

    /// Oldest first.
    async fn list_comments(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        query: &CommentQuery,
    ) -> Result<(Vec<AuditComment>, u64)>;
}
