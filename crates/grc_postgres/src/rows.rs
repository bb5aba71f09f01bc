//! Row shapes read back from Postgres and their conversion into core types.
//!
//! Enum columns arrive as text and are parsed with the core's wire-string
//! `FromStr`; an unknown value means the row was written by something else
//! and surfaces as an internal error.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use grc_core::audit::types::*;
use grc_core::directory::{ControlRecord, RequirementRecord, UserRecord};
use grc_core::evidence::types::*;
use grc_core::policy::types::*;
use grc_core::ports::CoverageLink;
use grc_core::GrcError;

fn parse<T: FromStr<Err = GrcError>>(column: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|e: GrcError| format!("column {column}: {e}"))
}

// ── Column lists ──────────────────────────────────────────────

pub(crate) const AUDIT_COLUMNS: &str = "id, org_id, title, description, audit_type, status, \
    framework_id, period_start, period_end, planned_start, planned_end, actual_start, actual_end, \
    audit_firm, lead_auditor, internal_lead_id, auditor_ids, milestones, report_metadata, \
    total_requests, open_requests, total_findings, open_findings, tags, created_by, created_at, \
    updated_at";

pub(crate) const REQUEST_COLUMNS: &str = "id, org_id, audit_id, title, description, priority, \
    status, control_id, requirement_id, requested_by, assigned_to, due_date, submitted_at, \
    reviewed_at, reviewed_by, reviewer_notes, reference_number, tags, created_at, updated_at";

pub(crate) const SUBMISSION_COLUMNS: &str = "id, org_id, audit_id, request_id, artifact_id, \
    submitted_by, submitted_at, submission_notes, status, reviewed_by, reviewed_at, review_notes, \
    created_at, updated_at";

pub(crate) const FINDING_COLUMNS: &str = "id, org_id, audit_id, title, description, severity, \
    category, status, control_id, requirement_id, found_by, remediation_owner_id, \
    remediation_plan, remediation_due_date, remediation_started_at, remediation_completed_at, \
    verified_at, verified_by, verification_notes, risk_accepted, risk_acceptance_reason, \
    risk_accepted_by, risk_accepted_at, reference_number, recommendation, management_response, \
    tags, metadata, created_at, updated_at";

pub(crate) const COMMENT_COLUMNS: &str = "id, org_id, audit_id, target_type, target_id, \
    author_id, body, parent_comment_id, is_internal, created_at, updated_at";

pub(crate) const TEMPLATE_COLUMNS: &str = "id, org_id, title, description, priority, category, \
    control_id, requirement_id, framework_id, tags, created_at, updated_at";

pub(crate) const ARTIFACT_COLUMNS: &str = "id, org_id, title, description, evidence_type, \
    status, collection_method, file_name, file_size, mime_type, object_key, checksum_sha256, \
    parent_artifact_id, version, is_current, collection_date, expires_at, freshness_period_days, \
    source_system, uploaded_by, upload_confirmed_at, tags, created_at, updated_at";

pub(crate) const LINK_COLUMNS: &str = "id, org_id, artifact_id, target_type, control_id, \
    requirement_id, strength, notes, linked_by, created_at, updated_at";

pub(crate) const EVALUATION_COLUMNS: &str = "id, org_id, artifact_id, evidence_link_id, verdict, \
    confidence, comments, missing_elements, remediation_notes, evaluated_by, created_at, updated_at";

pub(crate) const POLICY_COLUMNS: &str = "id, org_id, identifier, title, description, category, \
    status, owner_id, secondary_owner_id, current_version_id, review_frequency_days, \
    next_review_at, last_reviewed_at, approved_at, approved_version, published_at, is_template, \
    template_framework_id, cloned_from_policy_id, tags, created_by, created_at, updated_at";

pub(crate) const VERSION_COLUMNS: &str = "id, org_id, policy_id, version_number, is_current, \
    content, content_format, content_summary, change_summary, change_type, word_count, \
    character_count, created_by, created_at, updated_at";

pub(crate) const SIGNOFF_COLUMNS: &str = "id, org_id, policy_id, policy_version_id, signer_id, \
    signer_role, requested_by, requested_at, due_date, status, decided_at, comments, \
    reminder_count, reminder_sent_at, created_at, updated_at";

pub(crate) const POLICY_CONTROL_COLUMNS: &str = "id, org_id, policy_id, control_id, coverage, \
    notes, linked_by, created_at, updated_at";

// ── Directory ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub is_active: bool,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = String;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            email: r.email,
            display_name: r.display_name,
            role: parse("role", &r.role)?,
            is_active: r.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ControlRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub identifier: String,
    pub title: String,
    pub category: Option<String>,
    pub is_active: bool,
}

impl From<ControlRow> for ControlRecord {
    fn from(r: ControlRow) -> Self {
        Self {
            id: r.id,
            org_id: r.org_id,
            identifier: r.identifier,
            title: r.title,
            category: r.category,
            is_active: r.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RequirementRow {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub identifier: String,
    pub title: String,
}

impl From<RequirementRow> for RequirementRecord {
    fn from(r: RequirementRow) -> Self {
        Self {
            id: r.id,
            framework_id: r.framework_id,
            identifier: r.identifier,
            title: r.title,
        }
    }
}

// ── Audits ────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AuditRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub audit_type: String,
    pub status: String,
    pub framework_id: Option<Uuid>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub audit_firm: Option<String>,
    pub lead_auditor: Option<String>,
    pub internal_lead_id: Option<Uuid>,
    pub auditor_ids: Vec<Uuid>,
    pub milestones: serde_json::Value,
    pub report_metadata: serde_json::Value,
    pub total_requests: i32,
    pub open_requests: i32,
    pub total_findings: i32,
    pub open_findings: i32,
    pub tags: Vec<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for Audit {
    type Error = String;

    fn try_from(r: AuditRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            title: r.title,
            description: r.description,
            audit_type: parse("audit_type", &r.audit_type)?,
            status: parse("status", &r.status)?,
            framework_id: r.framework_id,
            period_start: r.period_start,
            period_end: r.period_end,
            planned_start: r.planned_start,
            planned_end: r.planned_end,
            actual_start: r.actual_start,
            actual_end: r.actual_end,
            audit_firm: r.audit_firm,
            lead_auditor: r.lead_auditor,
            internal_lead_id: r.internal_lead_id,
            auditor_ids: r.auditor_ids,
            milestones: r.milestones,
            report_metadata: r.report_metadata,
            total_requests: r.total_requests,
            open_requests: r.open_requests,
            total_findings: r.total_findings,
            open_findings: r.open_findings,
            tags: r.tags,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RequestRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub requested_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewer_notes: Option<String>,
    pub reference_number: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for AuditRequest {
    type Error = String;

    fn try_from(r: RequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            audit_id: r.audit_id,
            title: r.title,
            description: r.description,
            priority: parse("priority", &r.priority)?,
            status: parse("status", &r.status)?,
            control_id: r.control_id,
            requirement_id: r.requirement_id,
            requested_by: r.requested_by,
            assigned_to: r.assigned_to,
            due_date: r.due_date,
            submitted_at: r.submitted_at,
            reviewed_at: r.reviewed_at,
            reviewed_by: r.reviewed_by,
            reviewer_notes: r.reviewer_notes,
            reference_number: r.reference_number,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubmissionRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub request_id: Uuid,
    pub artifact_id: Uuid,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub submission_notes: Option<String>,
    pub status: String,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for AuditEvidenceLink {
    type Error = String;

    fn try_from(r: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            audit_id: r.audit_id,
            request_id: r.request_id,
            artifact_id: r.artifact_id,
            submitted_by: r.submitted_by,
            submitted_at: r.submitted_at,
            submission_notes: r.submission_notes,
            status: parse("status", &r.status)?,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            review_notes: r.review_notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FindingRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub category: Option<String>,
    pub status: String,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub found_by: Uuid,
    pub remediation_owner_id: Option<Uuid>,
    pub remediation_plan: Option<String>,
    pub remediation_due_date: Option<NaiveDate>,
    pub remediation_started_at: Option<DateTime<Utc>>,
    pub remediation_completed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub verification_notes: Option<String>,
    pub risk_accepted: bool,
    pub risk_acceptance_reason: Option<String>,
    pub risk_accepted_by: Option<Uuid>,
    pub risk_accepted_at: Option<DateTime<Utc>>,
    pub reference_number: Option<String>,
    pub recommendation: Option<String>,
    pub management_response: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FindingRow> for AuditFinding {
    type Error = String;

    fn try_from(r: FindingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            audit_id: r.audit_id,
            title: r.title,
            description: r.description,
            severity: parse("severity", &r.severity)?,
            category: r.category,
            status: parse("status", &r.status)?,
            control_id: r.control_id,
            requirement_id: r.requirement_id,
            found_by: r.found_by,
            remediation_owner_id: r.remediation_owner_id,
            remediation_plan: r.remediation_plan,
            remediation_due_date: r.remediation_due_date,
            remediation_started_at: r.remediation_started_at,
            remediation_completed_at: r.remediation_completed_at,
            verified_at: r.verified_at,
            verified_by: r.verified_by,
            verification_notes: r.verification_notes,
            risk_accepted: r.risk_accepted,
            risk_acceptance_reason: r.risk_acceptance_reason,
            risk_accepted_by: r.risk_accepted_by,
            risk_accepted_at: r.risk_accepted_at,
            reference_number: r.reference_number,
            recommendation: r.recommendation,
            management_response: r.management_response,
            tags: r.tags,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub target_type: String,
    pub target_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for AuditComment {
    type Error = String;

    fn try_from(r: CommentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            audit_id: r.audit_id,
            target_type: parse("target_type", &r.target_type)?,
            target_id: r.target_id,
            author_id: r.author_id,
            body: r.body,
            parent_comment_id: r.parent_comment_id,
            is_internal: r.is_internal,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TemplateRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub category: Option<String>,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub framework_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for AuditRequestTemplate {
    type Error = String;

    fn try_from(r: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            title: r.title,
            description: r.description,
            priority: parse("priority", &r.priority)?,
            category: r.category,
            control_id: r.control_id,
            requirement_id: r.requirement_id,
            framework_id: r.framework_id,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// `status, count` pair from a GROUP BY.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatusCountRow {
    pub status: String,
    pub n: i64,
}

impl StatusCountRow {
    pub fn parse<T: FromStr<Err = GrcError>>(self) -> Result<(T, u64), String> {
        Ok((parse("status", &self.status)?, crate::count(self.n)))
    }
}

// ── Evidence ──────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArtifactRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: String,
    pub status: String,
    pub collection_method: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub object_key: String,
    pub checksum_sha256: Option<String>,
    pub parent_artifact_id: Option<Uuid>,
    pub version: i32,
    pub is_current: bool,
    pub collection_date: NaiveDate,
    pub expires_at: Option<DateTime<Utc>>,
    pub freshness_period_days: Option<i32>,
    pub source_system: Option<String>,
    pub uploaded_by: Uuid,
    pub upload_confirmed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for EvidenceArtifact {
    type Error = String;

    fn try_from(r: ArtifactRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            title: r.title,
            description: r.description,
            evidence_type: parse("evidence_type", &r.evidence_type)?,
            status: parse("status", &r.status)?,
            collection_method: parse("collection_method", &r.collection_method)?,
            file_name: r.file_name,
            file_size: r.file_size,
            mime_type: r.mime_type,
            object_key: r.object_key,
            checksum_sha256: r.checksum_sha256,
            parent_artifact_id: r.parent_artifact_id,
            version: r.version,
            is_current: r.is_current,
            collection_date: r.collection_date,
            expires_at: r.expires_at,
            freshness_period_days: r.freshness_period_days,
            source_system: r.source_system,
            uploaded_by: r.uploaded_by,
            upload_confirmed_at: r.upload_confirmed_at,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LinkRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub artifact_id: Uuid,
    pub target_type: String,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub strength: String,
    pub notes: Option<String>,
    pub linked_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for EvidenceLink {
    type Error = String;

    fn try_from(r: LinkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            artifact_id: r.artifact_id,
            target_type: parse("target_type", &r.target_type)?,
            control_id: r.control_id,
            requirement_id: r.requirement_id,
            strength: parse("strength", &r.strength)?,
            notes: r.notes,
            linked_by: r.linked_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EvaluationRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub artifact_id: Uuid,
    pub evidence_link_id: Option<Uuid>,
    pub verdict: String,
    pub confidence: String,
    pub comments: Option<String>,
    pub missing_elements: Vec<String>,
    pub remediation_notes: Option<String>,
    pub evaluated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EvaluationRow> for EvidenceEvaluation {
    type Error = String;

    fn try_from(r: EvaluationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            artifact_id: r.artifact_id,
            evidence_link_id: r.evidence_link_id,
            verdict: parse("verdict", &r.verdict)?,
            confidence: parse("confidence", &r.confidence)?,
            comments: r.comments,
            missing_elements: r.missing_elements,
            remediation_notes: r.remediation_notes,
            evaluated_by: r.evaluated_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FreshnessRow {
    pub fresh: i64,
    pub expiring_soon: i64,
    pub expired: i64,
    pub no_expiry: i64,
}

impl From<FreshnessRow> for FreshnessSummary {
    fn from(r: FreshnessRow) -> Self {
        Self {
            fresh: crate::count(r.fresh),
            expiring_soon: crate::count(r.expiring_soon),
            expired: crate::count(r.expired),
            no_expiry: crate::count(r.no_expiry),
        }
    }
}

// ── Policies ──────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PolicyRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub owner_id: Uuid,
    pub secondary_owner_id: Option<Uuid>,
    pub current_version_id: Option<Uuid>,
    pub review_frequency_days: Option<i32>,
    pub next_review_at: Option<NaiveDate>,
    pub last_reviewed_at: Option<NaiveDate>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_version: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_template: bool,
    pub template_framework_id: Option<Uuid>,
    pub cloned_from_policy_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PolicyRow> for Policy {
    type Error = String;

    fn try_from(r: PolicyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            identifier: r.identifier,
            title: r.title,
            description: r.description,
            category: parse("category", &r.category)?,
            status: parse("status", &r.status)?,
            owner_id: r.owner_id,
            secondary_owner_id: r.secondary_owner_id,
            current_version_id: r.current_version_id,
            review_frequency_days: r.review_frequency_days,
            next_review_at: r.next_review_at,
            last_reviewed_at: r.last_reviewed_at,
            approved_at: r.approved_at,
            approved_version: r.approved_version,
            published_at: r.published_at,
            is_template: r.is_template,
            template_framework_id: r.template_framework_id,
            cloned_from_policy_id: r.cloned_from_policy_id,
            tags: r.tags,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub version_number: i32,
    pub is_current: bool,
    pub content: String,
    pub content_format: String,
    pub content_summary: Option<String>,
    pub change_summary: Option<String>,
    pub change_type: String,
    pub word_count: i32,
    pub character_count: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<VersionRow> for PolicyVersion {
    type Error = String;

    fn try_from(r: VersionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            policy_id: r.policy_id,
            version_number: r.version_number,
            is_current: r.is_current,
            content: r.content,
            content_format: parse("content_format", &r.content_format)?,
            content_summary: r.content_summary,
            change_summary: r.change_summary,
            change_type: parse("change_type", &r.change_type)?,
            word_count: r.word_count,
            character_count: r.character_count,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SignoffRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub policy_version_id: Uuid,
    pub signer_id: Uuid,
    pub signer_role: String,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub reminder_count: i32,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SignoffRow> for PolicySignoff {
    type Error = String;

    fn try_from(r: SignoffRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            policy_id: r.policy_id,
            policy_version_id: r.policy_version_id,
            signer_id: r.signer_id,
            signer_role: parse("signer_role", &r.signer_role)?,
            requested_by: r.requested_by,
            requested_at: r.requested_at,
            due_date: r.due_date,
            status: parse("status", &r.status)?,
            decided_at: r.decided_at,
            comments: r.comments,
            reminder_count: r.reminder_count,
            reminder_sent_at: r.reminder_sent_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PolicyControlRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub control_id: Uuid,
    pub coverage: String,
    pub notes: Option<String>,
    pub linked_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PolicyControlRow> for PolicyControl {
    type Error = String;

    fn try_from(r: PolicyControlRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            org_id: r.org_id,
            policy_id: r.policy_id,
            control_id: r.control_id,
            coverage: parse("coverage", &r.coverage)?,
            notes: r.notes,
            linked_by: r.linked_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CoverageRow {
    pub policy_id: Uuid,
    pub policy_identifier: String,
    pub policy_title: String,
    pub policy_status: String,
    pub control_id: Uuid,
    pub coverage: String,
}

impl TryFrom<CoverageRow> for CoverageLink {
    type Error = String;

    fn try_from(r: CoverageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            policy_id: r.policy_id,
            policy_identifier: r.policy_identifier,
            policy_title: r.policy_title,
            policy_status: parse("policy_status", &r.policy_status)?,
            control_id: r.control_id,
            coverage: parse("coverage", &r.coverage)?,
        })
    }
}

// ── Conversion helpers ────────────────────────────────────────

pub(crate) fn convert<R, T>(row: R) -> Result<T, GrcError>
where
    T: TryFrom<R, Error = String>,
{
    row.try_into()
        .map_err(|e: String| GrcError::Internal(anyhow::anyhow!(e)))
}

pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, GrcError>
where
    T: TryFrom<R, Error = String>,
{
    rows.into_iter().map(convert).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_row(target_type: &str) -> CommentRow {
        CommentRow {
            id: Uuid::nil(),
            org_id: Uuid::nil(),
            audit_id: Uuid::nil(),
            target_type: target_type.into(),
            target_id: Uuid::nil(),
            author_id: Uuid::nil(),
            body: "see attached".into(),
            parent_comment_id: None,
            is_internal: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn text_columns_parse_into_wire_enums() {
        let comment: AuditComment = convert(comment_row("finding")).unwrap();
        assert_eq!(comment.target_type, CommentTarget::Finding);
        assert!(comment.is_internal);
    }

    #[test]
    fn unknown_enum_text_is_internal() {
        let err = convert::<_, AuditComment>(comment_row("memo")).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("target_type"));
    }

    #[test]
    fn status_counts_parse() {
        let row = StatusCountRow {
            status: "in_progress".into(),
            n: 4,
        };
        let (status, n): (AuditRequestStatus, u64) = row.parse().unwrap();
        assert_eq!(status, AuditRequestStatus::InProgress);
        assert_eq!(n, 4);
    }
}
