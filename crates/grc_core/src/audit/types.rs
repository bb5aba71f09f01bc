//! Audit engagement value types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pagination::PageRequest;
use crate::types::{Metadata, SortDirection};
use crate::wire_enum;

wire_enum! {
    pub enum AuditStatus {
        Planning => "planning",
        Fieldwork => "fieldwork",
        Reporting => "reporting",
        Remediation => "remediation",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl AuditStatus {
    /// Terminal audits reject every mutation of their requests, findings
    /// and evidence submissions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

wire_enum! {
    pub enum AuditType {
        Internal => "internal",
        External => "external",
        Certification => "certification",
        Surveillance => "surveillance",
        Readiness => "readiness",
    }
}

wire_enum! {
    pub enum Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

wire_enum! {
    pub enum AuditRequestStatus {
        Open => "open",
        InProgress => "in_progress",
        Submitted => "submitted",
        Accepted => "accepted",
        Rejected => "rejected",
        Closed => "closed",
    }
}

impl AuditRequestStatus {
    /// Requests still needing work from either side.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Accepted | Self::Closed)
    }
}

wire_enum! {
    pub enum SubmissionStatus {
        PendingReview => "pending_review",
        Accepted => "accepted",
        Rejected => "rejected",
        NeedsClarification => "needs_clarification",
    }
}

wire_enum! {
    pub enum Severity {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
        Informational => "informational",
    }
}

wire_enum! {
    pub enum FindingStatus {
        Identified => "identified",
        RemediationPlanned => "remediation_planned",
        RemediationInProgress => "remediation_in_progress",
        RemediationComplete => "remediation_complete",
        Verified => "verified",
        Closed => "closed",
        RiskAccepted => "risk_accepted",
    }
}

impl FindingStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Verified | Self::Closed | Self::RiskAccepted)
    }
}

wire_enum! {
    pub enum CommentTarget {
        Audit => "audit",
        Request => "request",
        Finding => "finding",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub audit_type: AuditType,
    pub status: AuditStatus,
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
    /// Assigned auditors, in assignment order, without duplicates.
    pub auditor_ids: Vec<Uuid>,
    pub milestones: Metadata,
    pub report_metadata: Metadata,
    pub total_requests: i32,
    pub open_requests: i32,
    pub total_findings: i32,
    pub open_findings: i32,
    pub tags: Vec<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record returned by audit creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditCreated {
    pub id: Uuid,
    pub title: String,
    pub audit_type: AuditType,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Audit> for AuditCreated {
    fn from(audit: &Audit) -> Self {
        Self {
            id: audit.id,
            title: audit.title.clone(),
            audit_type: audit.audit_type,
            status: audit.status,
            created_at: audit.created_at,
        }
    }
}

/// A PBC ("provided by client") item requested by the auditors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: AuditRequestStatus,
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

/// An evidence artifact submitted against an audit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvidenceLink {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub request_id: Uuid,
    pub artifact_id: Uuid,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub submission_notes: Option<String>,
    pub status: SubmissionStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: Option<String>,
    pub status: FindingStatus,
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
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditComment {
    pub id: Uuid,
    pub org_id: Uuid,
    pub audit_id: Uuid,
    pub target_type: CommentTarget,
    pub target_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Org-scoped blueprint for a recurring PBC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequestTemplate {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Option<String>,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub framework_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Inputs ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAudit {
    pub title: String,
    pub description: Option<String>,
    pub audit_type: AuditType,
    pub framework_id: Option<Uuid>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub audit_firm: Option<String>,
    pub lead_auditor: Option<String>,
    pub internal_lead_id: Option<Uuid>,
    #[serde(default)]
    pub auditor_ids: Vec<Uuid>,
    pub milestones: Option<Metadata>,
    pub report_metadata: Option<Metadata>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAudit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub framework_id: Option<Uuid>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub audit_firm: Option<String>,
    pub lead_auditor: Option<String>,
    pub internal_lead_id: Option<Uuid>,
    pub milestones: Option<Metadata>,
    pub report_metadata: Option<Metadata>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstantiateTemplates {
    pub template_ids: Vec<Uuid>,
    /// Reference prefix; defaults to `PBC`.
    pub prefix: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<Uuid>,
}

wire_enum! {
    pub enum ReviewDecision {
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitEvidence {
    pub artifact_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub status: SubmissionStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFinding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: Option<String>,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub remediation_owner_id: Option<Uuid>,
    pub remediation_due_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    pub recommendation: Option<String>,
    pub management_response: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFinding {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub category: Option<String>,
    pub remediation_owner_id: Option<Uuid>,
    pub remediation_due_date: Option<NaiveDate>,
    pub recommendation: Option<String>,
    pub management_response: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FindingTransition {
    pub to: FindingStatus,
    pub remediation_plan: Option<String>,
    pub remediation_due_date: Option<NaiveDate>,
    /// Verification notes, or the reason for reopening remediation.
    pub notes: Option<String>,
    /// Required for risk acceptance.
    pub reason: Option<String>,
}

impl FindingTransition {
    pub fn to(to: FindingStatus) -> Self {
        Self {
            to,
            remediation_plan: None,
            remediation_due_date: None,
            notes: None,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    /// Optional for replies, which inherit their parent's target.
    pub target_type: Option<CommentTarget>,
    pub target_id: Option<Uuid>,
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
    #[serde(default)]
    pub is_internal: bool,
}

// ── Queries ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub status: Option<AuditStatus>,
    pub audit_type: Option<AuditType>,
    pub framework_id: Option<Uuid>,
    pub q: Option<String>,
    /// Restricts to audits naming this auditor; forced for auditor principals.
    pub auditor_id: Option<Uuid>,
}

wire_enum! {
    pub enum AuditSortField {
        CreatedAt => "created_at",
        UpdatedAt => "updated_at",
        Title => "title",
        Status => "status",
        PlannedStart => "planned_start",
    }
}

impl AuditSortField {
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(|v| v.parse().ok()).unwrap_or(Self::CreatedAt)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuditSort {
    pub field: AuditSortField,
    pub direction: SortDirection,
}

impl Default for AuditSort {
    fn default() -> Self {
        Self {
            field: AuditSortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<AuditRequestStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindingFilter {
    pub status: Option<FindingStatus>,
    pub severity: Option<Severity>,
    pub remediation_owner_id: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFilter {
    pub target_type: Option<CommentTarget>,
    pub target_id: Option<Uuid>,
}

/// Store-level comment query; `include_internal` is decided by the engine.
#[derive(Debug, Clone)]
pub struct CommentQuery {
    pub filter: CommentFilter,
    pub include_internal: bool,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditCounters {
    pub total_requests: i32,
    pub open_requests: i32,
    pub total_findings: i32,
    pub open_findings: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditDashboard {
    pub by_status: Vec<(AuditStatus, u64)>,
    pub open_requests: i64,
    pub open_findings: i64,
}
