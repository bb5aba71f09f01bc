//! Policy value types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pagination::PageRequest;
use crate::principal::Role;
use crate::types::SortDirection;
use crate::wire_enum;

wire_enum! {
    pub enum PolicyStatus {
        Draft => "draft",
        InReview => "in_review",
        Approved => "approved",
        Published => "published",
        Archived => "archived",
    }
}

wire_enum! {
    pub enum PolicyCategory {
        InformationSecurity => "information_security",
        AccessControl => "access_control",
        DataProtection => "data_protection",
        Privacy => "privacy",
        IncidentResponse => "incident_response",
        BusinessContinuity => "business_continuity",
        ChangeManagement => "change_management",
        RiskManagement => "risk_management",
        VendorManagement => "vendor_management",
        AssetManagement => "asset_management",
        AcceptableUse => "acceptable_use",
        HrSecurity => "hr_security",
        PhysicalSecurity => "physical_security",
        Cryptography => "cryptography",
        NetworkSecurity => "network_security",
        SecureDevelopment => "secure_development",
        Compliance => "compliance",
        Other => "other",
    }
}

wire_enum! {
    pub enum ContentFormat {
        Html => "html",
        Markdown => "markdown",
    }
}

wire_enum! {
    pub enum ChangeType {
        Initial => "initial",
        Major => "major",
        Minor => "minor",
        Patch => "patch",
    }
}

wire_enum! {
    pub enum SignoffStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

wire_enum! {
    pub enum Coverage {
        Full => "full",
        Partial => "partial",
    }
}

wire_enum! {
    /// Derived on read from `next_review_at`.
    pub enum ReviewStatus {
        Overdue => "overdue",
        DueSoon => "due_soon",
        OnTrack => "on_track",
        NoSchedule => "no_schedule",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub org_id: Uuid,
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub category: PolicyCategory,
    pub status: PolicyStatus,
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

/// Immutable content snapshot. Editing content appends a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub version_number: i32,
    pub is_current: bool,
    pub content: String,
    pub content_format: ContentFormat,
    pub content_summary: Option<String>,
    pub change_summary: Option<String>,
    pub change_type: ChangeType,
    pub word_count: i32,
    pub character_count: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySignoff {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub policy_version_id: Uuid,
    pub signer_id: Uuid,
    pub signer_role: Role,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub status: SignoffStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub reminder_count: i32,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyControl {
    pub id: Uuid,
    pub org_id: Uuid,
    pub policy_id: Uuid,
    pub control_id: Uuid,
    pub coverage: Coverage,
    pub notes: Option<String>,
    pub linked_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Inputs ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePolicy {
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub category: PolicyCategory,
    /// Defaults to the caller.
    pub owner_id: Option<Uuid>,
    pub secondary_owner_id: Option<Uuid>,
    pub review_frequency_days: Option<i32>,
    #[serde(default)]
    pub is_template: bool,
    pub template_framework_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: String,
    pub content_format: ContentFormat,
    pub content_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePolicy {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<PolicyCategory>,
    pub owner_id: Option<Uuid>,
    pub secondary_owner_id: Option<Uuid>,
    pub review_frequency_days: Option<i32>,
    pub next_review_at: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePolicyVersion {
    pub content: String,
    pub content_format: ContentFormat,
    pub change_type: ChangeType,
    pub change_summary: Option<String>,
    pub content_summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitForReview {
    pub signers: Vec<Uuid>,
    pub due_date: Option<NaiveDate>,
    /// Carried into the audit-log entry for the submission.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloneTemplate {
    pub template_id: Uuid,
    pub identifier: String,
    pub title: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkControl {
    pub control_id: Uuid,
    #[serde(default = "default_coverage")]
    pub coverage: Coverage,
    pub notes: Option<String>,
}

fn default_coverage() -> Coverage {
    Coverage::Full
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Remind {
    /// Defaults to every pending sign-off of the policy.
    pub signoff_ids: Option<Vec<Uuid>>,
}

// ── Outputs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: Policy,
    pub current_version: Option<PolicyVersion>,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    #[serde(flatten)]
    pub policy: Policy,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderOutcome {
    pub reminded: Vec<Uuid>,
    pub rate_limited: Vec<Uuid>,
}

// ── Queries ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyFilter {
    pub status: Option<PolicyStatus>,
    pub category: Option<PolicyCategory>,
    pub owner_id: Option<Uuid>,
    pub is_template: Option<bool>,
    pub review_status: Option<ReviewStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free text over identifier, title and description.
    pub q: Option<String>,
    /// Free text that also covers tags and the current version's content.
    pub search: Option<String>,
}

wire_enum! {
    pub enum PolicySortField {
        CreatedAt => "created_at",
        UpdatedAt => "updated_at",
        Identifier => "identifier",
        Title => "title",
        Status => "status",
        NextReviewAt => "next_review_at",
    }
}

impl PolicySortField {
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(|v| v.parse().ok()).unwrap_or(Self::UpdatedAt)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicySort {
    pub field: PolicySortField,
    pub direction: SortDirection,
}

impl Default for PolicySort {
    fn default() -> Self {
        Self {
            field: PolicySortField::UpdatedAt,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyQuery {
    pub filter: PolicyFilter,
    pub sort: PolicySort,
    pub page: PageRequest,
    pub today: NaiveDate,
    pub due_soon_days: i64,
}
