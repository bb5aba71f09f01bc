//! Evidence artifact value types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pagination::PageRequest;
use crate::types::SortDirection;
use crate::wire_enum;

wire_enum! {
    /// Persisted lifecycle status of one artifact version.
    pub enum EvidenceStatus {
        Draft => "draft",
        PendingReview => "pending_review",
        Approved => "approved",
        Rejected => "rejected",
        Superseded => "superseded",
        Expired => "expired",
    }
}

wire_enum! {
    pub enum EvidenceType {
        Screenshot => "screenshot",
        Document => "document",
        LogExport => "log_export",
        Configuration => "configuration",
        Report => "report",
        PolicyDocument => "policy_document",
        Certificate => "certificate",
        Attestation => "attestation",
        AutomatedTest => "automated_test",
        Other => "other",
    }
}

wire_enum! {
    pub enum CollectionMethod {
        ManualUpload => "manual_upload",
        AutomatedPull => "automated_pull",
        ApiIngestion => "api_ingestion",
        SystemExport => "system_export",
    }
}

wire_enum! {
    pub enum LinkTargetType {
        Control => "control",
        Requirement => "requirement",
    }
}

wire_enum! {
    pub enum LinkStrength {
        Primary => "primary",
        Supporting => "supporting",
        Supplementary => "supplementary",
    }
}

wire_enum! {
    pub enum Verdict {
        Sufficient => "sufficient",
        Partial => "partial",
        Insufficient => "insufficient",
        NeedsUpdate => "needs_update",
    }
}

wire_enum! {
    pub enum Confidence {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

wire_enum! {
    /// Derived on read from `expires_at`; never persisted.
    pub enum FreshnessStatus {
        Fresh => "fresh",
        ExpiringSoon => "expiring_soon",
        Expired => "expired",
    }
}

/// One version of an evidence artifact. Versions of the same document form a
/// chain rooted at the first version; every later version points at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: EvidenceType,
    pub status: EvidenceStatus,
    pub collection_method: CollectionMethod,
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

impl EvidenceArtifact {
    /// Id of the first version of this artifact's chain.
    pub fn root_id(&self) -> Uuid {
        self.parent_artifact_id.unwrap_or(self.id)
    }
}

/// Artifact ↔ control/requirement link. Exactly one of `control_id` and
/// `requirement_id` is set, matching `target_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub id: Uuid,
    pub org_id: Uuid,
    pub artifact_id: Uuid,
    pub target_type: LinkTargetType,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    pub strength: LinkStrength,
    pub notes: Option<String>,
    pub linked_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvidenceLink {
    pub fn target_id(&self) -> Uuid {
        match self.target_type {
            LinkTargetType::Control => self.control_id,
            LinkTargetType::Requirement => self.requirement_id,
        }
        .unwrap_or_default()
    }

    /// Same link re-pointed at another artifact version.
    pub fn copied_to(&self, artifact_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_id,
            created_at: at,
            updated_at: at,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEvaluation {
    pub id: Uuid,
    pub org_id: Uuid,
    pub artifact_id: Uuid,
    pub evidence_link_id: Option<Uuid>,
    pub verdict: Verdict,
    pub confidence: Confidence,
    pub comments: Option<String>,
    pub missing_elements: Vec<String>,
    pub remediation_notes: Option<String>,
    pub evaluated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Inputs ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArtifact {
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: EvidenceType,
    pub collection_method: CollectionMethod,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Defaults to today.
    pub collection_date: Option<NaiveDate>,
    pub freshness_period_days: Option<i32>,
    pub source_system: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// New version of an existing artifact. Omitted metadata is carried over
/// from the previous version.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersion {
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub collection_date: Option<NaiveDate>,
    pub freshness_period_days: Option<i32>,
    pub source_system: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArtifact {
    pub title: Option<String>,
    pub description: Option<String>,
    pub evidence_type: Option<EvidenceType>,
    pub collection_method: Option<CollectionMethod>,
    pub freshness_period_days: Option<i32>,
    pub source_system: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmUpload {
    pub checksum_sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkTarget {
    pub target_type: LinkTargetType,
    pub target_id: Uuid,
    pub strength: Option<LinkStrength>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvaluation {
    pub evidence_link_id: Option<Uuid>,
    pub verdict: Verdict,
    pub confidence: Confidence,
    pub comments: Option<String>,
    #[serde(default)]
    pub missing_elements: Vec<String>,
    pub remediation_notes: Option<String>,
}

// ── Outputs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreatedArtifact {
    pub artifact: EvidenceArtifact,
    /// Present when an object-storage collaborator is configured.
    pub upload: Option<crate::ports::PresignedUrl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactView {
    #[serde(flatten)]
    pub artifact: EvidenceArtifact,
    pub freshness_status: FreshnessStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactDetail {
    #[serde(flatten)]
    pub artifact: EvidenceArtifact,
    pub freshness_status: FreshnessStatus,
    pub links: Vec<EvidenceLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub evaluation: EvidenceEvaluation,
    /// Set when the evaluation moved the artifact out of `pending_review`.
    pub status_changed_to: Option<EvidenceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessSummary {
    pub fresh: u64,
    pub expiring_soon: u64,
    pub expired: u64,
    pub no_expiry: u64,
}

// ── Queries ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceFilter {
    pub status: Option<EvidenceStatus>,
    pub evidence_type: Option<EvidenceType>,
    pub collection_method: Option<CollectionMethod>,
    pub uploaded_by: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub requirement_id: Option<Uuid>,
    /// Matches artifacts sharing at least one tag.
    #[serde(default)]
    pub tags: Vec<String>,
    pub freshness: Option<FreshnessStatus>,
    /// Free text over title and description.
    pub q: Option<String>,
    /// Free text over title, description, source system and tags.
    pub search: Option<String>,
    #[serde(default)]
    pub include_history: bool,
}

wire_enum! {
    pub enum EvidenceSortField {
        CreatedAt => "created_at",
        UpdatedAt => "updated_at",
        Title => "title",
        CollectionDate => "collection_date",
        ExpiresAt => "expires_at",
        Status => "status",
    }
}

impl EvidenceSortField {
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(|v| v.parse().ok()).unwrap_or(Self::CreatedAt)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceSort {
    pub field: EvidenceSortField,
    pub direction: SortDirection,
}

impl Default for EvidenceSortField {
    fn default() -> Self {
        Self::CreatedAt
    }
}

/// Store-level list query; the window is already resolved against `now`.
#[derive(Debug, Clone)]
pub struct EvidenceQuery {
    pub filter: EvidenceFilter,
    pub sort: EvidenceSort,
    pub page: PageRequest,
    pub now: DateTime<Utc>,
    pub expiring_soon_days: i64,
}
