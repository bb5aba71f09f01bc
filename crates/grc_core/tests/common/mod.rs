//! Shared harness: every port backed by `grc_core::memory`, a manual clock
//! parked at a fixed instant, and seeding helpers for the reference rows the
//! core reads but does not own.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use grc_core::audit::types::*;
use grc_core::clock::Clock;
use grc_core::config::CoreConfig;
use grc_core::directory::{ControlRecord, RequirementRecord, UserRecord};
use grc_core::evidence::types::*;
use grc_core::memory::{ManualClock, MemoryAuditLog, MemoryObjectStorage, MemoryStore};
use grc_core::policy::types::*;
use grc_core::{GrcCore, GrcError, Ports, Principal, Role};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn code<T: std::fmt::Debug>(result: Result<T, GrcError>) -> &'static str {
    result.expect_err("expected an error").code()
}

// ── Test Infrastructure ──────────────────────────────────────────

pub struct Harness {
    pub core: GrcCore,
    pub store: Arc<MemoryStore>,
    pub log: Arc<MemoryAuditLog>,
    pub storage: Arc<MemoryObjectStorage>,
    pub clock: Arc<ManualClock>,
    pub org: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(MemoryAuditLog::new());
        let storage = Arc::new(MemoryObjectStorage::new(&config));
        let clock = Arc::new(ManualClock::new(start()));
        let ports = Ports::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            log.clone(),
        )
        .with_storage(storage.clone())
        .with_clock(clock.clone());
        Self {
            core: GrcCore::new(ports, config),
            store,
            log,
            storage,
            clock,
            org: Uuid::new_v4(),
        }
    }

    /// Harness without an object-storage collaborator.
    pub fn without_storage() -> Self {
        let config = CoreConfig::default();
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(MemoryAuditLog::new());
        let clock = Arc::new(ManualClock::new(start()));
        let ports = Ports::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            log.clone(),
        )
        .with_clock(clock.clone());
        Self {
            storage: Arc::new(MemoryObjectStorage::new(&config)),
            core: GrcCore::new(ports, config),
            store,
            log,
            clock,
            org: Uuid::new_v4(),
        }
    }

    pub fn clock_today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Registers an active user in the org and returns their principal.
    pub async fn user(&self, role: Role) -> Principal {
        self.user_in(self.org, role).await
    }

    pub async fn user_in(&self, org_id: Uuid, role: Role) -> Principal {
        let id = Uuid::new_v4();
        self.store
            .add_user(UserRecord {
                id,
                org_id,
                email: format!("{id}@example.test"),
                display_name: None,
                role,
                is_active: true,
            })
            .await;
        Principal::new(id, org_id, role)
    }

    pub async fn control(&self, identifier: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .add_control(ControlRecord {
                id,
                org_id: self.org,
                identifier: identifier.to_string(),
                title: format!("{identifier} control"),
                category: Some("access_control".into()),
                is_active: true,
            })
            .await;
        id
    }

    pub async fn requirement(&self, identifier: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .add_requirement(
                self.org,
                RequirementRecord {
                    id,
                    framework_id: Uuid::new_v4(),
                    identifier: identifier.to_string(),
                    title: format!("{identifier} requirement"),
                },
            )
            .await;
        id
    }

    pub async fn template(&self, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .add_template(AuditRequestTemplate {
                id,
                org_id: self.org,
                title: title.to_string(),
                description: None,
                priority: Priority::High,
                category: None,
                control_id: None,
                requirement_id: None,
                framework_id: None,
                tags: vec![],
                created_at: start(),
                updated_at: start(),
            })
            .await;
        id
    }

    // ── Evidence ──────────────────────────────────────────────────

    pub async fn artifact(&self, p: &Principal, title: &str) -> EvidenceArtifact {
        self.core
            .evidence
            .create_artifact(p, new_artifact(title))
            .await
            .unwrap()
            .artifact
    }

    /// Uploads, confirms and submits an artifact for review.
    pub async fn pending_artifact(&self, p: &Principal, title: &str) -> EvidenceArtifact {
        let artifact = self.artifact(p, title).await;
        self.storage
            .put_object(&artifact.object_key, artifact.file_size as u64)
            .await;
        self.core
            .evidence
            .confirm_upload(p, artifact.id, ConfirmUpload::default())
            .await
            .unwrap();
        self.core
            .evidence
            .transition_status(p, artifact.id, EvidenceStatus::PendingReview, None)
            .await
            .unwrap()
    }

    // ── Policies ──────────────────────────────────────────────────

    pub async fn policy(&self, p: &Principal, identifier: &str) -> PolicyDetail {
        self.core
            .policies
            .create_policy(p, new_policy(identifier))
            .await
            .unwrap()
    }

    // ── Audits ────────────────────────────────────────────────────

    pub async fn audit(&self, p: &Principal, auditors: Vec<Uuid>) -> Audit {
        let created = self
            .core
            .audits
            .create_audit(p, new_audit("SOC 2 Type II", auditors))
            .await
            .unwrap();
        self.core.audits.get_audit(p, created.id).await.unwrap()
    }
}

pub fn new_artifact(title: &str) -> CreateArtifact {
    CreateArtifact {
        title: title.to_string(),
        description: Some("quarterly export".into()),
        evidence_type: EvidenceType::Screenshot,
        collection_method: CollectionMethod::ManualUpload,
        file_name: "access-review.png".into(),
        file_size: 2048,
        mime_type: "image/png".into(),
        collection_date: None,
        freshness_period_days: Some(90),
        source_system: Some("okta".into()),
        tags: vec!["q1".into()],
    }
}

pub fn new_version(file_name: &str) -> CreateVersion {
    CreateVersion {
        file_name: file_name.to_string(),
        file_size: 4096,
        mime_type: "application/pdf".into(),
        title: None,
        description: None,
        collection_date: None,
        freshness_period_days: None,
        source_system: None,
        tags: None,
    }
}

pub fn new_policy(identifier: &str) -> CreatePolicy {
    CreatePolicy {
        identifier: identifier.to_string(),
        title: format!("{identifier} policy"),
        description: None,
        category: PolicyCategory::InformationSecurity,
        owner_id: None,
        secondary_owner_id: None,
        review_frequency_days: Some(365),
        is_template: false,
        template_framework_id: None,
        tags: vec![],
        content: "<p>All access is reviewed quarterly.</p>".into(),
        content_format: ContentFormat::Html,
        content_summary: None,
    }
}

pub fn new_audit(title: &str, auditor_ids: Vec<Uuid>) -> CreateAudit {
    CreateAudit {
        title: title.to_string(),
        description: None,
        audit_type: AuditType::External,
        framework_id: None,
        period_start: Some(date(2025, 1, 1)),
        period_end: Some(date(2025, 12, 31)),
        planned_start: None,
        planned_end: None,
        audit_firm: Some("Example LLP".into()),
        lead_auditor: None,
        internal_lead_id: None,
        auditor_ids,
        milestones: None,
        report_metadata: None,
        tags: vec![],
    }
}

pub fn new_request(title: &str) -> CreateRequest {
    CreateRequest {
        title: title.to_string(),
        description: None,
        priority: None,
        control_id: None,
        requirement_id: None,
        assigned_to: None,
        due_date: None,
        reference_number: None,
        tags: vec![],
    }
}

pub fn new_finding(title: &str) -> CreateFinding {
    CreateFinding {
        title: title.to_string(),
        description: "terminated users retained access".into(),
        severity: Severity::High,
        category: None,
        control_id: None,
        requirement_id: None,
        remediation_owner_id: None,
        remediation_due_date: None,
        reference_number: None,
        recommendation: None,
        management_response: None,
        tags: vec![],
        metadata: None,
    }
}

pub fn comment(body: &str) -> CreateComment {
    CreateComment {
        target_type: None,
        target_id: None,
        body: body.to_string(),
        parent_comment_id: None,
        is_internal: false,
    }
}
