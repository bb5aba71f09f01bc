//! In-process adapters for every port. Backed by plain vectors behind a
//! tokio `RwLock`, so insertion order is the tie-breaker for equal sort keys.
//!
//! Used by the test suites and by local tooling that has no database.

mod audit;
mod evidence;
mod policy;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::types::*;
use crate::audit_log::{AuditAction, AuditLogEntry};
use crate::config::CoreConfig;
use crate::directory::{ControlRecord, RequirementRecord, UserRecord};
use crate::error::{GrcError, Result};
use crate::evidence::types::*;
use crate::policy::types::*;
use crate::ports::{AuditLogSink, DirectoryStore, ObjectStorage, PresignedUrl, StorageError};
use crate::types::SortDirection;

pub use crate::clock::ManualClock;

#[derive(Debug, Default)]
pub(crate) struct State {
    // directory
    pub users: Vec<UserRecord>,
    pub controls: Vec<ControlRecord>,
    pub requirements: Vec<RequirementRecord>,
    /// (org_id, framework_id) adoptions.
    pub frameworks: Vec<(Uuid, Uuid)>,
    // evidence
    pub artifacts: Vec<EvidenceArtifact>,
    pub links: Vec<EvidenceLink>,
    pub evaluations: Vec<EvidenceEvaluation>,
    // policies
    pub policies: Vec<Policy>,
    pub versions: Vec<PolicyVersion>,
    pub signoffs: Vec<PolicySignoff>,
    pub policy_controls: Vec<PolicyControl>,
    // audits
    pub audits: Vec<Audit>,
    pub requests: Vec<AuditRequest>,
    pub submissions: Vec<AuditEvidenceLink>,
    pub findings: Vec<AuditFinding>,
    pub comments: Vec<AuditComment>,
    pub templates: Vec<AuditRequestTemplate>,
}

/// Relational store stand-in implementing every store port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ───────────────────────────────────────────────

    pub async fn add_user(&self, user: UserRecord) {
        self.state.write().await.users.push(user);
    }

    pub async fn add_control(&self, control: ControlRecord) {
        self.state.write().await.controls.push(control);
    }

    /// Adopts the framework for the org and registers the requirement.
    pub async fn add_requirement(&self, org_id: Uuid, requirement: RequirementRecord) {
        let mut state = self.state.write().await;
        if !state.frameworks.contains(&(org_id, requirement.framework_id)) {
            state.frameworks.push((org_id, requirement.framework_id));
        }
        state.requirements.push(requirement);
    }

    pub async fn add_framework(&self, org_id: Uuid, framework_id: Uuid) {
        self.state.write().await.frameworks.push((org_id, framework_id));
    }

    pub async fn add_template(&self, template: AuditRequestTemplate) {
        self.state.write().await.templates.push(template);
    }
}

/// Rows that must already exist for an update to succeed.
pub(crate) fn replace_row<T>(rows: &mut [T], matches: impl Fn(&T) -> bool, row: T, what: &str) -> Result<()> {
    match rows.iter_mut().find(|r| matches(r)) {
        Some(slot) => {
            *slot = row;
            Ok(())
        }
        None => Err(GrcError::NotFound(what.to_string())),
    }
}

pub(crate) fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

pub(crate) fn any_tag(tags: &[String], wanted: &[String]) -> bool {
    wanted.is_empty() || tags.iter().any(|t| wanted.contains(t))
}

pub(crate) fn directed(ordering: std::cmp::Ordering, direction: SortDirection) -> std::cmp::Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

// ── Directory ─────────────────────────────────────────────────

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn get_user(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRecord>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.org_id == org_id && u.id == user_id)
            .cloned())
    }

    async fn get_control(&self, org_id: Uuid, control_id: Uuid) -> Result<Option<ControlRecord>> {
        let state = self.state.read().await;
        Ok(state
            .controls
            .iter()
            .find(|c| c.org_id == org_id && c.id == control_id)
            .cloned())
    }

    async fn list_active_controls(&self, org_id: Uuid) -> Result<Vec<ControlRecord>> {
        let state = self.state.read().await;
        Ok(state
            .controls
            .iter()
            .filter(|c| c.org_id == org_id && c.is_active)
            .cloned()
            .collect())
    }

    async fn get_requirement(
        &self,
        org_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<RequirementRecord>> {
        let state = self.state.read().await;
        Ok(state
            .requirements
            .iter()
            .find(|r| r.id == requirement_id && state.frameworks.contains(&(org_id, r.framework_id)))
            .cloned())
    }

    async fn framework_exists(&self, org_id: Uuid, framework_id: Uuid) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .frameworks
            .contains(&(org_id, framework_id)))
    }
}

// ── Audit log ─────────────────────────────────────────────────

/// Collects entries for assertions. Can be switched into a failing mode to
/// exercise the fire-and-forget contract.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
    failing: Mutex<bool>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries().into_iter().map(|e| e.action).collect()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }
}

#[async_trait]
impl AuditLogSink for MemoryAuditLog {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(GrcError::ServiceUnavailable("audit log offline".into()));
        }
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

// ── Object storage ────────────────────────────────────────────

/// Presigns `memory://` URLs and tracks uploaded object sizes.
#[derive(Debug)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, u64>>,
    upload_ttl_secs: u64,
    download_ttl_secs: u64,
}

impl MemoryObjectStorage {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            upload_ttl_secs: config.upload_url_ttl_secs,
            download_ttl_secs: config.download_url_ttl_secs,
        }
    }

    /// Simulates the client completing a presigned upload.
    pub async fn put_object(&self, key: &str, size: u64) {
        self.objects.write().await.insert(key.to_string(), size);
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn generate_upload_url(
        &self,
        key: &str,
        mime_type: &str,
    ) -> std::result::Result<PresignedUrl, StorageError> {
        Ok(PresignedUrl {
            url: format!("memory://upload/{key}?content-type={mime_type}"),
            ttl_seconds: self.upload_ttl_secs,
        })
    }

    async fn generate_download_url(
        &self,
        key: &str,
        file_name: &str,
    ) -> std::result::Result<PresignedUrl, StorageError> {
        Ok(PresignedUrl {
            url: format!("memory://download/{key}?filename={file_name}"),
            ttl_seconds: self.download_ttl_secs,
        })
    }

    async fn verify_object_exists(&self, key: &str) -> std::result::Result<Option<u64>, StorageError> {
        Ok(self.objects.read().await.get(key).copied())
    }
}
