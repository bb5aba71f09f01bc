use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{GrcError, Result};
use crate::evidence::freshness;
use crate::evidence::types::*;
use crate::pagination::PageRequest;
use crate::ports::EvidenceStore;

use super::{any_tag, contains_ci, directed, replace_row, MemoryStore, State};

fn matches(state: &State, a: &EvidenceArtifact, query: &EvidenceQuery) -> bool {
    let f = &query.filter;
    if !f.include_history && !a.is_current {
        return false;
    }
    if f.status.is_some_and(|s| s != a.status)
        || f.evidence_type.is_some_and(|t| t != a.evidence_type)
        || f.collection_method.is_some_and(|m| m != a.collection_method)
        || f.uploaded_by.is_some_and(|u| u != a.uploaded_by)
    {
        return false;
    }
    let linked_to = |pred: &dyn Fn(&EvidenceLink) -> bool| {
        state
            .links
            .iter()
            .any(|l| l.org_id == a.org_id && l.artifact_id == a.id && pred(l))
    };
    if let Some(control_id) = f.control_id {
        if !linked_to(&|l| l.control_id == Some(control_id)) {
            return false;
        }
    }
    if let Some(requirement_id) = f.requirement_id {
        if !linked_to(&|l| l.requirement_id == Some(requirement_id)) {
            return false;
        }
    }
    if !any_tag(&a.tags, &f.tags) {
        return false;
    }
    if let Some(wanted) = f.freshness {
        if freshness::classify(a.expires_at, query.now, query.expiring_soon_days) != wanted {
            return false;
        }
    }
    if let Some(q) = f.q.as_deref().map(str::to_lowercase) {
        let hit = contains_ci(&a.title, &q)
            || a.description.as_deref().is_some_and(|d| contains_ci(d, &q));
        if !hit {
            return false;
        }
    }
    if let Some(q) = f.search.as_deref().map(str::to_lowercase) {
        let hit = contains_ci(&a.title, &q)
            || a.description.as_deref().is_some_and(|d| contains_ci(d, &q))
            || a.source_system.as_deref().is_some_and(|s| contains_ci(s, &q))
            || a.tags.iter().any(|t| contains_ci(t, &q));
        if !hit {
            return false;
        }
    }
    true
}

fn compare(a: &EvidenceArtifact, b: &EvidenceArtifact, field: EvidenceSortField) -> Ordering {
    match field {
        EvidenceSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        EvidenceSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        EvidenceSortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        EvidenceSortField::CollectionDate => a.collection_date.cmp(&b.collection_date),
        EvidenceSortField::ExpiresAt => a.expires_at.cmp(&b.expires_at),
        EvidenceSortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn insert_artifact(&self, artifact: &EvidenceArtifact) -> Result<()> {
        self.state.write().await.artifacts.push(artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, org_id: Uuid, id: Uuid) -> Result<Option<EvidenceArtifact>> {
        let state = self.state.read().await;
        Ok(state
            .artifacts
            .iter()
            .find(|a| a.org_id == org_id && a.id == id)
            .cloned())
    }

    async fn update_artifact(&self, artifact: &EvidenceArtifact) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.artifacts,
            |a| a.org_id == artifact.org_id && a.id == artifact.id,
            artifact.clone(),
            "evidence artifact",
        )
    }

    async fn list_artifacts(
        &self,
        org_id: Uuid,
        query: &EvidenceQuery,
    ) -> Result<(Vec<EvidenceArtifact>, u64)> {
        let state = self.state.read().await;
        let mut rows: Vec<EvidenceArtifact> = state
            .artifacts
            .iter()
            .filter(|a| a.org_id == org_id && matches(&state, a, query))
            .cloned()
            .collect();
        rows.sort_by(|a, b| directed(compare(a, b, query.sort.field), query.sort.direction));
        let total = rows.len() as u64;
        Ok((query.page.slice(&rows), total))
    }

    async fn list_chain(&self, org_id: Uuid, root_id: Uuid) -> Result<Vec<EvidenceArtifact>> {
        let state = self.state.read().await;
        let mut chain: Vec<EvidenceArtifact> = state
            .artifacts
            .iter()
            .filter(|a| a.org_id == org_id && a.root_id() == root_id)
            .cloned()
            .collect();
        chain.sort_by_key(|a| a.version);
        Ok(chain)
    }

    async fn create_version(
        &self,
        superseded: Option<&EvidenceArtifact>,
        next: &EvidenceArtifact,
        copy_links_from: Option<Uuid>,
    ) -> Result<Vec<EvidenceLink>> {
        let mut state = self.state.write().await;
        if let Some(prev) = superseded {
            let slot = state
                .artifacts
                .iter_mut()
                .find(|a| a.org_id == prev.org_id && a.id == prev.id)
                .ok_or_else(|| GrcError::NotFound(format!("evidence artifact {}", prev.id)))?;
            if !slot.is_current {
                return Err(GrcError::Conflict(format!(
                    "artifact {} was superseded concurrently",
                    prev.id
                )));
            }
            *slot = prev.clone();
        }
        if state
            .artifacts
            .iter()
            .any(|a| a.root_id() == next.root_id() && a.version == next.version)
        {
            return Err(GrcError::Conflict(format!(
                "version {} already exists",
                next.version
            )));
        }
        state.artifacts.push(next.clone());

        let copies: Vec<EvidenceLink> = match copy_links_from {
            Some(source) => state
                .links
                .iter()
                .filter(|l| l.org_id == next.org_id && l.artifact_id == source)
                .map(|l| l.copied_to(next.id, next.created_at))
                .collect(),
            None => Vec::new(),
        };
        state.links.extend(copies.iter().cloned());
        Ok(copies)
    }

    async fn insert_link(&self, link: &EvidenceLink) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .links
            .iter()
            .any(|l| l.artifact_id == link.artifact_id && l.target_id() == link.target_id())
        {
            return Err(GrcError::Conflict(format!(
                "artifact already linked to {} {}",
                link.target_type,
                link.target_id()
            )));
        }
        state.links.push(link.clone());
        Ok(())
    }

    async fn get_link(&self, org_id: Uuid, link_id: Uuid) -> Result<Option<EvidenceLink>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .find(|l| l.org_id == org_id && l.id == link_id)
            .cloned())
    }

    async fn list_links(&self, org_id: Uuid, artifact_id: Uuid) -> Result<Vec<EvidenceLink>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|l| l.org_id == org_id && l.artifact_id == artifact_id)
            .cloned()
            .collect())
    }

    async fn delete_link(&self, org_id: Uuid, link_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state.links.retain(|l| !(l.org_id == org_id && l.id == link_id));
        Ok(state.links.len() < before)
    }

    async fn insert_evaluation(&self, evaluation: &EvidenceEvaluation) -> Result<()> {
        self.state.write().await.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn list_evaluations(
        &self,
        org_id: Uuid,
        artifact_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<EvidenceEvaluation>, u64)> {
        let state = self.state.read().await;
        // newest first
        let rows: Vec<EvidenceEvaluation> = state
            .evaluations
            .iter()
            .rev()
            .filter(|e| e.org_id == org_id && e.artifact_id == artifact_id)
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((page.slice(&rows), total))
    }

    async fn freshness_summary(
        &self,
        org_id: Uuid,
        now: DateTime<Utc>,
        expiring_soon_days: i64,
    ) -> Result<FreshnessSummary> {
        let state = self.state.read().await;
        let mut summary = FreshnessSummary::default();
        for artifact in state
            .artifacts
            .iter()
            .filter(|a| a.org_id == org_id && a.is_current)
        {
            match artifact.expires_at {
                None => summary.no_expiry += 1,
                Some(_) => match freshness::classify(artifact.expires_at, now, expiring_soon_days) {
                    FreshnessStatus::Fresh => summary.fresh += 1,
                    FreshnessStatus::ExpiringSoon => summary.expiring_soon += 1,
                    FreshnessStatus::Expired => summary.expired += 1,
                },
            }
        }
        Ok(summary)
    }
}
