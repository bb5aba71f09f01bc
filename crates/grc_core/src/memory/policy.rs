use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{GrcError, Result};
use crate::policy::review;
use crate::policy::types::*;
use crate::ports::{CoverageLink, PolicyStore};

use super::{any_tag, contains_ci, directed, replace_row, MemoryStore, State};

fn matches(state: &State, p: &Policy, query: &PolicyQuery) -> bool {
    let f = &query.filter;
    if f.status.is_some_and(|s| s != p.status)
        || f.category.is_some_and(|c| c != p.category)
        || f.owner_id.is_some_and(|o| o != p.owner_id && Some(o) != p.secondary_owner_id)
        || f.is_template.is_some_and(|t| t != p.is_template)
    {
        return false;
    }
    if let Some(wanted) = f.review_status {
        if review::review_status(p.next_review_at, query.today, query.due_soon_days) != wanted {
            return false;
        }
    }
    if !any_tag(&p.tags, &f.tags) {
        return false;
    }
    let text_hit = |q: &str| {
        contains_ci(&p.identifier, q)
            || contains_ci(&p.title, q)
            || p.description.as_deref().is_some_and(|d| contains_ci(d, q))
    };
    if let Some(q) = f.q.as_deref().map(str::to_lowercase) {
        if !text_hit(&q) {
            return false;
        }
    }
    if let Some(q) = f.search.as_deref().map(str::to_lowercase) {
        let in_content = state
            .versions
            .iter()
            .any(|v| Some(v.id) == p.current_version_id && contains_ci(&v.content, &q));
        if !(text_hit(&q) || p.tags.iter().any(|t| contains_ci(t, &q)) || in_content) {
            return false;
        }
    }
    true
}

fn compare(a: &Policy, b: &Policy, field: PolicySortField) -> Ordering {
    match field {
        PolicySortField::CreatedAt => a.created_at.cmp(&b.created_at),
        PolicySortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        PolicySortField::Identifier => a.identifier.cmp(&b.identifier),
        PolicySortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        PolicySortField::Status => a.status.as_str().cmp(b.status.as_str()),
        PolicySortField::NextReviewAt => a.next_review_at.cmp(&b.next_review_at),
    }
}

/// Withdraws the policy's pending sign-offs; returns how many.
fn withdraw_pending(state: &mut State, org_id: Uuid, policy_id: Uuid, at: DateTime<Utc>) -> u64 {
    let mut withdrawn = 0;
    for signoff in state
        .signoffs
        .iter_mut()
        .filter(|s| s.org_id == org_id && s.policy_id == policy_id && s.status == SignoffStatus::Pending)
    {
        signoff.status = SignoffStatus::Withdrawn;
        signoff.decided_at = Some(at);
        signoff.updated_at = at;
        withdrawn += 1;
    }
    withdrawn
}

fn write_policy(state: &mut State, policy: &Policy) -> Result<()> {
    replace_row(
        &mut state.policies,
        |p| p.org_id == policy.org_id && p.id == policy.id,
        policy.clone(),
        "policy",
    )
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn create_policy(&self, policy: &Policy, version: &PolicyVersion) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .policies
            .iter()
            .any(|p| p.org_id == policy.org_id && p.identifier == policy.identifier)
        {
            return Err(GrcError::Conflict(format!(
                "policy identifier '{}' exists",
                policy.identifier
            )));
        }
        state.policies.push(policy.clone());
        state.versions.push(version.clone());
        Ok(())
    }

    async fn get_policy(&self, org_id: Uuid, id: Uuid) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.org_id == org_id && p.id == id)
            .cloned())
    }

    async fn find_by_identifier(&self, org_id: Uuid, identifier: &str) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.org_id == org_id && p.identifier == identifier)
            .cloned())
    }

    async fn update_policy(&self, policy: &Policy) -> Result<()> {
        let mut state = self.state.write().await;
        write_policy(&mut state, policy)
    }

    async fn list_policies(&self, org_id: Uuid, query: &PolicyQuery) -> Result<(Vec<Policy>, u64)> {
        let state = self.state.read().await;
        let mut rows: Vec<Policy> = state
            .policies
            .iter()
            .filter(|p| p.org_id == org_id && matches(&state, p, query))
            .cloned()
            .collect();
        rows.sort_by(|a, b| directed(compare(a, b, query.sort.field), query.sort.direction));
        let total = rows.len() as u64;
        Ok((query.page.slice(&rows), total))
    }

    async fn get_version(&self, org_id: Uuid, version_id: Uuid) -> Result<Option<PolicyVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.org_id == org_id && v.id == version_id)
            .cloned())
    }

    async fn get_version_by_number(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
        version_number: i32,
    ) -> Result<Option<PolicyVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.org_id == org_id && v.policy_id == policy_id && v.version_number == version_number)
            .cloned())
    }

    async fn list_versions(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicyVersion>> {
        let state = self.state.read().await;
        let mut versions: Vec<PolicyVersion> = state
            .versions
            .iter()
            .filter(|v| v.org_id == org_id && v.policy_id == policy_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| std::cmp::Reverse(v.version_number));
        Ok(versions)
    }

    async fn create_version(
        &self,
        policy: &Policy,
        version: &PolicyVersion,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        if state
            .versions
            .iter()
            .any(|v| v.policy_id == policy.id && v.version_number == version.version_number)
        {
            return Err(GrcError::Conflict(format!(
                "version {} already exists",
                version.version_number
            )));
        }
        for v in state
            .versions
            .iter_mut()
            .filter(|v| v.org_id == policy.org_id && v.policy_id == policy.id)
        {
            v.is_current = false;
        }
        state.versions.push(version.clone());
        write_policy(&mut state, policy)?;
        Ok(withdraw_pending(&mut state, policy.org_id, policy.id, withdrawn_at))
    }

    async fn submit_for_review(&self, policy: &Policy, signoffs: &[PolicySignoff]) -> Result<()> {
        let mut state = self.state.write().await;
        write_policy(&mut state, policy)?;
        state.signoffs.extend(signoffs.iter().cloned());
        Ok(())
    }

    async fn get_signoff(&self, org_id: Uuid, signoff_id: Uuid) -> Result<Option<PolicySignoff>> {
        let state = self.state.read().await;
        Ok(state
            .signoffs
            .iter()
            .find(|s| s.org_id == org_id && s.id == signoff_id)
            .cloned())
    }

    async fn list_signoffs(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicySignoff>> {
        let state = self.state.read().await;
        Ok(state
            .signoffs
            .iter()
            .filter(|s| s.org_id == org_id && s.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn list_pending_for_signer(&self, org_id: Uuid, signer_id: Uuid) -> Result<Vec<PolicySignoff>> {
        let state = self.state.read().await;
        Ok(state
            .signoffs
            .iter()
            .filter(|s| {
                s.org_id == org_id && s.signer_id == signer_id && s.status == SignoffStatus::Pending
            })
            .cloned()
            .collect())
    }

    async fn update_signoff(&self, signoff: &PolicySignoff) -> Result<()> {
        let mut state = self.state.write().await;
        replace_row(
            &mut state.signoffs,
            |s| s.org_id == signoff.org_id && s.id == signoff.id,
            signoff.clone(),
            "sign-off",
        )
    }

    async fn count_pending_signoffs(&self, org_id: Uuid, version_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .signoffs
            .iter()
            .filter(|s| {
                s.org_id == org_id
                    && s.policy_version_id == version_id
                    && s.status == SignoffStatus::Pending
            })
            .count() as u64)
    }

    async fn archive_policy(&self, policy: &Policy, at: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        write_policy(&mut state, policy)?;
        Ok(withdraw_pending(&mut state, policy.org_id, policy.id, at))
    }

    async fn insert_control_link(&self, link: &PolicyControl) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .policy_controls
            .iter()
            .any(|l| l.policy_id == link.policy_id && l.control_id == link.control_id)
        {
            return Err(GrcError::Conflict(format!(
                "control {} is already linked",
                link.control_id
            )));
        }
        state.policy_controls.push(link.clone());
        Ok(())
    }

    async fn list_control_links(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicyControl>> {
        let state = self.state.read().await;
        Ok(state
            .policy_controls
            .iter()
            .filter(|l| l.org_id == org_id && l.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn delete_control_link(&self, org_id: Uuid, policy_id: Uuid, control_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.policy_controls.len();
        state.policy_controls.retain(|l| {
            !(l.org_id == org_id && l.policy_id == policy_id && l.control_id == control_id)
        });
        Ok(state.policy_controls.len() < before)
    }

    async fn list_coverage_links(&self, org_id: Uuid) -> Result<Vec<CoverageLink>> {
        let state = self.state.read().await;
        Ok(state
            .policy_controls
            .iter()
            .filter(|l| l.org_id == org_id)
            .filter_map(|l| {
                let policy = state
                    .policies
                    .iter()
                    .find(|p| p.org_id == org_id && p.id == l.policy_id)?;
                (policy.status != PolicyStatus::Archived).then(|| CoverageLink {
                    policy_id: policy.id,
                    policy_identifier: policy.identifier.clone(),
                    policy_title: policy.title.clone(),
                    policy_status: policy.status,
                    control_id: l.control_id,
                    coverage: l.coverage,
                })
            })
            .collect())
    }
}
