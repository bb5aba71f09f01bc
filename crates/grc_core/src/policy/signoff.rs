//! Sign-off workflow: submission for review, signer decisions, withdrawal
//! and rate-limited reminders.

use std::collections::HashSet;

use chrono::Duration;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::config::MAX_SIGNERS;
use crate::content::{self, NOTES_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::principal::{Principal, POLICY_PUBLISH_ROLES};
use crate::state_machine::StateMachine;

use super::service::PolicyService;
use super::types::*;

impl PolicyService {
    async fn load_signoff(
        &self,
        principal: &Principal,
        policy: &Policy,
        signoff_id: Uuid,
    ) -> Result<PolicySignoff> {
        let signoff = self
            .store
            .get_signoff(principal.org_id, signoff_id)
            .await?
            .filter(|s| s.policy_id == policy.id)
            .ok_or_else(|| GrcError::NotFound(format!("sign-off {signoff_id}")))?;
        principal.ensure_same_org(signoff.org_id, "sign-off")?;
        Ok(signoff)
    }

    fn ensure_pending(signoff: &PolicySignoff) -> Result<()> {
        if signoff.status != SignoffStatus::Pending {
            return Err(GrcError::Conflict(format!(
                "sign-off {} is already {}",
                signoff.id, signoff.status
            )));
        }
        Ok(())
    }

    /// Opens a review round on the current version with one pending
    /// sign-off per distinct signer.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, policy_id = %id))]
    pub async fn submit_for_review(
        &self,
        principal: &Principal,
        id: Uuid,
        input: SubmitForReview,
    ) -> Result<Vec<PolicySignoff>> {
        let mut policy = self.load(principal, id).await?;
        Self::require_editor(principal, &policy, "submit policies for review")?;
        Self::ensure_not_archived(&policy)?;
        let from = policy.status;
        if !matches!(from, PolicyStatus::Draft | PolicyStatus::Approved) {
            return Err(GrcError::InvalidTransition {
                entity: "policy",
                from: from.as_str().to_string(),
                to: PolicyStatus::InReview.as_str().to_string(),
            });
        }
        PolicyStatus::validate(from, PolicyStatus::InReview)?;

        let mut seen = HashSet::new();
        let signers: Vec<Uuid> = input
            .signers
            .iter()
            .copied()
            .filter(|s| seen.insert(*s))
            .collect();
        if signers.is_empty() || signers.len() > MAX_SIGNERS {
            return Err(GrcError::validation(format!(
                "between 1 and {MAX_SIGNERS} distinct signers are required"
            )));
        }
        if let Some(due) = input.due_date {
            if due < self.clock.today() {
                return Err(GrcError::validation("due_date may not be in the past"));
            }
        }
        let message = content::optional_text("message", input.message.as_deref(), NOTES_MAX_CHARS)?;
        let version_id = policy
            .current_version_id
            .ok_or_else(|| GrcError::Conflict(format!("policy {id} has no current version")))?;

        let now = self.clock.now();
        let mut signoffs = Vec::with_capacity(signers.len());
        for signer_id in signers {
            let user = match self.directory.get_user(principal.org_id, signer_id).await? {
                Some(u) if u.is_active && u.org_id == principal.org_id => u,
                _ => {
                    return Err(GrcError::validation(format!(
                        "signer {signer_id} is not an active user of this organization"
                    )))
                }
            };
            signoffs.push(PolicySignoff {
                id: Uuid::new_v4(),
                org_id: principal.org_id,
                policy_id: policy.id,
                policy_version_id: version_id,
                signer_id,
                signer_role: user.role,
                requested_by: principal.user_id,
                requested_at: now,
                due_date: input.due_date,
                status: SignoffStatus::Pending,
                decided_at: None,
                comments: None,
                reminder_count: 0,
                reminder_sent_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        policy.status = PolicyStatus::InReview;
        policy.updated_at = now;
        self.store.submit_for_review(&policy, &signoffs).await?;

        self.log
            .emit(
                principal,
                AuditAction::PolicySubmittedForReview,
                ResourceType::Policy,
                policy.id,
                json!({
                    "from": from,
                    "version_id": version_id,
                    "signers": signoffs.iter().map(|s| s.signer_id).collect::<Vec<_>>(),
                    "due_date": input.due_date,
                    "message": message,
                }),
            )
            .await;
        info!(signers = signoffs.len(), "policy submitted for review");
        Ok(signoffs)
    }

    /// Signer approves. The last pending approval on the current version
    /// moves an in-review policy to `approved`.
    #[instrument(skip(self, principal, comments), fields(org_id = %principal.org_id))]
    pub async fn approve_signoff(
        &self,
        principal: &Principal,
        policy_id: Uuid,
        signoff_id: Uuid,
        comments: Option<String>,
    ) -> Result<PolicySignoff> {
        let mut policy = self.load(principal, policy_id).await?;
        Self::ensure_not_archived(&policy)?;
        let mut signoff = self.load_signoff(principal, &policy, signoff_id).await?;
        if signoff.signer_id != principal.user_id {
            return Err(GrcError::NotSigner);
        }
        Self::ensure_pending(&signoff)?;

        let now = self.clock.now();
        signoff.status = SignoffStatus::Approved;
        signoff.decided_at = Some(now);
        signoff.comments = content::optional_text("comments", comments.as_deref(), NOTES_MAX_CHARS)?;
        signoff.updated_at = now;
        self.store.update_signoff(&signoff).await?;

        self.log
            .emit(
                principal,
                AuditAction::SignoffApproved,
                ResourceType::PolicySignoff,
                signoff.id,
                json!({ "policy_id": policy.id, "version_id": signoff.policy_version_id }),
            )
            .await;

        let remaining = self
            .store
            .count_pending_signoffs(principal.org_id, signoff.policy_version_id)
            .await?;
        let on_current = policy.current_version_id == Some(signoff.policy_version_id);
        if remaining == 0 && on_current && policy.status == PolicyStatus::InReview {
            PolicyStatus::validate(policy.status, PolicyStatus::Approved)?;
            let version = self
                .store
                .get_version(principal.org_id, signoff.policy_version_id)
                .await?
                .ok_or_else(|| {
                    GrcError::NotFound(format!("policy version {}", signoff.policy_version_id))
                })?;
            policy.status = PolicyStatus::Approved;
            policy.approved_at = Some(now);
            policy.approved_version = Some(version.version_number);
            policy.updated_at = now;
            self.store.update_policy(&policy).await?;
            self.log
                .emit(
                    principal,
                    AuditAction::PolicyApproved,
                    ResourceType::Policy,
                    policy.id,
                    json!({ "approved_version": version.version_number }),
                )
                .await;
            info!(policy_id = %policy.id, version = version.version_number, "policy approved");
        }
        Ok(signoff)
    }

    /// Signer rejects with comments; the policy stays in review.
    pub async fn reject_signoff(
        &self,
        principal: &Principal,
        policy_id: Uuid,
        signoff_id: Uuid,
        comments: Option<String>,
    ) -> Result<PolicySignoff> {
        let policy = self.load(principal, policy_id).await?;
        Self::ensure_not_archived(&policy)?;
        let mut signoff = self.load_signoff(principal, &policy, signoff_id).await?;
        if signoff.signer_id != principal.user_id {
            return Err(GrcError::NotSigner);
        }
        Self::ensure_pending(&signoff)?;
        let comments = match comments.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => content::require_text("comments", c, NOTES_MAX_CHARS)?,
            _ => return Err(GrcError::RejectionRequiresComments),
        };

        let now = self.clock.now();
        signoff.status = SignoffStatus::Rejected;
        signoff.decided_at = Some(now);
        signoff.comments = Some(comments);
        signoff.updated_at = now;
        self.store.update_signoff(&signoff).await?;

        self.log
            .emit(
                principal,
                AuditAction::SignoffRejected,
                ResourceType::PolicySignoff,
                signoff.id,
                json!({ "policy_id": policy.id, "version_id": signoff.policy_version_id }),
            )
            .await;
        Ok(signoff)
    }

    pub async fn withdraw_signoff(
        &self,
        principal: &Principal,
        policy_id: Uuid,
        signoff_id: Uuid,
        comments: Option<String>,
    ) -> Result<PolicySignoff> {
        let policy = self.load(principal, policy_id).await?;
        let mut signoff = self.load_signoff(principal, &policy, signoff_id).await?;
        principal.require_self_or_any(
            signoff.requested_by,
            POLICY_PUBLISH_ROLES,
            "withdraw sign-offs requested by others",
        )?;
        Self::ensure_pending(&signoff)?;

        let now = self.clock.now();
        signoff.status = SignoffStatus::Withdrawn;
        signoff.decided_at = Some(now);
        signoff.comments = content::optional_text("comments", comments.as_deref(), NOTES_MAX_CHARS)?;
        signoff.updated_at = now;
        self.store.update_signoff(&signoff).await?;

        self.log
            .emit(
                principal,
                AuditAction::SignoffWithdrawn,
                ResourceType::PolicySignoff,
                signoff.id,
                json!({ "policy_id": policy.id }),
            )
            .await;
        Ok(signoff)
    }

    pub async fn list_signoffs(&self, principal: &Principal, policy_id: Uuid) -> Result<Vec<PolicySignoff>> {
        let policy = self.load(principal, policy_id).await?;
        self.store.list_signoffs(principal.org_id, policy.id).await
    }

    pub async fn my_pending_signoffs(&self, principal: &Principal) -> Result<Vec<PolicySignoff>> {
        self.store
            .list_pending_for_signer(principal.org_id, principal.user_id)
            .await
    }

    /// Marks reminders on pending sign-offs. A sign-off reminded less than
    /// the configured interval ago is skipped; when every target is skipped
    /// the call fails with `REMINDER_RATE_LIMITED`.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, policy_id = %id))]
    pub async fn remind(
        &self,
        principal: &Principal,
        id: Uuid,
        input: Remind,
    ) -> Result<ReminderOutcome> {
        let policy = self.load(principal, id).await?;
        Self::ensure_not_archived(&policy)?;
        let pending: Vec<PolicySignoff> = self
            .store
            .list_signoffs(principal.org_id, policy.id)
            .await?
            .into_iter()
            .filter(|s| s.status == SignoffStatus::Pending)
            .collect();

        let is_requester = pending.iter().any(|s| s.requested_by == principal.user_id);
        if !(Self::is_owner(principal, &policy)
            || is_requester
            || principal.has_any_role(POLICY_PUBLISH_ROLES))
        {
            return Err(GrcError::Forbidden(
                "only owners, publishers or requesters may send reminders".into(),
            ));
        }

        let targets: Vec<PolicySignoff> = match &input.signoff_ids {
            Some(ids) => pending.into_iter().filter(|s| ids.contains(&s.id)).collect(),
            None => pending,
        };
        if targets.is_empty() {
            return Err(GrcError::NoPendingSignoffs);
        }

        let now = self.clock.now();
        let interval = Duration::hours(self.config.reminder_interval_hours);
        let mut outcome = ReminderOutcome::default();
        for mut signoff in targets {
            if let Some(last) = signoff.reminder_sent_at {
                if now - last < interval {
                    outcome.rate_limited.push(signoff.id);
                    continue;
                }
            }
            signoff.reminder_count += 1;
            signoff.reminder_sent_at = Some(now);
            signoff.updated_at = now;
            self.store.update_signoff(&signoff).await?;
            self.log
                .emit(
                    principal,
                    AuditAction::SignoffReminderSent,
                    ResourceType::PolicySignoff,
                    signoff.id,
                    json!({
                        "policy_id": policy.id,
                        "signer_id": signoff.signer_id,
                        "reminder_count": signoff.reminder_count,
                    }),
                )
                .await;
            outcome.reminded.push(signoff.id);
        }

        if outcome.reminded.is_empty() {
            warn!(count = outcome.rate_limited.len(), "all reminders rate limited");
            return Err(GrcError::ReminderRateLimited(outcome.rate_limited.len()));
        }
        Ok(outcome)
    }
}
