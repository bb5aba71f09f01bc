use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::audit_log::{AuditAction, ResourceType};
use crate::content::{self, COMMENT_BODY_MAX_CHARS};
use crate::error::{GrcError, Result};
use crate::pagination::{Page, PageRequest, COMMENT_LIMITS};
use crate::principal::{Principal, Role, AUDIT_CREATE_ROLES};

use super::service::AuditService;
use super::types::*;

impl AuditService {
    /// Confirms the referenced audit, request or finding exists in this audit.
    async fn ensure_comment_target(
        &self,
        principal: &Principal,
        audit: &Audit,
        target_type: CommentTarget,
        target_id: Uuid,
    ) -> Result<()> {
        match target_type {
            CommentTarget::Audit if target_id == audit.id => Ok(()),
            CommentTarget::Audit => Err(GrcError::validation(
                "audit comments must target the audit itself",
            )),
            CommentTarget::Request => self
                .load_request(principal, audit, target_id)
                .await
                .map(|_| ()),
            CommentTarget::Finding => self
                .load_finding(principal, audit, target_id)
                .await
                .map(|_| ()),
        }
    }

    /// Threads are one level deep: a reply's parent is a top-level comment
    /// and the reply inherits its target and visibility.
    #[instrument(skip(self, principal, input), fields(org_id = %principal.org_id, audit_id = %audit_id))]
    pub async fn create_comment(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        input: CreateComment,
    ) -> Result<AuditComment> {
        let audit = self.load_audit(principal, audit_id).await?;
        if principal.role == Role::Viewer {
            return Err(GrcError::Forbidden("viewers may not comment".into()));
        }
        if input.is_internal && principal.is_auditor() {
            return Err(GrcError::AuditInternalCommentDenied);
        }
        let body = content::require_text("body", &input.body, COMMENT_BODY_MAX_CHARS)?;

        let (target_type, target_id, is_internal) = match input.parent_comment_id {
            Some(parent_id) => {
                let parent = self.load_comment(principal, &audit, parent_id).await?;
                if parent.parent_comment_id.is_some() {
                    return Err(GrcError::validation("replies cannot be nested"));
                }
                let mismatched = input.target_type.is_some_and(|t| t != parent.target_type)
                    || input.target_id.is_some_and(|t| t != parent.target_id);
                if mismatched {
                    return Err(GrcError::validation(
                        "a reply must share its parent's target",
                    ));
                }
                (parent.target_type, parent.target_id, input.is_internal || parent.is_internal)
            }
            None => {
                let target_type = input.target_type.unwrap_or(CommentTarget::Audit);
                let target_id = match (target_type, input.target_id) {
                    (_, Some(id)) => id,
                    (CommentTarget::Audit, None) => audit.id,
                    (_, None) => return Err(GrcError::validation("target_id is required")),
                };
                self.ensure_comment_target(principal, &audit, target_type, target_id)
                    .await?;
                (target_type, target_id, input.is_internal)
            }
        };

        let now = self.clock.now();
        let comment = AuditComment {
            id: Uuid::new_v4(),
            org_id: principal.org_id,
            audit_id: audit.id,
            target_type,
            target_id,
            author_id: principal.user_id,
            body,
            parent_comment_id: input.parent_comment_id,
            is_internal,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_comment(&comment).await?;
        self.log
            .emit(
                principal,
                AuditAction::CommentCreated,
                ResourceType::AuditComment,
                comment.id,
                json!({
                    "audit_id": audit.id,
                    "target_type": comment.target_type,
                    "target_id": comment.target_id,
                    "is_internal": comment.is_internal,
                }),
            )
            .await;
        Ok(comment)
    }

    /// Oldest first. Internal comments are withheld from auditors.
    pub async fn list_comments(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        filter: CommentFilter,
        page: PageRequest,
    ) -> Result<Page<AuditComment>> {
        let page = page.within(COMMENT_LIMITS);
        let audit = self.load_audit(principal, audit_id).await?;
        let query = CommentQuery {
            filter,
            include_internal: !principal.is_auditor(),
            page,
        };
        let (rows, total) = self
            .store
            .list_comments(principal.org_id, audit.id, &query)
            .await?;
        Ok(Page::new(rows, page, total))
    }

    pub async fn edit_comment(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        comment_id: Uuid,
        body: &str,
    ) -> Result<AuditComment> {
        let audit = self.load_audit(principal, audit_id).await?;
        let mut comment = self.load_comment(principal, &audit, comment_id).await?;
        if comment.author_id != principal.user_id {
            return Err(GrcError::Forbidden(
                "only the author may edit a comment".into(),
            ));
        }
        comment.body = content::require_text("body", body, COMMENT_BODY_MAX_CHARS)?;
        comment.updated_at = self.clock.now();
        self.store.update_comment(&comment).await?;
        self.log
            .emit(
                principal,
                AuditAction::CommentUpdated,
                ResourceType::AuditComment,
                comment.id,
                json!({ "audit_id": audit.id }),
            )
            .await;
        Ok(comment)
    }

    /// Removes the comment together with its replies.
    pub async fn delete_comment(
        &self,
        principal: &Principal,
        audit_id: Uuid,
        comment_id: Uuid,
    ) -> Result<()> {
        let audit = self.load_audit(principal, audit_id).await?;
        let comment = self.load_comment(principal, &audit, comment_id).await?;
        principal.require_self_or_any(
            comment.author_id,
            AUDIT_CREATE_ROLES,
            "delete comments written by others",
        )?;
        let removed = self.store.delete_comment(principal.org_id, comment.id).await?;
        self.log
            .emit(
                principal,
                AuditAction::CommentDeleted,
                ResourceType::AuditComment,
                comment.id,
                json!({ "audit_id": audit.id, "rows_removed": removed }),
            )
            .await;
        Ok(())
    }
}
