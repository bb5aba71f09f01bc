use thiserror::Error;

/// Every failure that crosses the core boundary.
///
/// Each variant maps to one stable code (`code()`) which the transport
/// layer uses to pick a response status (`http_status()`).
#[derive(Debug, Error)]
pub enum GrcError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("identifier already in use: {0}")]
    DuplicateIdentifier(String),

    #[error("invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("rejection requires comments")]
    RejectionRequiresComments,

    #[error("audit not found")]
    AuditNotFound,

    #[error("audit is completed")]
    AuditCompleted,

    #[error("audit is cancelled")]
    AuditCancelled,

    #[error("invalid {entity} transition: {from} -> {to}")]
    AuditInvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("request has no evidence submitted")]
    AuditNoEvidence,

    #[error("artifact already submitted for this request")]
    AuditDuplicateEvidence,

    #[error("rejection requires notes")]
    AuditRejectionRequiresNotes,

    #[error("risk acceptance requires a reason")]
    AuditRiskAcceptRequiresReason,

    #[error("internal comments are not available to auditors")]
    AuditInternalCommentDenied,

    #[error("finding not found")]
    AuditFindingNotFound,

    #[error("audit request not found")]
    AuditRequestNotFound,

    #[error("comment not found")]
    AuditCommentNotFound,

    #[error("policy is archived")]
    PolicyArchived,

    #[error("caller is not the signer of this sign-off")]
    NotSigner,

    #[error("no pending sign-offs")]
    NoPendingSignoffs,

    #[error("reminder rate limited: {0} sign-off(s) reminded within the last interval")]
    ReminderRateLimited(usize),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GrcError {
    /// Stable typed code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::DuplicateIdentifier(_) => "DUPLICATE_IDENTIFIER",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::ContentTooLarge { .. } => "CONTENT_TOO_LARGE",
            Self::RejectionRequiresComments => "REJECTION_REQUIRES_COMMENTS",
            Self::AuditNotFound => "AUDIT_NOT_FOUND",
            Self::AuditCompleted => "AUDIT_COMPLETED",
            Self::AuditCancelled => "AUDIT_CANCELLED",
            Self::AuditInvalidTransition { .. } => "AUDIT_INVALID_TRANSITION",
            Self::AuditNoEvidence => "AUDIT_NO_EVIDENCE",
            Self::AuditDuplicateEvidence => "AUDIT_DUPLICATE_EVIDENCE",
            Self::AuditRejectionRequiresNotes => "AUDIT_REJECTION_REQUIRES_NOTES",
            Self::AuditRiskAcceptRequiresReason => "AUDIT_RISK_ACCEPT_REQUIRES_REASON",
            Self::AuditInternalCommentDenied => "AUDIT_INTERNAL_COMMENT_DENIED",
            Self::AuditFindingNotFound => "AUDIT_FINDING_NOT_FOUND",
            Self::AuditRequestNotFound => "AUDIT_REQUEST_NOT_FOUND",
            Self::AuditCommentNotFound => "AUDIT_COMMENT_NOT_FOUND",
            Self::PolicyArchived => "POLICY_ARCHIVED",
            Self::NotSigner => "NOT_SIGNER",
            Self::NoPendingSignoffs => "NO_PENDING_SIGNOFFS",
            Self::ReminderRateLimited(_) => "REMINDER_RATE_LIMITED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden(_) | Self::NotSigner | Self::AuditInternalCommentDenied => 403,
            Self::NotFound(_)
            | Self::AuditNotFound
            | Self::AuditFindingNotFound
            | Self::AuditRequestNotFound
            | Self::AuditCommentNotFound => 404,
            Self::Conflict(_)
            | Self::DuplicateIdentifier(_)
            | Self::AuditCompleted
            | Self::AuditCancelled
            | Self::AuditDuplicateEvidence
            | Self::PolicyArchived => 409,
            Self::ContentTooLarge { .. } => 413,
            Self::InvalidTransition { .. }
            | Self::AuditInvalidTransition { .. }
            | Self::AuditNoEvidence
            | Self::RejectionRequiresComments
            | Self::AuditRejectionRequiresNotes
            | Self::AuditRiskAcceptRequiresReason
            | Self::NoPendingSignoffs
            | Self::Unprocessable(_) => 422,
            Self::ReminderRateLimited(_) => 429,
            Self::ServiceUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Failures that leave no side effects and are the caller's to fix.
    pub fn is_client_error(&self) -> bool {
        self.http_status() < 500
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GrcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_codes_are_prefixed() {
        assert_eq!(GrcError::AuditNoEvidence.code(), "AUDIT_NO_EVIDENCE");
        assert_eq!(
            GrcError::AuditRejectionRequiresNotes.code(),
            "AUDIT_REJECTION_REQUIRES_NOTES"
        );
        assert_eq!(
            GrcError::AuditInvalidTransition {
                entity: "audit",
                from: "completed".into(),
                to: "planning".into()
            }
            .code(),
            "AUDIT_INVALID_TRANSITION"
        );
    }

    #[test]
    fn auditor_isolation_is_a_404() {
        assert_eq!(GrcError::AuditNotFound.http_status(), 404);
        assert_eq!(GrcError::Forbidden("x".into()).http_status(), 403);
    }

    #[test]
    fn rate_limit_is_429() {
        let err = GrcError::ReminderRateLimited(2);
        assert_eq!(err.http_status(), 429);
        assert_eq!(err.code(), "REMINDER_RATE_LIMITED");
    }

    #[test]
    fn transition_display_names_both_states() {
        let err = GrcError::InvalidTransition {
            entity: "policy",
            from: "draft".into(),
            to: "published".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid policy status transition: draft -> published"
        );
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err = GrcError::Internal(anyhow::anyhow!("pool closed"));
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "internal: pool closed");
    }

    #[test]
    fn content_too_large_is_413() {
        let err = GrcError::ContentTooLarge {
            size: 2,
            limit: 1,
        };
        assert_eq!(err.http_status(), 413);
        assert!(err.is_client_error());
    }
}
