//! State-Machine Registry.
//!
//! One transition table per lifecycle. Validation is set membership over
//! `(from, to)` pairs; a rejected pair produces an error naming both states.
//! Audit-domain lifecycles (audit, request, finding) report
//! `AUDIT_INVALID_TRANSITION`; evidence and policy report
//! `INVALID_STATUS_TRANSITION`.

use crate::audit::types::{AuditRequestStatus, AuditStatus, FindingStatus};
use crate::error::{GrcError, Result};
use crate::evidence::types::EvidenceStatus;
use crate::policy::types::PolicyStatus;

pub trait StateMachine: Copy + PartialEq + Sized + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Audit-domain lifecycles use the `AUDIT_` error family.
    const AUDIT_DOMAIN: bool;

    fn transitions() -> &'static [(Self, Self)];

    fn wire(&self) -> &'static str;

    fn can_transition_to(&self, to: Self) -> bool {
        Self::transitions()
            .iter()
            .any(|(from, target)| from == self && *target == to)
    }

    fn validate(from: Self, to: Self) -> Result<()> {
        if from.can_transition_to(to) {
            return Ok(());
        }
        let (entity, from, to) = (Self::ENTITY, from.wire().to_string(), to.wire().to_string());
        Err(if Self::AUDIT_DOMAIN {
            GrcError::AuditInvalidTransition { entity, from, to }
        } else {
            GrcError::InvalidTransition { entity, from, to }
        })
    }

    /// Every status reachable in one step from `self`.
    fn successors(&self) -> Vec<Self> {
        Self::transitions()
            .iter()
            .filter(|(from, _)| from == self)
            .map(|(_, to)| *to)
            .collect()
    }
}

// ── Audit ─────────────────────────────────────────────────────

const AUDIT_TRANSITIONS: &[(AuditStatus, AuditStatus)] = {
    use AuditStatus::*;
    &[
        (Planning, Fieldwork),
        (Fieldwork, Reporting),
        (Reporting, Remediation),
        (Remediation, Completed),
        (Planning, Cancelled),
        (Fieldwork, Cancelled),
        (Reporting, Cancelled),
        (Remediation, Cancelled),
    ]
};

impl StateMachine for AuditStatus {
    const ENTITY: &'static str = "audit";
    const AUDIT_DOMAIN: bool = true;

    fn transitions() -> &'static [(Self, Self)] {
        AUDIT_TRANSITIONS
    }

    fn wire(&self) -> &'static str {
        self.as_str()
    }
}

// ── Audit request ─────────────────────────────────────────────

const REQUEST_TRANSITIONS: &[(AuditRequestStatus, AuditRequestStatus)] = {
    use AuditRequestStatus::*;
    &[
        (Open, InProgress),
        (InProgress, Submitted),
        (Submitted, Accepted),
        (Submitted, Rejected),
        (Rejected, InProgress),
        (Accepted, Closed),
        (Rejected, Closed),
    ]
};

impl StateMachine for AuditRequestStatus {
    const ENTITY: &'static str = "audit_request";
    const AUDIT_DOMAIN: bool = true;

    fn transitions() -> &'static [(Self, Self)] {
        REQUEST_TRANSITIONS
    }

    fn wire(&self) -> &'static str {
        self.as_str()
    }
}

// ── Finding ───────────────────────────────────────────────────

const FINDING_TRANSITIONS: &[(FindingStatus, FindingStatus)] = {
    use FindingStatus::*;
    &[
        (Identified, RemediationPlanned),
        (RemediationPlanned, RemediationInProgress),
        (RemediationInProgress, RemediationComplete),
        (RemediationComplete, RemediationInProgress),
        (RemediationComplete, Verified),
        (Verified, Closed),
        (Identified, RiskAccepted),
        (RemediationPlanned, RiskAccepted),
        (RemediationInProgress, RiskAccepted),
        (RemediationComplete, RiskAccepted),
    ]
};

impl StateMachine for FindingStatus {
    const ENTITY: &'static str = "finding";
    const AUDIT_DOMAIN: bool = true;

    fn transitions() -> &'static [(Self, Self)] {
        FINDING_TRANSITIONS
    }

    fn wire(&self) -> &'static str {
        self.as_str()
    }
}

// ── Evidence artifact ─────────────────────────────────────────

const EVIDENCE_TRANSITIONS: &[(EvidenceStatus, EvidenceStatus)] = {
    use EvidenceStatus::*;
    &[
        (Draft, PendingReview),
        (PendingReview, Approved),
        (PendingReview, Rejected),
        (Rejected, PendingReview),
        (Approved, Expired),
        (Expired, PendingReview),
    ]
};

impl StateMachine for EvidenceStatus {
    const ENTITY: &'static str = "evidence_artifact";
    const AUDIT_DOMAIN: bool = false;

    fn transitions() -> &'static [(Self, Self)] {
        EVIDENCE_TRANSITIONS
    }

    fn wire(&self) -> &'static str {
        self.as_str()
    }
}

// ── Policy ────────────────────────────────────────────────────

const POLICY_TRANSITIONS: &[(PolicyStatus, PolicyStatus)] = {
    use PolicyStatus::*;
    &[
        (Draft, InReview),
        (InReview, Approved),
        (InReview, Draft),
        (Approved, InReview),
        // a new content version invalidates approval
        (Approved, Draft),
        (Published, Draft),
        (Approved, Published),
        (Draft, Archived),
        (InReview, Archived),
        (Approved, Archived),
        (Published, Archived),
    ]
};

impl StateMachine for PolicyStatus {
    const ENTITY: &'static str = "policy";
    const AUDIT_DOMAIN: bool = false;

    fn transitions() -> &'static [(Self, Self)] {
        POLICY_TRANSITIONS
    }

    fn wire(&self) -> &'static str {
        self.as_str()
    }
}
