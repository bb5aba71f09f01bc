//! Authorization & tenancy gate.
//!
//! Every core operation receives an authenticated `Principal`. The gate
//! answers two questions: may this role perform the operation, and may this
//! principal see the row at all. The second answer is always "not found"
//! rather than "forbidden" so that existence never leaks across tenants or
//! across audit assignments.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GrcError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Ciso,
    ComplianceManager,
    SecurityEngineer,
    ItAdmin,
    DevopsEngineer,
    Auditor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ciso => "ciso",
            Self::ComplianceManager => "compliance_manager",
            Self::SecurityEngineer => "security_engineer",
            Self::ItAdmin => "it_admin",
            Self::DevopsEngineer => "devops_engineer",
            Self::Auditor => "auditor",
            Self::Viewer => "viewer",
        }
    }
}

impl FromStr for Role {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ciso" => Ok(Self::Ciso),
            "compliance_manager" => Ok(Self::ComplianceManager),
            "security_engineer" => Ok(Self::SecurityEngineer),
            "it_admin" => Ok(Self::ItAdmin),
            "devops_engineer" => Ok(Self::DevopsEngineer),
            "auditor" => Ok(Self::Auditor),
            "viewer" => Ok(Self::Viewer),
            other => Err(GrcError::validation(format!("unknown role '{other}'"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Role sets ─────────────────────────────────────────────────

/// Create and steer audits; delete others' comments; remove others' submissions.
pub const AUDIT_CREATE_ROLES: &[Role] = &[Role::Ciso, Role::ComplianceManager];

/// Request PBC items, review submissions, record and verify findings.
pub const AUDIT_FIELDWORK_ROLES: &[Role] = &[Role::Ciso, Role::ComplianceManager, Role::Auditor];

/// Auditee-side work: evidence upload, submissions, remediation.
pub const CONTRIBUTOR_ROLES: &[Role] = &[
    Role::Ciso,
    Role::ComplianceManager,
    Role::SecurityEngineer,
    Role::ItAdmin,
    Role::DevopsEngineer,
];

pub const EVIDENCE_REVIEW_ROLES: &[Role] = &[Role::Ciso, Role::ComplianceManager];

pub const EVIDENCE_EVALUATE_ROLES: &[Role] =
    &[Role::Ciso, Role::ComplianceManager, Role::SecurityEngineer];

pub const POLICY_CREATE_ROLES: &[Role] =
    &[Role::Ciso, Role::ComplianceManager, Role::SecurityEngineer];

pub const POLICY_PUBLISH_ROLES: &[Role] = &[Role::Ciso, Role::ComplianceManager];

pub const POLICY_ARCHIVE_ROLES: &[Role] = &[Role::Ciso, Role::ComplianceManager];

/// The authenticated caller. Authentication happens outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, org_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            org_id,
            role,
        }
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn is_auditor(&self) -> bool {
        self.role == Role::Auditor
    }

    pub fn require_any(&self, roles: &[Role], action: &str) -> Result<()> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            Err(GrcError::Forbidden(format!(
                "role '{}' may not {action}",
                self.role
            )))
        }
    }

    /// Passes for the named user or for any of the listed roles.
    pub fn require_self_or_any(&self, user_id: Uuid, roles: &[Role], action: &str) -> Result<()> {
        if self.user_id == user_id {
            return Ok(());
        }
        self.require_any(roles, action)
    }

    /// Rows from another tenant are indistinguishable from missing rows.
    pub fn ensure_same_org(&self, row_org_id: Uuid, what: &str) -> Result<()> {
        if row_org_id == self.org_id {
            Ok(())
        } else {
            Err(GrcError::NotFound(what.to_string()))
        }
    }

    /// Auditor isolation: an auditor sees an audit only when assigned to it.
    pub fn can_view_audit(&self, org_id: Uuid, auditor_ids: &[Uuid]) -> bool {
        if org_id != self.org_id {
            return false;
        }
        !self.is_auditor() || auditor_ids.contains(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), Uuid::new_v4(), role)
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            Role::Ciso,
            Role::ComplianceManager,
            Role::SecurityEngineer,
            Role::ItAdmin,
            Role::DevopsEngineer,
            Role::Auditor,
            Role::Viewer,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn require_any_forbids_outside_set() {
        let p = principal(Role::SecurityEngineer);
        assert!(p.require_any(POLICY_CREATE_ROLES, "create policies").is_ok());
        let err = p.require_any(POLICY_PUBLISH_ROLES, "publish").unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn self_passes_without_role() {
        let p = principal(Role::Viewer);
        assert!(p
            .require_self_or_any(p.user_id, AUDIT_CREATE_ROLES, "delete")
            .is_ok());
        assert!(p
            .require_self_or_any(Uuid::new_v4(), AUDIT_CREATE_ROLES, "delete")
            .is_err());
    }

    #[test]
    fn other_org_rows_are_not_found() {
        let p = principal(Role::Ciso);
        let err = p.ensure_same_org(Uuid::new_v4(), "policy").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(p.ensure_same_org(p.org_id, "policy").is_ok());
    }

    #[test]
    fn auditor_sees_only_assigned_audits() {
        let p = principal(Role::Auditor);
        assert!(!p.can_view_audit(p.org_id, &[]));
        assert!(p.can_view_audit(p.org_id, &[p.user_id]));
        assert!(!p.can_view_audit(Uuid::new_v4(), &[p.user_id]));

        let manager = principal(Role::ComplianceManager);
        assert!(manager.can_view_audit(manager.org_id, &[]));
    }
}
