//! Reference rows the core reads but does not own: users, controls,
//! requirements and frameworks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub identifier: String,
    pub title: String,
    /// Free-form upstream category, e.g. `access_control`.
    pub category: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub identifier: String,
    pub title: String,
}
