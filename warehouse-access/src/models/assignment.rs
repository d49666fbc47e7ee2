//! Resource assignment model - per-user overrides granting access to a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::PermissionSet;

/// Resource kinds that access decisions are made for.
///
/// Only `Project` and `Customer` are gated. Every other kind falls through to
/// `Other` and is ALLOWED for any authenticated caller; a new gated resource
/// type needs its own variant and branch in `AccessControl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Project,
    Customer,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Project => "project",
            ResourceType::Customer => "customer",
            ResourceType::Other(kind) => kind,
        }
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        match value {
            "project" => ResourceType::Project,
            "customer" => ResourceType::Customer,
            other => ResourceType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment of a user to a project (`user_project_access` row).
///
/// At most one row exists per `(user_id, resource_id)`. Row presence alone
/// grants access; `granted_permissions` is carried for the user-management
/// screens and is not consulted by access decisions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResourceAssignment {
    pub user_id: i64,
    #[sqlx(rename = "project_id")]
    pub resource_id: i64,
    #[sqlx(json)]
    pub granted_permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

impl ResourceAssignment {
    /// Create a new assignment row.
    pub fn new(user_id: i64, resource_id: i64, granted_permissions: PermissionSet) -> Self {
        Self {
            user_id,
            resource_id,
            granted_permissions,
            created_at: Utc::now(),
        }
    }
}

/// Projects a caller may see in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    All,
    Only(Vec<i64>),
}

impl ProjectScope {
    pub fn includes(&self, project_id: i64) -> bool {
        match self {
            ProjectScope::All => true,
            ProjectScope::Only(ids) => ids.contains(&project_id),
        }
    }
}
