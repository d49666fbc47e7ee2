//! Authorization decisions for warehouse resources.
//!
//! Three composable checks:
//!
//! - role membership ([`AccessControl::has_role`])
//! - permission grants with the admin and `"all"` overrides
//!   ([`AccessControl::has_permission`])
//! - per-resource access through project assignments
//!   ([`AccessControl::can_access_resource`])
//!
//! A missing caller is always [`AccessError::Unauthenticated`], never a plain
//! "no". Store failures surface as [`AccessError::AccessCheckFailed`] and are
//! never reported as a denial.

use std::sync::Arc;

use super::assignment_store::AssignmentStore;
use super::audit::AuditSink;
use super::error::AccessError;
use crate::models::{Caller, ProjectScope, RequestContext, ResourceType, Role, SecurityEvent};

/// Why a resource decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// Admins bypass every resource check.
    Admin,
    /// Managers see every project and customer.
    Manager,
    /// The caller holds an assignment for the project.
    Assigned,
    /// The caller is assigned to a project of the customer.
    AssignedViaProject,
    /// No matching assignment.
    NotAssigned,
    /// Resource type has no access rules and is open to every caller.
    UngatedResourceType,
}

impl AccessReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessReason::Admin => "admin",
            AccessReason::Manager => "manager",
            AccessReason::Assigned => "assigned",
            AccessReason::AssignedViaProject => "assigned_via_project",
            AccessReason::NotAssigned => "not_assigned",
            AccessReason::UngatedResourceType => "ungated_resource_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(AccessReason),
    Deny(AccessReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn reason(&self) -> AccessReason {
        match self {
            Decision::Allow(reason) | Decision::Deny(reason) => *reason,
        }
    }

    fn from_count(count: i64, reason: AccessReason) -> Self {
        if count > 0 {
            Decision::Allow(reason)
        } else {
            Decision::Deny(AccessReason::NotAssigned)
        }
    }
}

/// Access control service.
#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn AssignmentStore>,
    audit: Arc<dyn AuditSink>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn AssignmentStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Whether the caller's role is one of `allowed_roles`.
    pub fn has_role(caller: Option<&Caller>, allowed_roles: &[&str]) -> Result<bool, AccessError> {
        let caller = caller.ok_or(AccessError::Unauthenticated)?;
        Ok(allowed_roles.iter().any(|r| *r == caller.role.as_str()))
    }

    /// Whether the caller holds `permission`.
    ///
    /// Admins and holders of `"all"` pass for any permission name.
    pub fn has_permission(caller: Option<&Caller>, permission: &str) -> Result<bool, AccessError> {
        let caller = caller.ok_or(AccessError::Unauthenticated)?;

        if caller.is_admin() {
            return Ok(true);
        }
        if caller.permissions.has_wildcard() {
            return Ok(true);
        }
        Ok(caller.permissions.contains(permission))
    }

    /// Guard form of [`has_role`](Self::has_role) over typed roles.
    pub fn require_role(caller: Option<&Caller>, allowed_roles: &[Role]) -> Result<(), AccessError> {
        let caller = caller.ok_or(AccessError::Unauthenticated)?;
        if allowed_roles.contains(&caller.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = caller.id,
                role = %caller.role,
                allowed = ?allowed_roles,
                "Role not permitted"
            );
            Err(AccessError::Forbidden)
        }
    }

    /// Guard form of [`has_permission`](Self::has_permission).
    pub fn require_permission(caller: Option<&Caller>, permission: &str) -> Result<(), AccessError> {
        if Self::has_permission(caller, permission)? {
            Ok(())
        } else {
            if let Some(caller) = caller {
                tracing::warn!(
                    user_id = caller.id,
                    role = %caller.role,
                    required_permission = %permission,
                    "Insufficient permissions"
                );
            }
            Err(AccessError::Forbidden)
        }
    }

    /// Decide whether the caller may access one resource.
    ///
    /// Order matters: admin, then the per-type rules, then the open default.
    /// The resource id is only required once a per-type rule is reached.
    pub async fn can_access_resource(
        &self,
        caller: Option<&Caller>,
        resource_type: &ResourceType,
        resource_id: Option<i64>,
    ) -> Result<Decision, AccessError> {
        let caller = caller.ok_or(AccessError::Unauthenticated)?;

        if caller.is_admin() {
            return Ok(Decision::Allow(AccessReason::Admin));
        }

        match resource_type {
            ResourceType::Project => {
                let project_id = resource_id.ok_or(AccessError::MissingResourceId)?;
                if caller.role == Role::Manager {
                    return Ok(Decision::Allow(AccessReason::Manager));
                }
                let count = self
                    .store
                    .count_project_assignments(caller.id, project_id)
                    .await
                    .map_err(|e| self.lookup_failed(caller, resource_type, project_id, e))?;
                Ok(Decision::from_count(count, AccessReason::Assigned))
            }
            ResourceType::Customer => {
                let customer_id = resource_id.ok_or(AccessError::MissingResourceId)?;
                if caller.role == Role::Manager {
                    return Ok(Decision::Allow(AccessReason::Manager));
                }
                let count = self
                    .store
                    .count_customer_assignments(caller.id, customer_id)
                    .await
                    .map_err(|e| self.lookup_failed(caller, resource_type, customer_id, e))?;
                Ok(Decision::from_count(count, AccessReason::AssignedViaProject))
            }
            // FAIL-OPEN: unlisted resource types are reachable by every
            // authenticated caller. Gate a new type by adding a branch above.
            ResourceType::Other(_) => Ok(Decision::Allow(AccessReason::UngatedResourceType)),
        }
    }

    /// Per-request gate: allow, or record the denial and fail with `Forbidden`.
    pub async fn authorize_resource(
        &self,
        caller: Option<&Caller>,
        resource_type: &ResourceType,
        resource_id: Option<i64>,
        request: &RequestContext,
    ) -> Result<AccessReason, AccessError> {
        match self
            .can_access_resource(caller, resource_type, resource_id)
            .await?
        {
            Decision::Allow(reason) => {
                tracing::debug!(
                    resource_type = %resource_type,
                    resource_id = ?resource_id,
                    reason = reason.as_str(),
                    "Resource access granted"
                );
                Ok(reason)
            }
            Decision::Deny(_) => {
                // Deny is only reachable with a caller and an id.
                if let (Some(caller), Some(resource_id)) = (caller, resource_id) {
                    self.audit.record(SecurityEvent::unauthorized_resource_access(
                        caller,
                        resource_type,
                        resource_id,
                        request,
                    ));
                }
                Err(AccessError::Forbidden)
            }
        }
    }

    /// Which projects the caller may list. Re-queried on every call.
    pub async fn project_scope(&self, caller: Option<&Caller>) -> Result<ProjectScope, AccessError> {
        let caller = caller.ok_or(AccessError::Unauthenticated)?;

        match caller.role {
            Role::Admin | Role::Manager => Ok(ProjectScope::All),
            Role::Staff | Role::Viewer => {
                let ids = self
                    .store
                    .project_ids_for_user(caller.id)
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            error = %e,
                            user_id = caller.id,
                            "Failed to load project assignments"
                        );
                        AccessError::check_failed(e)
                    })?;
                Ok(ProjectScope::Only(ids))
            }
        }
    }

    fn lookup_failed(
        &self,
        caller: &Caller,
        resource_type: &ResourceType,
        resource_id: i64,
        err: anyhow::Error,
    ) -> AccessError {
        tracing::error!(
            error = %err,
            user_id = caller.id,
            resource_type = %resource_type,
            resource_id,
            "Resource access lookup failed"
        );
        AccessError::check_failed(err)
    }
}
