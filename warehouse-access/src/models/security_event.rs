//! Security event model - structured records handed to the audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Caller, ResourceType};

/// Security event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    /// Caller was denied a project or customer.
    UnauthorizedResourceAccess,
    /// Encryption key material missing or too short.
    KeyConfigurationFailure,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::UnauthorizedResourceAccess => "UNAUTHORIZED_RESOURCE_ACCESS",
            SecurityEventKind::KeyConfigurationFailure => "KEY_CONFIGURATION_FAILURE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Inbound request details attached to audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub ip_address: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ip_address: None,
            request_id: None,
        }
    }
}

/// Security audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub user_id: Option<i64>,
    pub role: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub ip_address: Option<String>,
    pub request_id: Option<String>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    fn new(kind: SecurityEventKind, severity: Severity, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            user_id: None,
            role: None,
            resource_type: None,
            resource_id: None,
            request_method: None,
            request_path: None,
            ip_address: None,
            request_id: None,
            details: details.into(),
            created_at: Utc::now(),
        }
    }

    /// A caller was refused a gated resource.
    pub fn unauthorized_resource_access(
        caller: &Caller,
        resource_type: &ResourceType,
        resource_id: i64,
        request: &RequestContext,
    ) -> Self {
        let mut event = Self::new(
            SecurityEventKind::UnauthorizedResourceAccess,
            Severity::Medium,
            format!(
                "User {} ({}) attempted to access {} {} without assignment",
                caller.id, caller.role, resource_type, resource_id
            ),
        );
        event.user_id = Some(caller.id);
        event.role = Some(caller.role.to_string());
        event.resource_type = Some(resource_type.to_string());
        event.resource_id = Some(resource_id);
        event.request_method = Some(request.method.clone());
        event.request_path = Some(request.path.clone());
        event.ip_address = request.ip_address.clone();
        event.request_id = request.request_id.clone();
        event
    }

    /// Vault could not be built from the configured key material.
    ///
    /// `reason` must describe the problem without quoting the material.
    pub fn key_configuration_failure(reason: impl Into<String>) -> Self {
        Self::new(
            SecurityEventKind::KeyConfigurationFailure,
            Severity::Critical,
            reason,
        )
    }
}
