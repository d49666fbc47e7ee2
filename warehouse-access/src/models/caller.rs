//! Caller model - the authenticated identity an access decision is made for.
//!
//! A `Caller` is built once per request by the authentication layer after it
//! has verified the bearer token. Nothing in this crate validates tokens; the
//! caller is trusted input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Wire value of the universal permission.
pub const ALL_PERMISSIONS: &str = "all";

/// Caller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A single granted permission.
///
/// Stored data keeps the flat list-of-strings shape; `"all"` is the only
/// wildcard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    All,
    Named(String),
}

impl Permission {
    pub fn as_str(&self) -> &str {
        match self {
            Permission::All => ALL_PERMISSIONS,
            Permission::Named(name) => name,
        }
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        if value == ALL_PERMISSIONS {
            Permission::All
        } else {
            Permission::Named(value.to_string())
        }
    }
}

/// Set of permissions granted to a caller.
///
/// Never fails to deserialize: anything other than a list of strings becomes
/// the empty set and is logged, so a corrupt permissions column degrades to
/// "no extra grants" instead of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    grants: BTreeSet<Permission>,
}

impl PermissionSet {
    pub fn new<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            grants: grants
                .into_iter()
                .map(|g| Permission::from(g.as_ref()))
                .collect(),
        }
    }

    /// Explicit empty set used when a stored value could not be interpreted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Interpret a stored JSON permissions value.
    ///
    /// Accepts an array of strings, or a string holding such an array (the
    /// column has historically been written both ways). Non-string array
    /// members are dropped.
    pub fn from_stored(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                let mut grants = BTreeSet::new();
                let mut dropped = 0usize;
                for item in items {
                    match item.as_str() {
                        Some(s) => {
                            grants.insert(Permission::from(s));
                        }
                        None => dropped += 1,
                    }
                }
                if dropped > 0 {
                    tracing::warn!(dropped, "Ignoring non-string entries in stored permissions");
                }
                Self { grants }
            }
            serde_json::Value::String(raw) => Self::from_json_str(raw),
            serde_json::Value::Null => Self::empty(),
            other => {
                tracing::warn!(
                    kind = json_kind(other),
                    "Malformed stored permissions, treating as empty permission set"
                );
                Self::empty()
            }
        }
    }

    /// Interpret a permissions column stored as JSON text.
    pub fn from_json_str(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::empty();
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(_)) | Err(_) => {
                tracing::warn!(
                    len = raw.len(),
                    "Malformed stored permissions, treating as empty permission set"
                );
                Self::empty()
            }
            Ok(value) => Self::from_stored(&value),
        }
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.grants.contains(&Permission::from(permission))
    }

    pub fn has_wildcard(&self) -> bool {
        self.grants.contains(&Permission::All)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.grants.iter()
    }

    /// Flat wire representation.
    pub fn to_strings(&self) -> Vec<String> {
        self.grants.iter().map(|p| p.as_str().to_string()).collect()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.grants.iter().map(|p| p.as_str()))
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_stored(&value))
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: i64,
    pub role: Role,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl Caller {
    pub fn new(id: i64, role: Role, permissions: PermissionSet) -> Self {
        Self {
            id,
            role,
            permissions,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_all_is_wildcard() {
        let set = PermissionSet::new(["projects.read", "all"]);
        assert!(set.has_wildcard());
        assert!(set.contains("projects.read"));
        assert!(!set.contains("contracts.write"));
    }

    #[test]
    fn test_from_stored_array() {
        let set = PermissionSet::from_stored(&json!(["customers.read", 5, "zones.write"]));
        assert_eq!(set.len(), 2);
        assert!(set.contains("zones.write"));
    }

    #[test]
    fn test_from_stored_string_encoded_array() {
        let set = PermissionSet::from_stored(&json!("[\"contracts.read\"]"));
        assert!(set.contains("contracts.read"));
    }

    #[test]
    fn test_malformed_values_become_empty() {
        assert!(PermissionSet::from_stored(&json!({"read": true})).is_empty());
        assert!(PermissionSet::from_stored(&json!(42)).is_empty());
        assert!(PermissionSet::from_stored(&json!(null)).is_empty());
        assert!(PermissionSet::from_json_str("[not json").is_empty());
        assert!(PermissionSet::from_json_str("\"all\"").is_empty());
        assert!(PermissionSet::from_json_str("").is_empty());
    }

    #[test]
    fn test_caller_deserializes_with_malformed_permissions() {
        let caller: Caller =
            serde_json::from_value(json!({"id": 3, "role": "staff", "permissions": "oops"}))
                .unwrap();
        assert_eq!(caller.role, Role::Staff);
        assert!(caller.permissions.is_empty());

        let caller: Caller = serde_json::from_value(json!({"id": 4, "role": "viewer"})).unwrap();
        assert!(caller.permissions.is_empty());
    }

    #[test]
    fn test_permission_set_serializes_flat() {
        let set = PermissionSet::new(["all", "projects.read"]);
        let value = serde_json::to_value(&set).unwrap();
        let mut strings: Vec<String> = serde_json::from_value(value).unwrap();
        strings.sort();
        assert_eq!(strings, vec!["all".to_string(), "projects.read".to_string()]);
    }
}
