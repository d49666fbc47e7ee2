//! Services layer for warehouse-access.
//!
//! Access decisions, assignment lookups, audit sinks and the secret vault.

pub mod access_control;
pub mod assignment_store;
pub mod audit;
pub mod error;
pub mod secret_vault;

pub use access_control::{AccessControl, AccessReason, Decision};
pub use assignment_store::{AssignmentStore, MockAssignmentStore, PgAssignmentStore};
pub use audit::{AuditSink, MemoryAuditSink, PgAuditSink, TracingAuditSink};
pub use error::{AccessError, VaultError};
pub use secret_vault::{derive_key, DerivedKey, EncryptedSecret, SecretVault};
