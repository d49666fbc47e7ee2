pub mod assignment;
pub mod caller;
pub mod security_event;

pub use assignment::{ProjectScope, ResourceAssignment, ResourceType};
pub use caller::{Caller, Permission, PermissionSet, Role, ALL_PERMISSIONS};
pub use security_event::{RequestContext, SecurityEvent, SecurityEventKind, Severity};
