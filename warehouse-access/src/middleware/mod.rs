pub mod guard;

pub use guard::{
    require_permission, require_resource_access, require_roles, CurrentCaller, ResourceGuard,
};
