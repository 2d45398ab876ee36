//! `siteops-auth`: pure authorization boundary.
//!
//! Authentication and role assignment happen elsewhere; this crate only
//! answers "may this principal do that", with no IO.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, require_any_role, AuthzError};
pub use permissions::Permission;
pub use principal::{InMemoryRoleResolver, Principal, RoleResolver};
pub use roles::Role;
